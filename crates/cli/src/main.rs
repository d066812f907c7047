// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

use sessionward_cli::cli::{init_tracing, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&cli);
    sessionward::install_crypto_provider();

    let code = sessionward_cli::command::run(cli).await;
    std::process::exit(code);
}
