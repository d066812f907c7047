// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subcommand implementations.
//!
//! Each command writes its result to `out`; diagnostics go through
//! `tracing` to stderr.

pub mod get;
pub mod login;
pub mod status;

use std::io::Write;

use sessionward::{AuthContext, SessionConfig, SessionEvent, Startup};
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::cli::{Cli, Command};

pub const EXPIRED_NOTICE: &str = "session expired, please log in again";

/// Run the parsed command line. Returns a process exit code.
pub async fn run(cli: Cli) -> i32 {
    let mut out = std::io::stdout();
    match execute(cli.session, cli.command, &mut out).await {
        Ok(()) => 0,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            1
        }
    }
}

pub async fn execute(
    config: SessionConfig,
    command: Command,
    out: &mut (dyn Write + Send),
) -> anyhow::Result<()> {
    // Offline: reads the persisted session only.
    if let Command::Status = command {
        return status::run(&config, out);
    }

    let ctx = AuthContext::init(config).await;
    let mut events = ctx.subscribe();
    let expired_at_startup = ctx.startup() == Startup::Expired;

    let result = match command {
        Command::Login(ref args) => login::login(&ctx, args, out).await,
        Command::Logout => login::logout(&ctx, out).await,
        Command::Whoami => login::whoami(&ctx, out).await,
        Command::Get(ref args) => get::run(&ctx, args, out).await,
        Command::Status => status::run(ctx.config(), out),
    };

    if expired_at_startup || saw_forced_logout(&mut events) {
        info!("session ended by forced logout");
        eprintln!("{EXPIRED_NOTICE}");
    }
    ctx.dispose();
    result
}

fn saw_forced_logout(events: &mut broadcast::Receiver<SessionEvent>) -> bool {
    let mut forced = false;
    loop {
        match events.try_recv() {
            Ok(SessionEvent::ForcedLogout { .. }) => forced = true,
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    forced
}
