// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::{Parser, Subcommand};
use sessionward::SessionConfig;

use crate::command::get::GetArgs;
use crate::command::login::LoginArgs;

/// Session client for the assessment platform API.
#[derive(Debug, Parser)]
#[command(name = "sessionward", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub session: SessionConfig,

    /// Log format (json or text).
    #[arg(long, global = true, env = "SESSIONWARD_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level filter (trace, debug, info, warn, error, or an env-filter directive).
    #[arg(long, global = true, env = "SESSIONWARD_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and persist the session.
    Login(LoginArgs),
    /// Log out and remove the persisted session.
    Logout,
    /// Show the logged-in user, confirmed with the server.
    Whoami,
    /// Show the persisted session without contacting the server.
    Status,
    /// Authenticated GET, printed as JSON.
    Get(GetArgs),
}

impl Cli {
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid --log-format: {other} (expected json or text)"),
        }
        if !self.session.base_url.starts_with("http://")
            && !self.session.base_url.starts_with("https://")
        {
            anyhow::bail!("--base-url must be an http(s) URL");
        }
        Ok(())
    }
}

pub fn init_tracing(cli: &Cli) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    match cli.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).json().init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
