// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sessionward login`, `logout` and `whoami`.

use std::io::Write;

use sessionward::{AuthContext, SessionError};

#[derive(Debug, clap::Args)]
pub struct LoginArgs {
    /// Account email.
    #[arg(long, env = "SESSIONWARD_EMAIL")]
    pub email: String,
    /// Account password.
    #[arg(long, env = "SESSIONWARD_PASSWORD", hide_env_values = true)]
    pub password: String,
}

pub async fn login(
    ctx: &AuthContext,
    args: &LoginArgs,
    out: &mut (dyn Write + Send),
) -> anyhow::Result<()> {
    match ctx.login(&args.email, &args.password).await {
        Ok(profile) => {
            let who = profile.email.as_deref().unwrap_or(&profile.id);
            writeln!(out, "logged in as {who}")?;
            Ok(())
        }
        Err(SessionError::InvalidCredentials(msg)) => anyhow::bail!("login failed: {msg}"),
        Err(e) => Err(e.into()),
    }
}

pub async fn logout(ctx: &AuthContext, out: &mut (dyn Write + Send)) -> anyhow::Result<()> {
    let was_logged_in = ctx.is_authenticated();
    ctx.logout().await;
    if was_logged_in {
        writeln!(out, "logged out")?;
    } else {
        writeln!(out, "not logged in")?;
    }
    Ok(())
}

pub async fn whoami(ctx: &AuthContext, out: &mut (dyn Write + Send)) -> anyhow::Result<()> {
    if !ctx.is_authenticated() {
        anyhow::bail!("not logged in");
    }
    let profile = match ctx.refresh_current_user().await {
        Ok(profile) => profile,
        // Server unreachable: fall back to what startup restored.
        Err(SessionError::Transport(_) | SessionError::Http { .. }) => match ctx.current_user() {
            Some(profile) => profile,
            None => anyhow::bail!("identity unavailable"),
        },
        Err(e) => return Err(e.into()),
    };
    writeln!(out, "{}", serde_json::to_string_pretty(&profile)?)?;
    Ok(())
}
