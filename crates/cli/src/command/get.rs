// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io::Write;

use sessionward::AuthContext;

#[derive(Debug, clap::Args)]
pub struct GetArgs {
    /// API path, e.g. `/api/results`.
    pub path: String,
}

impl GetArgs {
    pub fn normalized_path(&self) -> String {
        if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        }
    }
}

pub async fn run(
    ctx: &AuthContext,
    args: &GetArgs,
    out: &mut (dyn Write + Send),
) -> anyhow::Result<()> {
    if !ctx.is_authenticated() {
        anyhow::bail!("not logged in");
    }
    let value: serde_json::Value = ctx.client().get_json(&args.normalized_path()).await?;
    writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
    Ok(())
}
