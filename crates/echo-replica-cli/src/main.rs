// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `echo-replica`: replay scripted operations against an in-memory replica
//! and print the resulting store state as JSON.
//!
//! Logs go to stderr (filter with `RUST_LOG`); stdout carries only the JSON
//! result.

mod script;

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use echo_replica::ReplicaConfig;
use tracing_subscriber::EnvFilter;

use crate::script::Script;

#[derive(Parser, Debug)]
#[command(author, version, about = "Echo replica tools")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a JSON step script against an in-memory remote and print the final store state
    Replay(ReplayArgs),
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Script file (JSON: optional `seed` map plus `steps`)
    #[arg(long)]
    script: PathBuf,
    /// Replica config file (JSON); replaces --namespace/--path
    #[arg(long, conflicts_with_all = ["namespace", "path"])]
    config: Option<PathBuf>,
    /// Namespace for action types and the store slice
    #[arg(long)]
    namespace: Option<String>,
    /// Remote collection path to mirror
    #[arg(long)]
    path: Option<String>,
    /// Item field used for ordering
    #[arg(long)]
    order_by: Option<String>,
    /// Report events for unknown keys through the error hook
    #[arg(long)]
    strict: bool,
    /// Emit single-line JSON
    #[arg(long)]
    compact: bool,
}

impl ReplayArgs {
    fn replica_config(&self) -> Result<ReplicaConfig> {
        let mut config = match &self.config {
            Some(file) => {
                let bytes = std::fs::read(file)
                    .with_context(|| format!("read config {}", file.display()))?;
                ReplicaConfig::from_json(&bytes)
                    .with_context(|| format!("parse config {}", file.display()))?
            }
            None => ReplicaConfig::new(
                self.namespace.clone().unwrap_or_default(),
                self.path.clone().unwrap_or_default(),
            ),
        };
        if let Some(field) = &self.order_by {
            config.order_by.clone_from(field);
        }
        if self.strict {
            config.strict_consistency = true;
        }
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Replay(args) => replay(&args).await,
    }
}

async fn replay(args: &ReplayArgs) -> Result<()> {
    let config = args.replica_config()?;
    let raw = std::fs::read(&args.script)
        .with_context(|| format!("read script {}", args.script.display()))?;
    let script = Script::from_json(&raw)
        .with_context(|| format!("parse script {}", args.script.display()))?;

    let state = script.run(config).await?;

    let mut out = std::io::stdout().lock();
    if args.compact {
        serde_json::to_writer(&mut out, &state)?;
    } else {
        serde_json::to_writer_pretty(&mut out, &state)?;
    }
    writeln!(out)?;
    Ok(())
}
