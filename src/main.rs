use std::{path::PathBuf, time::Duration};

use clap::Parser;
use cli::{Cli, Commands};
use color_eyre::eyre::{Result, WrapErr, bail, eyre};
use futures::executor;
use tokio::sync::mpsc;
use tracing::info;

use crate::{app::App, config::Config, sync::store::SharedStore};

mod action;
mod app;
mod cli;
mod components;
mod config;
mod errors;
mod export;
mod layout;
mod logging;
mod shared;
mod sync;
mod tui;

fn main() -> Result<()> {
    bootstrap(|| {
        let args = Cli::parse();
        let mut config = Config::new().wrap_err("Failed to load configuration")?;
        if let Some(user) = args.user.clone() {
            config.user = user;
        }
        let store = sync::store::connect(&config.store)?;

        let command = match args.command {
            Some(Commands::Patch { file }) => {
                let raw = std::fs::read_to_string(&file)
                    .wrap_err_with(|| format!("Failed to read {}", file.display()))?;
                sync::Command::Patch(raw)
            }
            Some(Commands::Export { kind }) => sync::Command::Export(kind),
            Some(Commands::Reset { yes }) => {
                if !yes {
                    bail!("Refusing to reset the scan history without --yes");
                }
                sync::Command::Reset
            }
            None => {
                if config.user.trim().is_empty() {
                    bail!("No user configured, pass --user or set `user` in the config file");
                }
                info!("Starting scanner session for {}", config.user);
                let (sync_tx, sync_rx) = mpsc::unbounded_channel();
                let (synced_tx, synced_rx) = mpsc::unbounded_channel();
                let handle = sync::start_async(store, sync_rx, synced_tx, config.export_dir());
                sync_tx.send(sync::Command::Attach)?;

                let app = App::new(config, args.tick_rate, args.frame_rate, sync_tx, synced_rx);
                executor::block_on(app.run())?;
                handle.abort();
                return Ok(());
            }
        };

        match run_once(store, command, config.export_dir())? {
            sync::Event::PatchApplied(summary) => {
                println!("{} bowls created, {} updated", summary.created, summary.updated);
            }
            sync::Event::Exported(paths) => {
                for path in paths {
                    println!("{}", path.display());
                }
            }
            sync::Event::ResetDone => println!("Prepared history and scan tallies removed"),
            sync::Event::Failure(msg) => bail!(msg),
            other => bail!("Unexpected sync event {other:?}"),
        }
        Ok(())
    })
}

/// Runs a single command through the sync handler and returns its outcome.
fn run_once(store: SharedStore, command: sync::Command, export_dir: PathBuf) -> Result<sync::Event> {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel();
    let handle = sync::start_async(store, cmd_rx, evt_tx, export_dir);
    cmd_tx.send(command)?;
    drop(cmd_tx);

    let outcome = executor::block_on(evt_rx.recv());
    handle.abort();
    outcome.ok_or_else(|| eyre!("Sync handler stopped without a result"))
}

fn bootstrap(fn_do_run: fn() -> Result<()>) -> Result<()> {
    crate::errors::init()?;
    crate::logging::init()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err_with(|| "Failed to start Tokio runtime")?;
    let _guard = runtime.enter();

    let result = fn_do_run();
    runtime.shutdown_timeout(Duration::from_secs(5));

    result
}
