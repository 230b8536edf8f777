//! memo CLI - Command-line interface for memo
//!
//! Quick capture from the terminal, plus manual sync, provider switching and
//! a foreground watch loop that runs the sync scheduler.

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use clap::{CommandFactory, Parser};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, ProviderCommands};
use crate::commands::add::run_add;
use crate::commands::common::Session;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::list::{run_list, run_show};
use crate::commands::organize::{run_attach, run_link, run_pin, run_visibility};
use crate::commands::provider::{run_provider_status, run_provider_switch};
use crate::commands::settings::run_settings;
use crate::commands::sync::{run_cloud_sync, run_restore, run_sync, run_watch};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let directive: Directive = "memo=info"
        .parse()
        .map_err(|error| CliError::Config(format!("invalid log directive: {error}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let command = match cli.command {
        Some(Commands::Config { command }) => return run_config(command, config_path),
        Some(command) => command,
        None => {
            // Quick capture mode: memo "my thought"
            if cli.note.is_empty() {
                Cli::command().print_help().map_err(CliError::Io)?;
                println!();
                return Ok(());
            }
            Commands::Add {
                content: cli.note,
                tags: Vec::new(),
                public: false,
            }
        }
    };

    let session = Session::open(config_path, cli.db_path)?;
    match command {
        Commands::Add {
            content,
            tags,
            public,
        } => run_add(&session, &content, tags, public)?,
        Commands::List { limit, tag, json } => run_list(&session, limit, tag.as_deref(), json)?,
        Commands::Show { id, json } => run_show(&session, &id, json)?,
        Commands::Edit { id } => run_edit(&session, &id)?,
        Commands::Delete { id } => run_delete(&session, &id)?,
        Commands::Pin { id } => run_pin(&session, &id, true)?,
        Commands::Unpin { id } => run_pin(&session, &id, false)?,
        Commands::Visibility { id, visibility } => run_visibility(&session, &id, visibility)?,
        Commands::Link { id, target, remove } => run_link(&session, &id, &target, remove)?,
        Commands::Attach {
            id,
            url,
            duration_ms,
        } => run_attach(&session, &id, &url, duration_ms)?,
        Commands::Sync { json } => run_sync(&session, json).await?,
        Commands::Restore => run_restore(&session).await?,
        Commands::Watch => run_watch(&session).await?,
        Commands::CloudSync { state } => run_cloud_sync(&session, state)?,
        Commands::Settings { command } => run_settings(&session, command)?,
        Commands::Provider { command } => match command {
            ProviderCommands::Status { json } => run_provider_status(&session, json).await?,
            ProviderCommands::Switch { provider } => run_provider_switch(&session, provider).await?,
        },
        Commands::Config { command } => run_config(command, config_path)?,
    }

    Ok(())
}
