//! MyCorner CLI - keep an audio and video journal from the terminal
//!
//! Record or upload clips with notes and tags, browse them by day or tag,
//! and ask for a journaling prompt when the words do not come.

mod auth;
mod cli;
mod commands;
mod device;
mod error;
#[cfg(test)]
mod tests;

use clap::Parser;
use corner_core::config::ClientConfig;

use crate::cli::{Cli, Commands};
use crate::commands::auth_cmd::run_auth;
use crate::commands::common::App;
use crate::commands::completions::run_completions;
use crate::commands::delete::run_delete;
use crate::commands::list::{run_list, ListOptions};
use crate::commands::prompt::run_prompt;
use crate::commands::record::{run_record, RecordOptions};
use crate::commands::settings::{run_settings, SettingsChange};
use crate::commands::tags::run_tags;
use crate::commands::upload::run_upload;
use crate::error::CliError;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let directive = "corner=info"
        .parse()
        .map_err(|error| CliError::Config(format!("Invalid log directive: {error}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Completions need neither configuration nor a session.
    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let config = ClientConfig::from_env().map_err(CliError::Config)?;
    let mut app = App::load(config).await?;

    match cli.command {
        Commands::Auth { command } => run_auth(command, &mut app).await?,
        Commands::Record {
            kind,
            seconds,
            note,
            tags,
            output,
        } => {
            run_record(
                &mut app,
                RecordOptions {
                    kind,
                    seconds,
                    note,
                    tags,
                    output,
                },
            )
            .await?;
        }
        Commands::Upload {
            path,
            kind,
            note,
            tags,
        } => run_upload(&mut app, &path, kind, note, tags).await?,
        Commands::List {
            date,
            tag,
            dates,
            json,
        } => {
            run_list(
                &mut app,
                ListOptions {
                    date,
                    tag,
                    dates,
                    json,
                },
            )
            .await?;
        }
        Commands::Delete { id } => run_delete(&mut app, &id).await?,
        Commands::Prompt { category } => run_prompt(&mut app, category).await?,
        Commands::Tags { used } => run_tags(&mut app, used).await?,
        Commands::Settings {
            reminder_time,
            weekly_reminder,
        } => {
            run_settings(
                &mut app,
                SettingsChange {
                    reminder_time,
                    weekly_reminder,
                },
            )
            .await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
