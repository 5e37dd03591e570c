//! mathpdf CLI - Batch note-taking margins for mathematical PDFs.

mod colors;
mod enhance;
mod settings;
mod sink;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mathpdf")]
#[command(about = "Add note-taking margins to batches of mathematical PDFs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Enhance a batch of PDF files
    Enhance(enhance::EnhanceArgs),

    /// Manage the settings file
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Write a settings file with the default values
    Init {
        /// Settings file path
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective settings as JSON
    Show {
        /// Settings file path
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // Helper to format mathpdf-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(core_err) = err.downcast_ref::<mathpdf_core::Error>() {
            anyhow::anyhow!("{}", core_err.with_hint())
        } else {
            err
        }
    };

    match cli.command {
        Commands::Enhance(args) => enhance::execute(args).await.map_err(format_error)?,

        Commands::Settings { action } => match action {
            SettingsAction::Init { path, force } => {
                settings::init(path.as_deref(), force).map_err(format_error)?
            }
            SettingsAction::Show { path } => settings::show(path.as_deref()).map_err(format_error)?,
        },
    }

    Ok(())
}
