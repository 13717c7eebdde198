//! Mio tooling CLI.
//!
//! `check` composes in tooling mode (no manifest, no routes) and prints the
//! handle summary as JSON. `routes` composes fully and prints the registered
//! route groups. Logs go to stderr so stdout stays machine-readable.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use mio::compose::{ComposeRequest, Composer};
use mio::http::SERVER_BANNER;
use mio::modules::ModuleRegistry;
use mio::observability::logging::LoggerKind;

#[derive(Parser)]
#[command(name = "mio-cli")]
#[command(about = "Tooling CLI for Mio applications", long_about = None)]
struct Cli {
    /// Configuration profile
    #[arg(short, long)]
    profile: Option<String>,

    /// Project root
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Configuration selector
    #[arg(short, long)]
    selector: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compose in tooling mode and print the wired subsystems
    Check,
    /// Compose fully and print the registered route groups
    Routes,
    /// Print the product banner
    Hello,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Commands::Hello = cli.command {
        println!("Powered by {SERVER_BANNER}.");
        return Ok(());
    }

    let composer = Composer::new(ModuleRegistry::with_builtins());
    let mut request = ComposeRequest::new(&cli.root)
        .tooling(matches!(cli.command, Commands::Check))
        .logger_kind(LoggerKind::Console);
    if let Some(profile) = cli.profile {
        request = request.profile(profile);
    }
    if let Some(selector) = cli.selector {
        request = request.selector(selector);
    }

    let (handle, _logger) = match composer.compose(request) {
        Ok(composed) => composed,
        Err(failure) => {
            eprintln!("Error: {failure}");
            std::process::exit(failure.exit_code());
        }
    };

    match cli.command {
        Commands::Check => {
            println!("{}", serde_json::to_string_pretty(&handle.summary())?);
        }
        Commands::Routes => {
            println!("{}", serde_json::to_string_pretty(handle.routes())?);
        }
        Commands::Hello => {}
    }

    Ok(())
}
