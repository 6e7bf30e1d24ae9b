//! Storage lifecycle entry point.
//!
//! # Responsibility
//! - Run `setup`, `init` or `ready` against the storage named in a settings
//!   file.
//! - Exit non-zero with a one-line error when the step fails.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use warden_core::{init_logging, load_storage, Storage, StorageSettings};

#[derive(Parser)]
#[command(name = "warden_cli")]
#[command(about = "Storage lifecycle tool for the warden identity store")]
struct Cli {
    /// Settings file naming the storage driver
    #[arg(long, short, global = true, default_value = "warden.toml")]
    settings: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Create the schema
    Setup,

    /// Seed default roles and the optional admin user
    Init,

    /// Check that the storage is set up and reachable
    Ready,

    /// Print the core library version
    Version,
}

impl Commands {
    fn label(&self) -> &'static str {
        match self {
            Commands::Setup => "setup",
            Commands::Init => "init",
            Commands::Ready => "ready",
            Commands::Version => "version",
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(message) => {
            println!("{message}");
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<String, String> {
    if cli.command == Commands::Version {
        return Ok(format!("warden_core version={}", warden_core::core_version()));
    }

    let settings = StorageSettings::load(&cli.settings).map_err(|err| err.to_string())?;
    if let Some(logging) = &settings.logging {
        init_logging(&logging.level, &logging.dir)?;
    }
    let storage = load_storage(&settings).map_err(|err| err.to_string())?;
    log::info!(
        "event=cli_command module=cli status=start command={} driver={}",
        cli.command.label(),
        storage.driver_name()
    );
    execute(storage.as_ref(), &cli.command)
}

fn execute(storage: &dyn Storage, command: &Commands) -> Result<String, String> {
    match command {
        Commands::Setup => storage
            .setup_storage()
            .map(|()| "storage setup complete".to_string())
            .map_err(|err| format!("storage setup failed: {err}")),
        Commands::Init => storage
            .init_storage()
            .map(|()| "storage initialized".to_string())
            .map_err(|err| format!("storage init failed: {err}")),
        Commands::Ready => match storage.storage_ready() {
            Ok(true) => Ok("storage ready".to_string()),
            Ok(false) => Err("storage not ready".to_string()),
            Err(err) => Err(format!("storage not ready: {err}")),
        },
        Commands::Version => Ok(format!("warden_core version={}", warden_core::core_version())),
    }
}

#[cfg(test)]
mod tests {
    use super::{run, Cli, Commands};
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn settings_flag_is_accepted_before_or_after_the_subcommand() {
        let before = Cli::try_parse_from(["warden_cli", "--settings", "a.toml", "setup"])
            .expect("settings before subcommand");
        assert_eq!(before.command, Commands::Setup);
        assert_eq!(before.settings, PathBuf::from("a.toml"));

        let after = Cli::try_parse_from(["warden_cli", "ready", "-s", "b.toml"])
            .expect("settings after subcommand");
        assert_eq!(after.command, Commands::Ready);
        assert_eq!(after.settings, PathBuf::from("b.toml"));

        let defaulted = Cli::try_parse_from(["warden_cli", "init"]).expect("default settings");
        assert_eq!(defaulted.settings, PathBuf::from("warden.toml"));
    }

    #[test]
    fn unknown_or_missing_subcommands_are_rejected() {
        assert!(Cli::try_parse_from(["warden_cli"]).is_err());
        assert!(Cli::try_parse_from(["warden_cli", "migrate"]).is_err());
        assert!(Cli::try_parse_from(["warden_cli", "version", "extra"]).is_err());
    }

    #[test]
    fn version_does_not_read_settings() {
        let cli = Cli::try_parse_from(["warden_cli", "version", "-s", "/missing/warden.toml"])
            .expect("version parses");
        let message = run(&cli).expect("version needs no settings file");
        assert!(message.starts_with("warden_core version="));
    }

    #[test]
    fn missing_settings_file_fails_with_a_message() {
        let cli = Cli::try_parse_from(["warden_cli", "ready", "-s", "/missing/warden.toml"])
            .expect("ready parses");
        assert!(run(&cli).is_err());
    }
}
