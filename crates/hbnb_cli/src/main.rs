//! HBnB storage CLI.
//!
//! # Responsibility
//! - Resolve storage configuration from the environment (and `.env`).
//! - Inspect the configured store: list identity keys, count, show one entity.

use clap::{Parser, Subcommand};
use hbnb_core::{
    init_logging_with, init_storage, EntityKind, LogSettings, Storage, StorageConfig, TypeFilter,
};
use log::info;
use std::error::Error;

#[derive(Debug, Parser)]
#[command(name = "hbnb")]
#[command(about = "HBnB storage inspection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print core version and health probe
    Ping,
    /// List identity keys, optionally for one type
    List {
        /// Registered type name; unknown names list every type
        type_name: Option<String>,
    },
    /// Count stored entities, optionally for one type
    Count { type_name: Option<String> },
    /// Print one entity as JSON
    Show { type_name: String, id: String },
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(err) = init_logging_with(&LogSettings::from_env()) {
        eprintln!("warning: logging disabled: {err}");
    }

    if let Err(err) = run(cli.command) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), Box<dyn Error>> {
    if let Commands::Ping = command {
        println!("hbnb_core ping={}", hbnb_core::ping());
        println!("hbnb_core version={}", hbnb_core::core_version());
        return Ok(());
    }

    let config = StorageConfig::from_env()?;
    let mut storage = init_storage(&config)?;
    info!(
        "event=cli_start module=cli status=ok backend={}",
        storage.backend_name()
    );

    let result = execute(storage.as_mut(), command);
    storage.close();
    result
}

fn execute(storage: &mut dyn Storage, command: Commands) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Ping => {}
        Commands::List { type_name } => {
            for key in storage.all(filter_for(type_name))?.keys() {
                println!("{key}");
            }
        }
        Commands::Count { type_name } => {
            println!("{}", storage.count(filter_for(type_name))?);
        }
        Commands::Show { type_name, id } => {
            let kind = EntityKind::from_name(&type_name)
                .ok_or_else(|| format!("unknown type `{type_name}`"))?;
            let entity = storage
                .get(kind, &id)?
                .ok_or_else(|| format!("no {type_name} with id `{id}`"))?;
            println!("{}", serde_json::to_string_pretty(&entity)?);
        }
    }
    Ok(())
}

fn filter_for(type_name: Option<String>) -> TypeFilter {
    type_name
        .as_deref()
        .map_or(TypeFilter::All, TypeFilter::from_name)
}
