mod cli;
mod commands;
mod error;

use clap::Parser;

use crate::cli::{CardCommand, Cli, Commands, DeckCommand};
use crate::commands::card::{
    run_card_add, run_card_delete, run_card_edit, run_card_list, CardInput,
};
use crate::commands::common::load_settings;
use crate::commands::deck::{run_deck_add, run_deck_delete, run_deck_edit, run_deck_list};
use crate::commands::sync::{run_conflicts, run_resolve, run_sync};
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

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("decksync=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = load_settings(cli.db_path, cli.api_url)?;

    match cli.command {
        Commands::Deck(DeckCommand::Add {
            name,
            description,
            tags,
        }) => run_deck_add(&name, description, tags, &settings).await?,
        Commands::Deck(DeckCommand::List { search, tags, json }) => {
            run_deck_list(search.as_deref(), &tags, json, &settings).await?;
        }
        Commands::Deck(DeckCommand::Edit { id, changes }) => {
            run_deck_edit(&id, changes, &settings).await?;
        }
        Commands::Deck(DeckCommand::Delete { id }) => run_deck_delete(&id, &settings).await?,
        Commands::Card(CardCommand::Add {
            deck,
            front,
            back,
            notes,
            image_url,
            tags,
        }) => {
            let input = CardInput {
                front,
                back,
                notes,
                image_url,
                tags,
            };
            run_card_add(&deck, input, &settings).await?;
        }
        Commands::Card(CardCommand::List { deck, json }) => {
            run_card_list(deck.as_deref(), json, &settings).await?;
        }
        Commands::Card(CardCommand::Edit { id, changes }) => {
            run_card_edit(&id, changes, &settings).await?;
        }
        Commands::Card(CardCommand::Delete { id }) => run_card_delete(&id, &settings).await?,
        Commands::Sync { json } => run_sync(json, &settings).await?,
        Commands::Conflicts { all, clear, json } => {
            run_conflicts(all, clear, json, &settings).await?;
        }
        Commands::Resolve { id, resolution } => {
            run_resolve(&id, resolution.into(), &settings).await?;
        }
    }

    Ok(())
}
