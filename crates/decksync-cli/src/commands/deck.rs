use decksync_core::db::filter_decks;
use decksync_core::models::{DeckPatch, NewDeck};
use decksync_core::SyncSettings;

use crate::cli::DeckChanges;
use crate::commands::common::{
    deck_to_list_item, format_deck_lines, open_repository, resolve_deck, DeckListItem,
};
use crate::error::CliError;

pub async fn run_deck_add(
    name: &str,
    description: Option<String>,
    tags: Vec<String>,
    settings: &SyncSettings,
) -> Result<(), CliError> {
    let repo = open_repository(settings).await?;
    let mut input = NewDeck::named(name).with_tags(tags);
    input.description = description;

    let deck = repo.create_deck(input).await?;
    println!("{}", deck.id);
    Ok(())
}

pub async fn run_deck_list(
    search: Option<&str>,
    tags: &[String],
    as_json: bool,
    settings: &SyncSettings,
) -> Result<(), CliError> {
    let repo = open_repository(settings).await?;
    let decks = repo.list_decks().await?;
    let filtered = filter_decks(&decks, search.unwrap_or(""), tags);

    if as_json {
        let json_items = filtered
            .iter()
            .map(|deck| deck_to_list_item(deck))
            .collect::<Vec<DeckListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_deck_lines(&filtered) {
            println!("{line}");
        }
    }

    Ok(())
}

pub async fn run_deck_edit(
    id: &str,
    changes: DeckChanges,
    settings: &SyncSettings,
) -> Result<(), CliError> {
    let patch = deck_patch(changes)?;
    let repo = open_repository(settings).await?;
    let deck = resolve_deck(&repo, id).await?;

    let updated = repo.update_deck(&deck.id, patch).await?;
    println!("{} v{}", updated.id, updated.version);
    Ok(())
}

pub async fn run_deck_delete(id: &str, settings: &SyncSettings) -> Result<(), CliError> {
    let repo = open_repository(settings).await?;
    let deck = resolve_deck(&repo, id).await?;

    repo.delete_deck(&deck.id).await?;
    println!("{}", deck.id);
    Ok(())
}

pub fn deck_patch(changes: DeckChanges) -> Result<DeckPatch, CliError> {
    let description = if changes.clear_description {
        Some(None)
    } else {
        changes.description.map(Some)
    };
    let tags = if changes.clear_tags {
        Some(Vec::new())
    } else if changes.tags.is_empty() {
        None
    } else {
        Some(changes.tags)
    };

    let patch = DeckPatch {
        name: changes.name,
        description,
        tags,
    };
    if patch.is_empty() {
        return Err(CliError::EmptyPatch);
    }
    Ok(patch)
}
