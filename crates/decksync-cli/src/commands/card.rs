use decksync_core::models::{CardPatch, NewCard};
use decksync_core::SyncSettings;

use crate::cli::CardChanges;
use crate::commands::common::{
    card_to_list_item, format_card_lines, open_repository, resolve_card, resolve_deck,
    CardListItem,
};
use crate::error::CliError;

pub struct CardInput {
    pub front: String,
    pub back: String,
    pub notes: Option<String>,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
}

pub async fn run_card_add(
    deck: &str,
    input: CardInput,
    settings: &SyncSettings,
) -> Result<(), CliError> {
    let repo = open_repository(settings).await?;
    let deck = resolve_deck(&repo, deck).await?;

    let mut new_card = NewCard::new(deck.id, input.front, input.back);
    new_card.notes = input.notes;
    new_card.image_url = input.image_url;
    new_card.tags = input.tags;

    let card = repo.create_card(new_card).await?;
    println!("{}", card.id);
    Ok(())
}

pub async fn run_card_list(
    deck: Option<&str>,
    as_json: bool,
    settings: &SyncSettings,
) -> Result<(), CliError> {
    let repo = open_repository(settings).await?;
    let cards = match deck {
        Some(deck) => {
            let deck = resolve_deck(&repo, deck).await?;
            repo.cards_by_deck(&deck.id).await?
        }
        None => repo.list_cards().await?,
    };

    if as_json {
        let json_items = cards
            .iter()
            .map(card_to_list_item)
            .collect::<Vec<CardListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_card_lines(&cards) {
            println!("{line}");
        }
    }

    Ok(())
}

pub async fn run_card_edit(
    id: &str,
    changes: CardChanges,
    settings: &SyncSettings,
) -> Result<(), CliError> {
    let patch = card_patch(changes)?;
    let repo = open_repository(settings).await?;
    let card = resolve_card(&repo, id).await?;

    let updated = repo.update_card(&card.id, patch).await?;
    println!("{} v{}", updated.id, updated.version);
    Ok(())
}

pub async fn run_card_delete(id: &str, settings: &SyncSettings) -> Result<(), CliError> {
    let repo = open_repository(settings).await?;
    let card = resolve_card(&repo, id).await?;

    repo.delete_card(&card.id).await?;
    println!("{}", card.id);
    Ok(())
}

pub fn card_patch(changes: CardChanges) -> Result<CardPatch, CliError> {
    let clearable = |value: Option<String>, clear: bool| {
        if clear {
            Some(None)
        } else {
            value.map(Some)
        }
    };

    let patch = CardPatch {
        front: changes.front,
        back: changes.back,
        image_url: clearable(changes.image_url, changes.clear_image),
        occlusions: None,
        notes: clearable(changes.notes, changes.clear_notes),
        tags: (!changes.tags.is_empty()).then_some(changes.tags),
    };
    if patch == CardPatch::default() {
        return Err(CliError::EmptyPatch);
    }
    Ok(patch)
}

#[cfg(test)]
mod tests {
    use decksync_core::models::NewDeck;
    use decksync_core::{EntityRepository, LocalStore};
    use pretty_assertions::assert_eq;

    use super::*;

    fn plain(front: &str, back: &str) -> CardInput {
        CardInput {
            front: front.to_string(),
            back: back.to_string(),
            notes: None,
            image_url: None,
            tags: Vec::new(),
        }
    }

    #[test]
    fn card_patch_maps_clear_flags() {
        let patch = card_patch(CardChanges {
            back: Some("four".to_string()),
            clear_notes: true,
            ..CardChanges::default()
        })
        .unwrap();

        assert_eq!(patch.back.as_deref(), Some("four"));
        assert_eq!(patch.notes, Some(None));
        assert_eq!(patch.image_url, None);
        assert_eq!(patch.tags, None);
    }

    #[test]
    fn card_patch_requires_a_change() {
        assert!(matches!(
            card_patch(CardChanges::default()),
            Err(CliError::EmptyPatch)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn card_commands_keep_deck_count_in_step() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decks.db");
        let settings = SyncSettings::default().with_db_path(Some(path.clone()));
        let repo = EntityRepository::new(LocalStore::open(&path).await.unwrap());
        let deck = repo.create_deck(NewDeck::named("Math")).await.unwrap();

        run_card_add(&deck.id.to_string(), plain("2 + 2", "4"), &settings)
            .await
            .unwrap();
        run_card_add(&deck.id.to_string(), plain("3 + 3", "6"), &settings)
            .await
            .unwrap();

        let cards = repo.cards_by_deck(&deck.id).await.unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(repo.get_deck(&deck.id).await.unwrap().unwrap().card_count, 2);

        run_card_edit(
            &cards[0].id.to_string(),
            CardChanges {
                front: Some("2 + 2 = ?".to_string()),
                ..CardChanges::default()
            },
            &settings,
        )
        .await
        .unwrap();
        let edited = repo.get_card(&cards[0].id).await.unwrap().unwrap();
        assert_eq!(edited.front, "2 + 2 = ?");

        run_card_delete(&cards[1].id.to_string(), &settings)
            .await
            .unwrap();
        assert_eq!(repo.get_deck(&deck.id).await.unwrap().unwrap().card_count, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn card_add_to_unknown_deck_fails() {
        let dir = tempfile::tempdir().unwrap();
        let settings =
            SyncSettings::default().with_db_path(Some(dir.path().join("decks.db")));

        let error = run_card_add("0190", plain("q", "a"), &settings)
            .await
            .unwrap_err();
        assert!(matches!(error, CliError::NotFound { entity: "Deck", .. }));
    }
}
