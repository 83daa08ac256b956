use std::path::PathBuf;

use chrono::Utc;
use decksync_core::models::{Card, CardId, Deck, DeckId, SyncConflict};
use decksync_core::{EntityRepository, HttpRemoteApi, LocalStore, SyncEngine, SyncSettings};
use serde::Serialize;

use crate::error::CliError;

const SHORT_ID_LEN: usize = 13;

#[derive(Debug, Serialize)]
pub struct DeckListItem {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub card_count: u32,
    pub sync_status: String,
    pub version: u64,
    pub updated_at: i64,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct CardListItem {
    pub id: String,
    pub deck_id: String,
    pub front: String,
    pub back: String,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub sync_status: String,
    pub version: u64,
}

#[derive(Debug, Serialize)]
pub struct ConflictItem {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub local_version: u64,
    pub remote_version: u64,
    pub detected_at: i64,
    pub detected_at_iso: String,
    pub resolved: bool,
}

/// Settings from the environment with command-line overrides applied
pub fn load_settings(
    db_path: Option<PathBuf>,
    api_url: Option<String>,
) -> Result<SyncSettings, CliError> {
    Ok(SyncSettings::from_env()?
        .with_api_url(api_url)?
        .with_db_path(db_path))
}

pub async fn open_store(settings: &SyncSettings) -> Result<LocalStore, CliError> {
    let path = settings.resolved_db_path()?;
    Ok(LocalStore::open(&path).await?)
}

pub async fn open_repository(settings: &SyncSettings) -> Result<EntityRepository, CliError> {
    Ok(EntityRepository::new(open_store(settings).await?))
}

/// Engine over the HTTP gateway; fails when no API URL is configured
pub async fn open_engine(settings: &SyncSettings) -> Result<SyncEngine<HttpRemoteApi>, CliError> {
    if !settings.is_remote_configured() {
        return Err(CliError::SyncNotConfigured);
    }

    let remote = HttpRemoteApi::from_settings(settings)?;
    let store = open_store(settings).await?;
    Ok(SyncEngine::new(store, remote).with_request_timeout(settings.request_timeout()))
}

pub fn normalize_identifier(id: &str, entity: &'static str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyId { entity })
    } else {
        Ok(trimmed.to_ascii_lowercase())
    }
}

/// Pick the single item whose id starts with `query`
pub fn match_prefix<T>(
    items: Vec<T>,
    query: &str,
    entity: &'static str,
    id_of: impl Fn(&T) -> String,
) -> Result<T, CliError> {
    let mut matches = items
        .into_iter()
        .filter(|item| id_of(item).starts_with(query))
        .collect::<Vec<_>>();

    match matches.len() {
        0 => Err(CliError::NotFound {
            entity,
            id: query.to_string(),
        }),
        1 => Ok(matches.remove(0)),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|item| short_id(&id_of(item)))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousId(format!(
                "{entity} ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub async fn resolve_deck(repo: &EntityRepository, query: &str) -> Result<Deck, CliError> {
    let query = normalize_identifier(query, "Deck")?;
    if let Ok(id) = query.parse::<DeckId>() {
        if let Some(deck) = repo.get_deck(&id).await? {
            return Ok(deck);
        }
    }

    let decks = repo.list_decks().await?;
    match_prefix(decks, &query, "Deck", |deck| deck.id.to_string())
}

pub async fn resolve_card(repo: &EntityRepository, query: &str) -> Result<Card, CliError> {
    let query = normalize_identifier(query, "Card")?;
    if let Ok(id) = query.parse::<CardId>() {
        if let Some(card) = repo.get_card(&id).await? {
            return Ok(card);
        }
    }

    let cards = repo.list_cards().await?;
    match_prefix(cards, &query, "Card", |card| card.id.to_string())
}

pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

pub fn preview(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn render_tags(tags: &[String]) -> String {
    tags.iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn format_deck_lines(decks: &[&Deck]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    decks
        .iter()
        .map(|deck| {
            let short_id = short_id(&deck.id.to_string());
            let name = preview(&deck.name, 30);
            let cards = format!("{} cards", deck.card_count);
            let relative_time = format_relative_time(deck.updated_at, now_ms);
            let tags = render_tags(&deck.tags);
            let line = format!(
                "{short_id:<13}  {name:<30}  {cards:<9}  {:<8}  {relative_time:<10}",
                deck.sync_status.as_str()
            );

            if tags.is_empty() {
                line.trim_end().to_string()
            } else {
                format!("{line}  {tags}")
            }
        })
        .collect()
}

pub fn format_card_lines(cards: &[Card]) -> Vec<String> {
    cards
        .iter()
        .map(|card| {
            let short_id = short_id(&card.id.to_string());
            let front = preview(&card.front, 40);
            let back = preview(&card.back, 30);
            format!("{short_id:<13}  {front:<40}  {back:<30}  {}", card.sync_status)
        })
        .collect()
}

pub fn format_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            let state = if conflict.resolved { "resolved" } else { "open" };
            format!(
                "{}  {}  {:<4} {}  local=v{} remote=v{}  {state}",
                conflict.id,
                format_timestamp(conflict.timestamp),
                conflict.entity_type.as_str(),
                short_id(&conflict.entity_id),
                conflict.local_version.version(),
                conflict.remote_version.version(),
            )
        })
        .collect()
}

pub fn deck_to_list_item(deck: &Deck) -> DeckListItem {
    let now_ms = Utc::now().timestamp_millis();
    DeckListItem {
        id: deck.id.to_string(),
        name: deck.name.clone(),
        description: deck.description.clone(),
        tags: deck.tags.clone(),
        card_count: deck.card_count,
        sync_status: deck.sync_status.to_string(),
        version: deck.version,
        updated_at: deck.updated_at,
        relative_time: format_relative_time(deck.updated_at, now_ms),
    }
}

pub fn card_to_list_item(card: &Card) -> CardListItem {
    CardListItem {
        id: card.id.to_string(),
        deck_id: card.deck_id.to_string(),
        front: card.front.clone(),
        back: card.back.clone(),
        notes: card.notes.clone(),
        tags: card.tags.clone(),
        sync_status: card.sync_status.to_string(),
        version: card.version,
    }
}

pub fn conflict_to_item(conflict: &SyncConflict) -> ConflictItem {
    ConflictItem {
        id: conflict.id.to_string(),
        entity_type: conflict.entity_type.to_string(),
        entity_id: conflict.entity_id.clone(),
        local_version: conflict.local_version.version(),
        remote_version: conflict.remote_version.version(),
        detected_at: conflict.timestamp,
        detected_at_iso: format_timestamp(conflict.timestamp),
        resolved: conflict.resolved,
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn normalize_identifier_trims_and_rejects_empty() {
        assert_eq!(
            normalize_identifier("  ABC-12 ", "Deck").unwrap(),
            "abc-12".to_string()
        );
        assert!(matches!(
            normalize_identifier(" \t", "Card"),
            Err(CliError::EmptyId { entity: "Card" })
        ));
    }

    #[test]
    fn match_prefix_finds_unique_item() {
        let items = vec!["0190aaaa-1".to_string(), "0190bbbb-2".to_string()];
        let found = match_prefix(items, "0190b", "Deck", Clone::clone).unwrap();
        assert_eq!(found, "0190bbbb-2");
    }

    #[test]
    fn match_prefix_reports_missing_and_ambiguous() {
        let items = vec!["0190aaaa-1".to_string(), "0190aaab-2".to_string()];
        assert!(matches!(
            match_prefix(items.clone(), "ffff", "Deck", Clone::clone),
            Err(CliError::NotFound { entity: "Deck", .. })
        ));

        let error = match_prefix(items, "0190aa", "Deck", Clone::clone).unwrap_err();
        assert!(matches!(error, CliError::AmbiguousId(_)));
        assert!(error.to_string().contains("0190aaaa-1"));
    }

    #[test]
    fn preview_truncates_long_first_line() {
        assert_eq!(preview("short\nsecond line", 10), "short");
        assert_eq!(preview("a b   c d e f g h i j", 8), "a b c...");
    }

    #[test]
    fn format_relative_time_buckets() {
        let now = 10 * 24 * 60 * 60 * 1000;
        assert_eq!(format_relative_time(now - 5_000, now), "just now");
        assert_eq!(format_relative_time(now - 5 * 60_000, now), "5m ago");
        assert_eq!(format_relative_time(now - 3 * 60 * 60_000, now), "3h ago");
        assert_eq!(format_relative_time(0, now), "1w ago");
    }

    #[test]
    fn format_timestamp_renders_utc() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
    }

    #[test]
    fn format_deck_lines_show_count_status_and_tags() {
        let mut deck = Deck::new(
            decksync_core::models::NewDeck::named("Math Deck").with_tags(["math", "algebra"]),
        );
        deck.card_count = 3;

        let lines = format_deck_lines(&[&deck]);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with(&short_id(&deck.id.to_string())));
        assert!(lines[0].contains("Math Deck"));
        assert!(lines[0].contains("3 cards"));
        assert!(lines[0].contains("pending"));
        assert!(lines[0].ends_with("#math #algebra"));
    }

    #[test]
    fn deck_to_list_item_copies_sync_fields() {
        let deck = Deck::new(decksync_core::models::NewDeck::named("Spanish"));
        let item = deck_to_list_item(&deck);

        assert_eq!(item.id, deck.id.to_string());
        assert_eq!(item.sync_status, "pending");
        assert_eq!(item.version, 1);
        assert_eq!(item.card_count, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_engine_requires_api_url() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SyncSettings::default().with_db_path(Some(dir.path().join("decks.db")));

        let error = open_engine(&settings).await.err().unwrap();
        assert!(matches!(error, CliError::SyncNotConfigured));
    }
}
