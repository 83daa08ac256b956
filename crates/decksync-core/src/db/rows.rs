//! Row mapping between the deck/card tables and their models

#![allow(clippy::cast_possible_wrap)] // SQLite stores counters as i64

use libsql::params::Params;
use libsql::{Connection, Row, Value};

use crate::error::{Error, Result};
use crate::models::{Card, Deck, SyncStatus};

/// A table owned by the local store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Decks,
    Cards,
    Conflicts,
    Deletions,
}

impl Table {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Decks => "decks",
            Self::Cards => "cards",
            Self::Conflicts => "sync_conflicts",
            Self::Deletions => "pending_deletions",
        }
    }
}

/// Secondary attributes rows can be looked up by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    Name,
    /// Multi-valued: matches rows carrying the tag
    Tag,
    DeckId,
    CreatedAt,
    UpdatedAt,
    SyncStatus,
}

/// Lookup value for [`Index`] queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexValue {
    Text(String),
    Integer(i64),
}

impl From<&str> for IndexValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for IndexValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<SyncStatus> for IndexValue {
    fn from(value: SyncStatus) -> Self {
        Self::Text(value.as_str().to_string())
    }
}

impl From<crate::models::DeckId> for IndexValue {
    fn from(value: crate::models::DeckId) -> Self {
        Self::Text(value.as_str())
    }
}

impl From<IndexValue> for Value {
    fn from(value: IndexValue) -> Self {
        match value {
            IndexValue::Text(text) => Self::Text(text),
            IndexValue::Integer(number) => Self::Integer(number),
        }
    }
}

/// An entity kept in one of the keyed tables
pub trait StoredEntity: Sized {
    /// Primary key type
    type Id: std::fmt::Display;

    const TABLE: Table;
    /// Human-readable name used in `NotFound` errors
    const KIND: &'static str;
    /// Tag junction table and its owner column
    const TAG_TABLE: (&'static str, &'static str);
    /// Projection over the table aliased as `e`, tags last as a JSON array
    const SELECT: &'static str;
    const UPSERT: &'static str;

    fn key(&self) -> String;
    fn tags(&self) -> &[String];
    fn from_row(row: &Row) -> Result<Self>;
    fn upsert_params(&self) -> Result<Vec<Value>>;
    /// Column backing `index`, or `None` if the table has no such index
    fn index_column(index: Index) -> Option<&'static str>;
}

impl StoredEntity for Deck {
    type Id = crate::models::DeckId;

    const TABLE: Table = Table::Decks;
    const KIND: &'static str = "Deck";
    const TAG_TABLE: (&'static str, &'static str) = ("deck_tags", "deck_id");
    const SELECT: &'static str = "SELECT e.id, e.name, e.description, e.card_count, e.created_at,
            e.updated_at, e.last_synced_at, e.sync_status, e.version,
            (SELECT json_group_array(tag) FROM
                (SELECT tag FROM deck_tags WHERE deck_id = e.id ORDER BY position))
         FROM decks e";
    const UPSERT: &'static str = "INSERT INTO decks (id, name, description, card_count, created_at,
            updated_at, last_synced_at, sync_status, version)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            description = excluded.description,
            card_count = excluded.card_count,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at,
            last_synced_at = excluded.last_synced_at,
            sync_status = excluded.sync_status,
            version = excluded.version";

    fn key(&self) -> String {
        self.id.as_str()
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: parse_id(&text(row, 0)?)?,
            name: text(row, 1)?,
            description: opt_text(row, 2)?,
            card_count: u32::try_from(integer(row, 3)?).unwrap_or(0),
            created_at: integer(row, 4)?,
            updated_at: integer(row, 5)?,
            last_synced_at: opt_integer(row, 6)?,
            sync_status: text(row, 7)?.parse()?,
            version: unsigned(row, 8)?,
            tags: json_list(row, 9)?,
        })
    }

    fn upsert_params(&self) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Text(self.id.as_str()),
            Value::Text(self.name.clone()),
            opt_text_value(self.description.as_deref()),
            Value::Integer(i64::from(self.card_count)),
            Value::Integer(self.created_at),
            Value::Integer(self.updated_at),
            opt_integer_value(self.last_synced_at),
            Value::Text(self.sync_status.as_str().to_string()),
            Value::Integer(self.version as i64),
        ])
    }

    fn index_column(index: Index) -> Option<&'static str> {
        match index {
            Index::Name => Some("e.name"),
            Index::CreatedAt => Some("e.created_at"),
            Index::UpdatedAt => Some("e.updated_at"),
            Index::SyncStatus => Some("e.sync_status"),
            Index::Tag | Index::DeckId => None,
        }
    }
}

impl StoredEntity for Card {
    type Id = crate::models::CardId;

    const TABLE: Table = Table::Cards;
    const KIND: &'static str = "Card";
    const TAG_TABLE: (&'static str, &'static str) = ("card_tags", "card_id");
    const SELECT: &'static str = "SELECT e.id, e.deck_id, e.front, e.back, e.image_url, e.occlusions,
            e.notes, e.created_at, e.updated_at, e.last_synced_at, e.sync_status, e.version,
            (SELECT json_group_array(tag) FROM
                (SELECT tag FROM card_tags WHERE card_id = e.id ORDER BY position))
         FROM cards e";
    const UPSERT: &'static str = "INSERT INTO cards (id, deck_id, front, back, image_url, occlusions,
            notes, created_at, updated_at, last_synced_at, sync_status, version)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            deck_id = excluded.deck_id,
            front = excluded.front,
            back = excluded.back,
            image_url = excluded.image_url,
            occlusions = excluded.occlusions,
            notes = excluded.notes,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at,
            last_synced_at = excluded.last_synced_at,
            sync_status = excluded.sync_status,
            version = excluded.version";

    fn key(&self) -> String {
        self.id.as_str()
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: parse_id(&text(row, 0)?)?,
            deck_id: parse_id(&text(row, 1)?)?,
            front: text(row, 2)?,
            back: text(row, 3)?,
            image_url: opt_text(row, 4)?,
            occlusions: serde_json::from_str(&text(row, 5)?)?,
            notes: opt_text(row, 6)?,
            created_at: integer(row, 7)?,
            updated_at: integer(row, 8)?,
            last_synced_at: opt_integer(row, 9)?,
            sync_status: text(row, 10)?.parse()?,
            version: unsigned(row, 11)?,
            tags: json_list(row, 12)?,
        })
    }

    fn upsert_params(&self) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Text(self.id.as_str()),
            Value::Text(self.deck_id.as_str()),
            Value::Text(self.front.clone()),
            Value::Text(self.back.clone()),
            opt_text_value(self.image_url.as_deref()),
            Value::Text(serde_json::to_string(&self.occlusions)?),
            opt_text_value(self.notes.as_deref()),
            Value::Integer(self.created_at),
            Value::Integer(self.updated_at),
            opt_integer_value(self.last_synced_at),
            Value::Text(self.sync_status.as_str().to_string()),
            Value::Integer(self.version as i64),
        ])
    }

    fn index_column(index: Index) -> Option<&'static str> {
        match index {
            Index::DeckId => Some("e.deck_id"),
            Index::CreatedAt => Some("e.created_at"),
            Index::UpdatedAt => Some("e.updated_at"),
            Index::SyncStatus => Some("e.sync_status"),
            Index::Tag | Index::Name => None,
        }
    }
}

/// Fetch a row by primary key
pub async fn get<E: StoredEntity>(conn: &Connection, key: &str) -> Result<Option<E>> {
    let sql = format!("{} WHERE e.id = ?", E::SELECT);
    let mut rows = conn.query(&sql, [key]).await?;
    match rows.next().await? {
        Some(row) => Ok(Some(E::from_row(&row)?)),
        None => Ok(None),
    }
}

/// Insert or update a row and replace its tag rows.
///
/// Never deletes the entity row, so `ON DELETE CASCADE` children survive.
pub async fn upsert<E: StoredEntity>(conn: &Connection, entity: &E) -> Result<()> {
    conn.execute(E::UPSERT, Params::Positional(entity.upsert_params()?))
        .await?;

    let (tag_table, owner) = E::TAG_TABLE;
    let key = entity.key();
    conn.execute(
        &format!("DELETE FROM {tag_table} WHERE {owner} = ?"),
        [key.as_str()],
    )
    .await?;

    for (position, tag) in entity.tags().iter().enumerate() {
        conn.execute(
            &format!("INSERT OR IGNORE INTO {tag_table} ({owner}, tag, position) VALUES (?, ?, ?)"),
            Params::Positional(vec![
                Value::Text(key.clone()),
                Value::Text(tag.clone()),
                Value::Integer(position as i64),
            ]),
        )
        .await?;
    }

    Ok(())
}

/// Delete a row by primary key; returns whether a row existed
pub async fn delete<E: StoredEntity>(conn: &Connection, key: &str) -> Result<bool> {
    let sql = format!("DELETE FROM {} WHERE id = ?", E::TABLE.name());
    let affected = conn.execute(&sql, [key]).await?;
    Ok(affected > 0)
}

/// All rows matching `value` on `index`, in insertion order
pub async fn query_by_index<E: StoredEntity>(
    conn: &Connection,
    index: Index,
    value: IndexValue,
) -> Result<Vec<E>> {
    let sql = if index == Index::Tag {
        let (tag_table, owner) = E::TAG_TABLE;
        format!(
            "{} WHERE EXISTS (SELECT 1 FROM {tag_table} t WHERE t.{owner} = e.id AND t.tag = ?)
             ORDER BY e.rowid",
            E::SELECT
        )
    } else {
        let column = E::index_column(index).ok_or_else(|| {
            Error::Validation(format!(
                "table '{}' has no index {index:?}",
                E::TABLE.name()
            ))
        })?;
        format!("{} WHERE {column} = ? ORDER BY e.rowid", E::SELECT)
    };

    collect(conn, &sql, Params::Positional(vec![value.into()])).await
}

/// Every row, in insertion order
pub async fn all<E: StoredEntity>(conn: &Connection) -> Result<Vec<E>> {
    let sql = format!("{} ORDER BY e.rowid", E::SELECT);
    collect(conn, &sql, Params::None).await
}

/// Rows whose sync status is anything but `synced`
pub async fn unsynced<E: StoredEntity>(conn: &Connection) -> Result<Vec<E>> {
    let sql = format!("{} WHERE e.sync_status != 'synced' ORDER BY e.rowid", E::SELECT);
    collect(conn, &sql, Params::None).await
}

/// Number of card rows owned by `deck_id`
pub async fn count_cards(conn: &Connection, deck_id: &str) -> Result<u32> {
    let mut rows = conn
        .query("SELECT COUNT(*) FROM cards WHERE deck_id = ?", [deck_id])
        .await?;
    let count = match rows.next().await? {
        Some(row) => integer(&row, 0)?,
        None => 0,
    };
    Ok(u32::try_from(count).unwrap_or(u32::MAX))
}

async fn collect<E: StoredEntity>(conn: &Connection, sql: &str, params: Params) -> Result<Vec<E>> {
    let mut rows = conn.query(sql, params).await?;
    let mut entities = Vec::new();
    while let Some(row) = rows.next().await? {
        entities.push(E::from_row(&row)?);
    }
    Ok(entities)
}

fn parse_id<T>(raw: &str) -> Result<T>
where
    T: std::str::FromStr<Err = uuid::Error>,
{
    raw.parse()
        .map_err(|error| Error::Database(format!("invalid id '{raw}': {error}")))
}

pub(crate) fn text(row: &Row, idx: i32) -> Result<String> {
    match row.get_value(idx)? {
        Value::Text(value) => Ok(value),
        other => Err(Error::Database(format!(
            "expected text in column {idx}, found {other:?}"
        ))),
    }
}

pub(crate) fn opt_text(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(value) => Ok(Some(value)),
        other => Err(Error::Database(format!(
            "expected text in column {idx}, found {other:?}"
        ))),
    }
}

pub(crate) fn integer(row: &Row, idx: i32) -> Result<i64> {
    match row.get_value(idx)? {
        Value::Integer(value) => Ok(value),
        other => Err(Error::Database(format!(
            "expected integer in column {idx}, found {other:?}"
        ))),
    }
}

fn opt_integer(row: &Row, idx: i32) -> Result<Option<i64>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Integer(value) => Ok(Some(value)),
        other => Err(Error::Database(format!(
            "expected integer in column {idx}, found {other:?}"
        ))),
    }
}

fn unsigned(row: &Row, idx: i32) -> Result<u64> {
    let value = integer(row, idx)?;
    u64::try_from(value)
        .map_err(|_| Error::Database(format!("negative counter {value} in column {idx}")))
}

fn json_list(row: &Row, idx: i32) -> Result<Vec<String>> {
    match opt_text(row, idx)? {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(Vec::new()),
    }
}

fn opt_text_value(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |value| Value::Text(value.to_string()))
}

const fn opt_integer_value(value: Option<i64>) -> Value {
    match value {
        Some(value) => Value::Integer(value),
        None => Value::Null,
    }
}
