use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use decksync_core::models::ConflictResolution;

#[derive(Parser)]
#[command(name = "decksync")]
#[command(about = "Offline-first flashcard decks with remote sync")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Base URL of the deck service (overrides DECKSYNC_API_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage decks
    #[command(subcommand)]
    Deck(DeckCommand),
    /// Manage cards
    #[command(subcommand)]
    Card(CardCommand),
    /// Push local changes and pull new decks
    Sync {
        /// Output the run result as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recorded sync conflicts
    Conflicts {
        /// Include resolved conflicts
        #[arg(long)]
        all: bool,
        /// Forget resolved conflicts instead of listing
        #[arg(long, conflicts_with = "all")]
        clear: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Settle a recorded conflict
    Resolve {
        /// Conflict ID
        id: String,
        /// Which side wins
        #[arg(value_enum)]
        resolution: ResolutionArg,
    },
}

#[derive(Subcommand)]
pub enum DeckCommand {
    /// Create a new deck
    #[command(alias = "new")]
    Add {
        /// Deck name
        name: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Tag to attach (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    /// List decks
    List {
        /// Case-insensitive match on name or description
        #[arg(short, long)]
        search: Option<String>,
        /// Only decks carrying every given tag (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing deck
    Edit {
        /// Deck ID or unique ID prefix
        id: String,
        #[command(flatten)]
        changes: DeckChanges,
    },
    /// Delete a deck and its cards
    Delete {
        /// Deck ID or unique ID prefix
        id: String,
    },
}

#[derive(Args, Debug, Default)]
pub struct DeckChanges {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long, conflicts_with = "clear_description")]
    pub description: Option<String>,
    #[arg(long)]
    pub clear_description: bool,
    /// Replace the tag set (repeatable)
    #[arg(long = "tag", conflicts_with = "clear_tags")]
    pub tags: Vec<String>,
    #[arg(long)]
    pub clear_tags: bool,
}

#[derive(Subcommand)]
pub enum CardCommand {
    /// Create a card in a deck
    #[command(alias = "new")]
    Add {
        /// Owning deck ID or unique ID prefix
        deck: String,
        #[arg(long)]
        front: String,
        #[arg(long, default_value = "")]
        back: String,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        image_url: Option<String>,
        /// Tag to attach (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    /// List cards
    List {
        /// Only cards of this deck
        #[arg(short, long)]
        deck: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing card
    Edit {
        /// Card ID or unique ID prefix
        id: String,
        #[command(flatten)]
        changes: CardChanges,
    },
    /// Delete a card
    Delete {
        /// Card ID or unique ID prefix
        id: String,
    },
}

#[derive(Args, Debug, Default)]
pub struct CardChanges {
    #[arg(long)]
    pub front: Option<String>,
    #[arg(long)]
    pub back: Option<String>,
    #[arg(long, conflicts_with = "clear_notes")]
    pub notes: Option<String>,
    #[arg(long)]
    pub clear_notes: bool,
    #[arg(long, conflicts_with = "clear_image")]
    pub image_url: Option<String>,
    #[arg(long)]
    pub clear_image: bool,
    /// Replace the tag set (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ResolutionArg {
    Local,
    Remote,
    Merge,
}

impl From<ResolutionArg> for ConflictResolution {
    fn from(value: ResolutionArg) -> Self {
        match value {
            ResolutionArg::Local => Self::Local,
            ResolutionArg::Remote => Self::Remote,
            ResolutionArg::Merge => Self::Merge,
        }
    }
}
