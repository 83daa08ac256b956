//! Identifier newtypes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new unique ID using UUID v7
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Get the string representation of this ID
            #[must_use]
            pub fn as_str(&self) -> String {
                self.0.to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

entity_id!(
    /// A unique identifier for a deck (UUID v7, time-sortable)
    DeckId
);

entity_id!(
    /// A unique identifier for a card
    CardId
);

entity_id!(
    /// A unique identifier for a recorded sync conflict
    ConflictId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deck_id_unique() {
        assert_ne!(DeckId::new(), DeckId::new());
    }

    #[test]
    fn test_card_id_parse() {
        let id = CardId::new();
        let parsed: CardId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_id_serializes_as_plain_string() {
        let id = DeckId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }

    #[test]
    fn test_invalid_id_rejected() {
        assert!("not-a-uuid".parse::<ConflictId>().is_err());
    }
}
