pub mod card;
pub mod common;
pub mod deck;
pub mod sync;
