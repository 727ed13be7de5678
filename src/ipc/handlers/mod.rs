pub mod core;
pub mod engine;
pub mod reports;
pub mod roster;
pub mod scores;
pub mod setup;
