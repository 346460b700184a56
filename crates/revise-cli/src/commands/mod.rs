pub mod auth_cmd;
pub mod common;
pub mod completions;
pub mod config;
pub mod daemon;
pub mod deck;
pub mod generate;
pub mod knowledge;
pub mod sync;
