//! revise-core - Core library for Revise
//!
//! This crate contains the shared models, the local offline store, and the
//! sync protocol used by the Revise API and clients.

pub mod ai;
pub mod auth;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod sync;
pub mod trigger;
pub mod util;

pub use error::{Error, Result};
pub use models::{Deck, DeckId, EntityChange, KnowledgeState, PendingChange};
