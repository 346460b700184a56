//! Shared services used by clients.

mod local_store;

pub use local_store::{LocalStore, MergeReport};
