//! SQLite-backed cache backend

mod backend;

pub use backend::{SqliteBackend, SqliteConfig};
