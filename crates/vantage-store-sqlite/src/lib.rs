//! SQLite backend for the Vantage analytics engine.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. SQLite has no secondary
//! engine, so "loading" a view materialises it into a `<view>__rapid` table
//! that probes and reads then prefer.

mod encode;
mod engine;
mod fixtures;
mod schema;

pub mod error;

pub use engine::SqliteEngine;
pub use error::{Error, Result};
pub use fixtures::SAMPLE_DATA;
pub use schema::RAPID_SUFFIX;

#[cfg(test)]
mod tests;
