//! Core types and trait definitions for the Vantage decisioning engine.
//!
//! No HTTP or database dependencies live here. The crate
//! holds the data model shared by every other crate, the error taxonomy, the
//! static metric catalog, and the two capability seams the rest of the
//! system is written against: [`engine::AnalyticsEngine`] (the relational
//! store with an accelerated secondary engine) and [`reasoner::Reasoner`]
//! (the external language model).

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod answer;
pub mod engine;
pub mod error;
pub mod intent;
pub mod metric;
pub mod reasoner;
pub mod schema;
pub mod view;

pub use error::{Error, Result};
