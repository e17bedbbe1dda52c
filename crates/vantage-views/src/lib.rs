//! Analytical view management: SQL generation from schema snapshots, schema
//! introspection, and the view lifecycle manager.
//!
//! Generation is a pure function over a [`SchemaSnapshot`] value; only the
//! [`ViewManager`] and [`introspect::capture`] touch an engine.
//!
//! [`SchemaSnapshot`]: vantage_core::schema::SchemaSnapshot

mod dialect;

pub mod generator;
pub mod health;
pub mod introspect;
pub mod manager;

pub use generator::{GenerationParams, SqlGenerator};
pub use health::HealthWeights;
pub use manager::{EnsureOutcome, SweepEntry, ViewManager, ViewSettings};

#[cfg(test)]
mod testing;
