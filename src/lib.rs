//! omsmini: order management with incrementally maintained statistics
//!
//! Orders and their lines live in the fact tables. Seven statistics tables
//! and a summary are derived from them: the seeder rebuilds empty tables at
//! startup, and every order write updates them inside its own transaction.

pub mod aggregates;
pub mod catalog;
pub mod config;
pub mod error;
pub mod model;
pub mod orders;
pub mod retry;
pub mod runtime;
pub mod stats;
pub mod store;

pub use error::{OmsError, Result};
