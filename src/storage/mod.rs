//! SQLite-backed local mirror storage.
//!
//! This module provides the persistence layer for the sync engine:
//!
//! - SQLite database holding origins, folder generations, message aggregates
//!   and their folder/uid records
//! - Async-safe database operations via tokio::task::spawn_blocking
//! - [`SqliteRepository`], the [`crate::sync::Repository`] implementation the
//!   engine runs against

mod database;
pub mod queries;
mod repository;
mod schema;

pub use database::{Database, DatabaseError, Result};
pub use repository::SqliteRepository;
