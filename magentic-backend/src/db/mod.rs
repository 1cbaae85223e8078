//! Task queue persistence

mod sqlite;
mod tables;

pub use sqlite::Database;
