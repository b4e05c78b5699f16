//! Gallery database core for browsing AI-scored photo libraries.
//!
//! The external scoring pipeline writes images, folders and path overrides
//! into a SQLite database; this crate provides the filtered, sorted and
//! paginated views over that data, including the derived per-stack
//! aggregate cache that lets bursts of near-duplicate shots browse as one
//! unit.

pub mod config;
pub mod db;
pub mod gallery;
pub mod logging;

pub use config::Config;
pub use db::{
    ColorLabel, Database, DbError, DbResult, Folder, ImageDetail, ImageFilter, ImageRow,
    ListQuery, SortColumn, SortOrder, StackCacheManager, StackItem,
};
pub use gallery::Gallery;
