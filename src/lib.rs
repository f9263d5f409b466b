//! Crawls a MediaWiki herb category into a JSON dataset and keeps it
//! topped up from Wikipedia, one checkpoint per record.

pub mod backfill;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod downloads;
pub mod engine;
pub mod error;
pub mod http;
pub mod images;
pub mod log;
pub mod mediawiki;
pub mod merge;
pub mod model;
pub mod robots;
pub mod source;
pub mod store;
pub mod text;
pub mod wikipedia;
