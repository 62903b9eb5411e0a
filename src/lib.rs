//! Document storage service: authenticated upload, listing, retrieval and deletion of file
//! and JSON documents, with a TTL cache in front of the record store.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
