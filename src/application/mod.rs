//! Application services layer.

pub mod auth;
pub mod documents;
pub mod error;
pub mod repos;
