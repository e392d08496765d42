//! Recipe API: recipe management REST backend in Rust
//!
//! Users register and obtain bearer tokens, then manage their own tags,
//! ingredients and recipes (with many-to-many links and image upload).
//! Storage is an embedded Sled database; the HTTP layer is Axum.
//!
//! This lib exposes the storage engine, validation/serialization and the router.

pub mod auth;
pub mod config;
pub mod media;
pub mod models;
// Recipe list filtering (comma-separated id parameters, owner scoping)
pub mod query;
// REST API module: Axum router, auth middleware, handlers
pub mod rest;
pub mod serializers;
pub mod storage;
pub mod telemetry;
