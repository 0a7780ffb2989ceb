//! News Digest - a multi-source feed aggregation service
//!
//! This crate fetches many syndication sources concurrently, extracts and
//! filters their items, resolves a display image for each one and serves a
//! ranked, per-category capped digest as JSON.

pub mod config;
pub mod fetcher;
pub mod images;
pub mod item;
pub mod parser;
pub mod pipeline;
pub mod relevance;
pub mod routes;
pub mod selector;
