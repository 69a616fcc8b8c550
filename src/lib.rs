//! Folio - Blog content, live chat and booking backend
//!
//! This library provides the core functionality behind the Folio service:
//! content storage and caching, the live chat flow with its realtime hub,
//! and the supporting integrations (notifications, AI assist, booking).

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod realtime;
pub mod services;
