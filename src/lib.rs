//! Weather Station - ingestion, query, dashboards, chat and image
//! classification for a home weather station.
//!
//! This library exposes the core modules for testing and reuse.

pub mod chat;
pub mod classifier;
pub mod common;
pub mod config;
pub mod entity;
pub mod error;
pub mod forecast;
pub mod genai;
pub mod killswitch;
pub mod metoffice;
pub mod query;
pub mod routes;
pub mod storage;
pub mod store;
pub mod weather;
