//! Hosted generative model API (`generateContent`).

mod client;
pub mod models;

pub use client::GenAiClient;
