//! Gemini-backed remote extractor (feature `gemini`).

pub mod client;
pub mod prompts;
pub mod types;

pub use client::*;
pub use types::*;
