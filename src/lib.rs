//! Summary Bot Library
//!
//! A Discord bot that summarizes server conversations with an OpenAI model.
//!
//! This crate provides the core functionality for:
//! - Loading credentials, settings and the summary schedule
//! - Talking to the Discord gateway and REST API
//! - Buffering guild messages in memory for a week
//! - Generating summaries with a keyword fallback
//! - Posting summaries on a schedule and handling text commands

pub mod bot;
pub mod buffer;
pub mod commands;
pub mod config;
pub mod discord;
pub mod scheduler;
pub mod summary;
