//! Summary generation module.
//!
//! Builds prompts from buffered conversations, calls the OpenAI chat
//! API and falls back to a keyword summary when the API is unavailable.

mod fallback;
mod openai;
mod prompt;
mod summarizer;
mod usage;

pub use fallback::{NO_TOPICS, simple_summary};
pub use openai::{OpenAiClient, OpenAiError};
pub use prompt::{Prompt, build_conversation, daily_prompt, weekly_prompt};
pub use summarizer::{GENERATION_FAILED, NO_MESSAGES, Summarizer, build_summary_embed};
pub use usage::ApiUsage;
