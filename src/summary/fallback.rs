//! Keyword summary used when the model is unavailable.

use std::collections::HashMap;

use crate::buffer::ChannelMessages;

/// Text returned when no channel has any keyword.
pub const NO_TOPICS: &str = "No particular topics were found.";

/// Lists the three most frequent long words (more than 4 characters) of each channel.
///
/// Ties keep the order in which words were first seen.
#[must_use]
pub fn simple_summary(channels: &[ChannelMessages]) -> String {
    let lines: Vec<String> = channels
        .iter()
        .filter_map(|channel| {
            let keywords = top_words(channel, 3);
            if keywords.is_empty() {
                None
            } else {
                Some(format!("**#{}**: {}", channel.channel_name, keywords.join(", ")))
            }
        })
        .collect();

    if lines.is_empty() {
        NO_TOPICS.to_owned()
    } else {
        lines.join("\n")
    }
}

fn top_words(channel: &ChannelMessages, limit: usize) -> Vec<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for msg in &channel.messages {
        for word in msg.content.to_lowercase().split_whitespace() {
            if word.chars().count() <= 4 {
                continue;
            }
            if let Some(&i) = index.get(word) {
                counts[i].1 += 1;
            } else {
                index.insert(word.to_owned(), counts.len());
                counts.push((word.to_owned(), 1));
            }
        }
    }

    // stable sort keeps first-seen order among equal counts
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().take(limit).map(|(w, _)| w).collect()
}
