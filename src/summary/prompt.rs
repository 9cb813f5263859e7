//! Conversation transcript and prompt construction.

use crate::buffer::ChannelMessages;

/// System and user prompt for one summary request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Renders the transcript sent to the model.
///
/// Each channel becomes a `=== #name ===` block with its last
/// `max_per_channel` messages; blocks are separated by a blank line.
#[must_use]
pub fn build_conversation(channels: &[ChannelMessages], max_per_channel: usize) -> String {
    channels
        .iter()
        .filter(|c| !c.messages.is_empty())
        .map(|channel| {
            let skip = channel.messages.len().saturating_sub(max_per_channel);
            let lines: Vec<String> = channel.messages[skip..]
                .iter()
                .map(|msg| {
                    let mut line = format!("{}: {}", msg.author, msg.content);
                    if msg.attachments > 0 {
                        line.push_str(&format!(" [attachments: {}]", msg.attachments));
                    }
                    if msg.embeds > 0 {
                        line.push_str(&format!(" [embeds: {}]", msg.embeds));
                    }
                    line
                })
                .collect();
            format!("\n=== #{} ===\n{}", channel.channel_name, lines.join("\n"))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

const SAFETY_RULES: &str = "\
Safety instructions:
- Leave out or generalize any inappropriate, violent or discriminatory content
- Keep only the constructive side of sensitive topics
- Ignore personal attacks and defamatory remarks
- Keep the overall summary positive and constructive";

/// Builds the prompt for a daily (or manual) summary.
#[must_use]
pub fn daily_prompt(conversation: &str, guild_name: &str, language: &str) -> Prompt {
    let system = format!(
        "You are an expert at summarizing Discord chat logs of the '{guild_name}' server.\n\
         Look across all channels and write one integrated summary."
    );
    let user = format!(
        "Summarize the following Discord channel conversations.\n\
         \n\
         {conversation}\n\
         \n\
         Important instructions:\n\
         - Summarize all channels together as one overview\n\
         - Make clear who talked about what in which #channel\n\
         - Prioritize important information, decisions and notable topics\n\
         - Keep it concise and readable (at most 1800 characters)\n\
         - No preamble or extra explanation\n\
         - Use bullet points and headings for structure\n\
         - Add the honorific \"さん\" to every participant's display name\n\
         - Write the summary in {language}\n\
         \n\
         {SAFETY_RULES}"
    );
    Prompt { system, user }
}

/// Builds the prompt for the weekly summary.
#[must_use]
pub fn weekly_prompt(conversation: &str, guild_name: &str, language: &str) -> Prompt {
    let system = format!(
        "You are an expert at summarizing Discord chat logs of the '{guild_name}' server.\n\
         Analyze a whole week of activity from above and write a concise, readable summary."
    );
    let user = format!(
        "The following is one week of Discord channel conversations.\n\
         \n\
         {conversation}\n\
         \n\
         Important instructions:\n\
         - Summarize the week's activity as a whole\n\
         - Organize the main topics, decisions and progress\n\
         - Describe the activity trend of each channel\n\
         - Highlight important events and notable discussions\n\
         - Mention changes between the first and second half of the week, if any\n\
         - Keep it concise and readable (at most 1800 characters)\n\
         - Use bullet points and headings for structure\n\
         - Add the honorific \"さん\" to every participant's display name\n\
         - Write the summary in {language}\n\
         \n\
         {SAFETY_RULES}"
    );
    Prompt { system, user }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::buffer::MessageData;
    use crate::discord::Snowflake;

    fn channel(name: &str, contents: &[&str]) -> ChannelMessages {
        ChannelMessages {
            channel_id: Snowflake(1),
            channel_name: name.to_owned(),
            messages: contents
                .iter()
                .enumerate()
                .map(|(i, c)| MessageData {
                    message_id: Snowflake(i as u64),
                    author: "Alice".to_owned(),
                    content: (*c).to_owned(),
                    timestamp: Utc::now(),
                    jump_url: String::new(),
                    channel_id: Snowflake(1),
                    channel_name: name.to_owned(),
                    attachments: 0,
                    embeds: 0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_build_conversation_format() {
        let mut general = channel("general", &["hello", "world"]);
        general.messages[1].attachments = 2;
        general.messages[1].embeds = 1;
        let random = channel("random", &["hi"]);

        let text = build_conversation(&[general, random], 100);
        assert_eq!(
            text,
            "\n=== #general ===\nAlice: hello\nAlice: world [attachments: 2] [embeds: 1]\
             \n\n\n=== #random ===\nAlice: hi"
        );
    }

    #[test]
    fn test_build_conversation_keeps_last_messages() {
        let general = channel("general", &["one", "two", "three"]);
        let text = build_conversation(&[general], 2);
        assert!(!text.contains("one"));
        assert!(text.contains("Alice: two\nAlice: three"));
    }

    #[test]
    fn test_prompts_mention_guild_and_language() {
        let daily = daily_prompt("CONVO", "My Server", "English");
        assert!(daily.system.contains("'My Server'"));
        assert!(daily.user.contains("CONVO"));
        assert!(daily.user.contains("Write the summary in English"));

        let weekly = weekly_prompt("CONVO", "My Server", "Japanese");
        assert!(weekly.user.contains("one week"));
        assert!(weekly.user.contains("Safety instructions"));
    }
}
