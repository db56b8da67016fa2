use clanker_core::types::Message;

const NO_RECENT_MESSAGES: &str = "(No recent messages)";

fn render_transcript(messages: &[Message]) -> String {
    if messages.is_empty() {
        return NO_RECENT_MESSAGES.to_string();
    }
    messages
        .iter()
        .map(|m| format!("{}: {}", m.username, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt for an unprompted, spontaneous chat contribution.
pub fn spontaneous_prompt(channel: &str, context: &[Message]) -> String {
    format!(
        "You are a chat bot hanging out in the Twitch channel #{channel}. \
         Here is the recent conversation:\n{}\n\n\
         Write a short, casual message to contribute to the conversation. \
         Do not greet anyone or introduce yourself.",
        render_transcript(context)
    )
}

/// Prompt for a direct response to a mention.
pub fn mention_response_prompt(channel: &str, username: &str, mention_text: &str, context: &[Message]) -> String {
    format!(
        "You are a chat bot in the Twitch channel #{channel}. \
         {username} just mentioned you, saying: \"{mention_text}\"\n\n\
         Recent conversation for context:\n{}\n\n\
         Reply directly to {username} in a short, casual message.",
        render_transcript(context)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn msg(username: &str, content: &str) -> Message {
        Message {
            id: 1,
            channel: "chan".to_string(),
            username: username.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
            is_bot_message: false,
            is_mention: false,
        }
    }

    #[test]
    fn spontaneous_prompt_uses_placeholder_when_empty() {
        let prompt = spontaneous_prompt("chan", &[]);
        assert!(prompt.contains(NO_RECENT_MESSAGES));
    }

    #[test]
    fn mention_response_prompt_includes_username_and_text() {
        let context = vec![msg("alice", "hi")];
        let prompt = mention_response_prompt("chan", "bob", "hey bot", &context);
        assert!(prompt.contains("bob"));
        assert!(prompt.contains("hey bot"));
        assert!(prompt.contains("alice: hi"));
    }
}
