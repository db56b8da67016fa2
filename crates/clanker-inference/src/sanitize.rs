const MAX_LEN: usize = 500;
const MIN_TRUNCATE_BOUNDARY: usize = 400;

/// Strip Markdown emphasis markers the model tends to emit.
fn strip_markdown(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '*' | '_' | '`' | '#'))
        .collect()
}

/// Keep only characters sensible for a Twitch chat message.
fn strip_disallowed_chars(text: &str) -> String {
    text.chars()
        .filter(|c| {
            c.is_alphanumeric()
                || c.is_whitespace()
                || matches!(
                    c,
                    '.' | ',' | '!' | '?' | '\'' | '"' | ':' | ';' | '-' | '(' | ')' | '@'
                )
        })
        .collect()
}

/// Truncate to at most [`MAX_LEN`] chars, preferring to cut at the last word
/// boundary at or after [`MIN_TRUNCATE_BOUNDARY`] so a reply doesn't end
/// mid-word.
fn truncate(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= MAX_LEN {
        return text.to_string();
    }

    let window: String = chars[..MAX_LEN].iter().collect();
    if let Some(idx) = window.rfind(' ') {
        if idx >= MIN_TRUNCATE_BOUNDARY {
            return window[..idx].to_string();
        }
    }
    window
}

/// Full output-sanitization pipeline applied to every model response before
/// it reaches the content filter / transport: take the first non-empty
/// line, strip Markdown and disallowed characters, then truncate.
pub fn sanitize_response(raw: &str) -> String {
    let first_line = raw
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");

    let cleaned = strip_disallowed_chars(&strip_markdown(first_line));
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate(&collapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takes_first_non_empty_line() {
        assert_eq!(sanitize_response("\n\nhello there\nignored second line"), "hello there");
    }

    #[test]
    fn strips_markdown_and_disallowed_chars() {
        assert_eq!(sanitize_response("**bold** `code` <script>"), "bold code script");
    }

    #[test]
    fn truncates_long_output_at_word_boundary() {
        let long = "word ".repeat(200);
        let result = sanitize_response(&long);
        assert!(result.chars().count() <= MAX_LEN);
        assert!(!result.ends_with("wor"));
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(sanitize_response(""), "");
        assert_eq!(sanitize_response("\n\n\n"), "");
    }
}
