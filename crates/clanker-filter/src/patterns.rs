use std::fs;
use std::sync::Arc;

use arc_swap::ArcSwap;
use regex::Regex;
use tracing::{info, warn};

use crate::error::{FilterError, Result};
use crate::normalize::normalize_text;

struct Rules {
    patterns: Vec<Regex>,
    word_count: usize,
}

/// Reloadable set of blocked-word/phrase patterns, compiled from a plain-text
/// file (one entry per line, `#`-prefixed comments and blank lines skipped).
///
/// Each entry yields up to two compiled patterns: one over the original
/// phrase, one over its normalized form (skipped if identical), matching
/// `ContentFilter.load_blocked_words`.
pub struct BlockList {
    path: String,
    rules: ArcSwap<Rules>,
}

impl BlockList {
    pub fn load(path: &str) -> Result<Self> {
        let rules = compile_rules(path)?;
        Ok(Self {
            path: path.to_string(),
            rules: ArcSwap::from_pointee(rules),
        })
    }

    /// Re-read the blocklist file and atomically swap in the new rule set.
    /// Callable at runtime without restarting the bot.
    pub fn reload(&self) -> Result<()> {
        let rules = compile_rules(&self.path)?;
        self.rules.store(Arc::new(rules));
        info!(path = %self.path, "blocklist reloaded");
        Ok(())
    }

    pub fn word_count(&self) -> usize {
        self.rules.load().word_count
    }

    /// True if any compiled pattern matches `original` or `normalized`.
    pub fn matches(&self, original: &str, normalized: &str) -> bool {
        let rules = self.rules.load();
        rules
            .patterns
            .iter()
            .any(|p| p.is_match(original) || p.is_match(normalized))
    }
}

fn compile_rules(path: &str) -> Result<Rules> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path, "blocklist file not found, starting with an empty list");
            return Ok(Rules {
                patterns: Vec::new(),
                word_count: 0,
            });
        }
        Err(e) => return Err(FilterError::BlocklistRead { path: path.to_string(), source: e }),
    };

    let mut patterns = Vec::new();
    let mut word_count = 0;

    for (line_no, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let original_lower = line.to_lowercase();
        let normalized = normalize_text(&original_lower);
        if normalized.is_empty() {
            continue;
        }
        word_count += 1;

        if let Some(p) = compile_one(&original_lower, line_no + 1)? {
            patterns.push(p);
        }
        if normalized != original_lower {
            if let Some(p) = compile_one(&normalized, line_no + 1)? {
                patterns.push(p);
            }
        }
    }

    info!(count = word_count, path, "blocklist loaded");
    Ok(Rules { patterns, word_count })
}

fn compile_one(text: &str, line: usize) -> Result<Option<Regex>> {
    let escaped = regex::escape(text);
    let pattern = if text.contains(' ') {
        format!(r"(?i)(?:^|[^[:alnum:]_]){}(?:[^[:alnum:]_]|$)", escaped)
    } else {
        format!(r"(?i)\b{}\b", escaped)
    };
    Regex::new(&pattern)
        .map(Some)
        .map_err(|e| FilterError::InvalidPattern { line, reason: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_single_words_and_phrases() {
        let f = write_temp("badword\nbad phrase\n# comment\n\n");
        let list = BlockList::load(f.path().to_str().unwrap()).unwrap();
        assert_eq!(list.word_count(), 2);
        assert!(list.matches("this has badword in it", "thishasbadwordinit"));
        assert!(list.matches("a bad phrase here", "abadphrasehere"));
        assert!(!list.matches("badwords are different", "badwordsaredifferent"));
    }

    #[test]
    fn missing_file_yields_empty_list_not_error() {
        let list = BlockList::load("/nonexistent/path/blocked.txt").unwrap();
        assert_eq!(list.word_count(), 0);
    }

    #[test]
    fn reload_picks_up_new_contents() {
        let f = write_temp("first\n");
        let list = BlockList::load(f.path().to_str().unwrap()).unwrap();
        assert_eq!(list.word_count(), 1);

        std::fs::write(f.path(), "first\nsecond\n").unwrap();
        list.reload().unwrap();
        assert_eq!(list.word_count(), 2);
    }
}
