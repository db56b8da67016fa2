/// Collapse evasion spacing/punctuation, fold common leetspeak, and strip
/// anything that isn't a lowercase ASCII letter.
///
/// Mirrors the original implementation's `normalize_text`: this exists to
/// catch evasions like `s.p.a.m` or `5p4m`, not to be a general Unicode
/// normalizer.
pub fn normalize_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let lowered = text.to_lowercase();

    let despaced: String = lowered
        .chars()
        .filter(|c| !matches!(c, ' ' | '\t' | '\n' | '\r' | '.' | '-' | '_' | '*' | '+' | '=' | '|' | '\\' | '/' | '<' | '>'))
        .collect();

    let unleeted: String = despaced
        .chars()
        .map(|c| match c {
            '0' => 'o',
            '1' => 'i',
            '3' => 'e',
            '4' => 'a',
            '5' => 's',
            '7' => 't',
            '8' => 'b',
            '@' => 'a',
            '$' => 's',
            '|' => 'l',
            other => other,
        })
        .collect();

    unleeted.chars().filter(|c| c.is_ascii_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_leetspeak_and_spacing() {
        assert_eq!(normalize_text("s p a m"), "spam");
        assert_eq!(normalize_text("5p4m"), "spam");
        assert_eq!(normalize_text("S.P.A.M"), "spam");
    }

    #[test]
    fn strips_remaining_symbols() {
        assert_eq!(normalize_text("hello!!!"), "hello");
        assert_eq!(normalize_text(""), "");
    }
}
