//! `From` header formatting
//!
//! Printable ASCII display names become RFC 5322 quoted-strings. Anything
//! else becomes a run of RFC 2047 `Q` encoded-words.

use std::fmt::Write;

const ENCODED_WORD_PREFIX: &str = "=?utf-8?q?";
const ENCODED_WORD_SUFFIX: &str = "?=";
const MAX_ENCODED_WORD: usize = 75;

/// Format the source of a message from its sender's name and address
///
/// An empty address yields the null sender `<>`, and an empty name yields
/// the bare address.
#[must_use]
pub fn format_source(name: &str, addr: &str) -> String {
    if addr.is_empty() {
        return "<>".to_string();
    }

    if name.is_empty() {
        return addr.to_string();
    }

    let display = if name.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        quote(name)
    } else {
        encode_words(name)
    };

    format!("{display} <{addr}>")
}

fn quote(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('"');
    for c in name.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Characters that may appear unencoded in a `Q` encoded-word in a phrase
const fn is_literal(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '!' | '*' | '+' | '-' | '/')
}

fn encode_char(c: char, out: &mut String) {
    if c == ' ' {
        out.push('_');
    } else if is_literal(c) {
        out.push(c);
    } else {
        let mut buf = [0; 4];
        for byte in c.encode_utf8(&mut buf).bytes() {
            let _ = write!(out, "={byte:02X}");
        }
    }
}

fn encode_words(name: &str) -> String {
    let budget = MAX_ENCODED_WORD - ENCODED_WORD_PREFIX.len() - ENCODED_WORD_SUFFIX.len();

    let mut words = Vec::new();
    let mut current = String::new();
    let mut encoded = String::new();

    for c in name.chars() {
        encoded.clear();
        encode_char(c, &mut encoded);

        if !current.is_empty() && current.len() + encoded.len() > budget {
            words.push(std::mem::take(&mut current));
        }
        current.push_str(&encoded);
    }
    words.push(current);

    words
        .iter()
        .map(|word| format!("{ENCODED_WORD_PREFIX}{word}{ENCODED_WORD_SUFFIX}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_null_sender() {
        assert_eq!(format_source("", ""), "<>");
        assert_eq!(format_source("John", ""), "<>");
    }

    #[test]
    fn test_bare_address() {
        assert_eq!(
            format_source("", "johndoe@example.com"),
            "johndoe@example.com"
        );
    }

    #[test]
    fn test_ascii_names_are_quoted() {
        assert_eq!(
            format_source("Johnny", "johndoe@example.com"),
            "\"Johnny\" <johndoe@example.com>"
        );
        assert_eq!(
            format_source("John \"JD\" Doe", "johndoe@example.com"),
            r#""John \"JD\" Doe" <johndoe@example.com>"#
        );
        assert_eq!(
            format_source(r"Back\slash", "a@example.com"),
            r#""Back\\slash" <a@example.com>"#
        );
    }

    #[test]
    fn test_non_ascii_names_are_encoded() {
        assert_eq!(
            format_source("John Dø", "johndoe@example.com"),
            "=?utf-8?q?John_D=C3=B8?= <johndoe@example.com>"
        );
        assert_eq!(
            format_source("Jøhnny", "johnnydoe@example.com"),
            "=?utf-8?q?J=C3=B8hnny?= <johnnydoe@example.com>"
        );
        assert_eq!(
            format_source("Zoë \"Z\"", "z@example.com"),
            "=?utf-8?q?Zo=C3=AB_=22Z=22?= <z@example.com>"
        );
    }

    #[test]
    fn test_long_names_split_into_words() {
        let name = "ø".repeat(30);
        let display = encode_words(&name);
        let words: Vec<_> = display.split(' ').collect();

        assert!(words.len() > 1);
        for word in &words {
            assert!(word.len() <= MAX_ENCODED_WORD, "{word} is too long");
            assert!(word.starts_with(ENCODED_WORD_PREFIX));
            assert!(word.ends_with(ENCODED_WORD_SUFFIX));
        }

        // Every word holds whole characters only
        let payload: String = words
            .iter()
            .map(|w| &w[ENCODED_WORD_PREFIX.len()..w.len() - ENCODED_WORD_SUFFIX.len()])
            .collect();
        assert_eq!(payload, "=C3=B8".repeat(30));
        for word in &words {
            assert_eq!((word.len() - 12) % 6, 0);
        }
    }
}
