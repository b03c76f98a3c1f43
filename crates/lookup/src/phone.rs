//! Deterministic phone number recognition.
//!
//! Used when the extraction model's reply cannot be parsed, and to bring the
//! model's own output to one canonical `+1-XXX-XXX-XXXX` form.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

// Optional +1/1 country code, area code with or without parentheses, then
// 3 + 4 digits separated by nothing, dashes, dots or whitespace.
static US_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+?1[-.\s]?)?\(?(\d{3})\)?[-.\s]?(\d{3})[-.\s]?(\d{4})\b")
        .expect("phone pattern compiles")
});

fn format_us(area: &str, exchange: &str, line: &str) -> String {
    format!("+1-{area}-{exchange}-{line}")
}

/// Find every US-style phone number in `text`, canonicalized and
/// deduplicated, in order of first appearance.
pub fn scan(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut numbers = Vec::new();

    for caps in US_NUMBER.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        // Digits glued to the front mean this is the tail of a longer number.
        if text[..whole.start()]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_digit())
        {
            continue;
        }

        let formatted = format_us(&caps[1], &caps[2], &caps[3]);
        if seen.insert(formatted.clone()) {
            numbers.push(formatted);
        }
    }

    numbers
}

/// Canonical form of a single number, if it is a recognizable US number.
///
/// Ten digits get a `+1` prefix; eleven digits must start with the `1`
/// country code. A leading `+` with any other country code is rejected.
pub fn canonicalize(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty()
        || !raw
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | '(' | ')' | ' '))
    {
        return None;
    }

    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let national = match digits.len() {
        10 if !raw.starts_with('+') => digits.as_str(),
        11 if digits.starts_with('1') => &digits[1..],
        _ => return None,
    };

    Some(format_us(&national[..3], &national[3..6], &national[6..]))
}

/// Canonicalize where possible, keep other entries verbatim, drop blanks and
/// duplicates.
pub fn normalize_all<I, S>(numbers: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    numbers
        .into_iter()
        .filter_map(|n| {
            let n = n.as_ref().trim();
            if n.is_empty() {
                return None;
            }
            Some(canonicalize(n).unwrap_or_else(|| n.to_string()))
        })
        .filter(|n| seen.insert(n.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_parenthesized_area_code() {
        let text = "Tony's Pizza, call (415) 555-0199 for reservations.";
        assert_eq!(scan(text), vec!["+1-415-555-0199"]);
    }

    #[test]
    fn scan_mixed_formats_dedupes_by_canonical_form() {
        let text = "Main: 212.555.0143. Alt: +1 212 555 0143. \
                    Fax 1-646-555-0188, mobile 6465550111.";
        assert_eq!(
            scan(text),
            vec!["+1-212-555-0143", "+1-646-555-0188", "+1-646-555-0111"]
        );
    }

    #[test]
    fn scan_ignores_longer_digit_runs() {
        assert!(scan("order 98765432101234").is_empty());
        assert!(scan("no numbers here").is_empty());
    }

    #[test]
    fn canonicalize_variants() {
        assert_eq!(canonicalize("(415) 555-0199").as_deref(), Some("+1-415-555-0199"));
        assert_eq!(canonicalize("+1-415-555-0199").as_deref(), Some("+1-415-555-0199"));
        assert_eq!(canonicalize("14155550199").as_deref(), Some("+1-415-555-0199"));
        assert_eq!(canonicalize("+44 20 7946 0958"), None);
        assert_eq!(canonicalize("+4420794609"), None);
        assert_eq!(canonicalize("555-0199"), None);
        assert_eq!(canonicalize("call 415 555 0199"), None);
    }

    #[test]
    fn normalize_keeps_unknown_formats() {
        let out = normalize_all(["415.555.0199", "+44 20 7946 0958", "", "(415) 555-0199"]);
        assert_eq!(out, vec!["+1-415-555-0199", "+44 20 7946 0958"]);
    }
}
