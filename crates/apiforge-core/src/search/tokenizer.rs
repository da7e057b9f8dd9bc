//! Term extraction for indexed fields and queries.
//!
//! Words are runs of Unicode letters and digits. Each word is indexed in full
//! (lowercased) and, when it contains camelCase humps or letter/digit
//! boundaries, as its individual parts too, so `getUserById` is found by
//! `user` as well as by `getuserbyid`. Hump detection only looks at ASCII
//! case; scripts without case stay whole words.

use once_cell::sync::Lazy;
use regex::Regex;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{Alphabetic}\p{N}]+").expect("word pattern"));

/// Tokenize field text into index terms, keeping duplicates so term
/// frequency can be counted.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let mut terms = Vec::new();
    for word in WORD.find_iter(text) {
        let word = word.as_str();
        terms.push(word.to_lowercase());

        let parts = split_word(word);
        if parts.len() > 1 {
            terms.extend(parts.into_iter().map(str::to_lowercase));
        }
    }
    terms
}

/// Tokenize a query: the whole lowercased words only, in order.
///
/// Query words are not split so that a camelCase query such as `getUser`
/// keeps its specificity; the index side already holds the parts.
#[must_use]
pub fn tokenize_query(text: &str) -> Vec<String> {
    WORD.find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Split a word on lower→upper humps, acronym ends (`HTTPServer` →
/// `HTTP`, `Server`) and letter/digit boundaries.
fn split_word(word: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = word.char_indices().collect();
    let mut parts = Vec::new();
    let mut start = 0;

    for i in 1..chars.len() {
        let (idx, cur) = chars[i];
        let prev = chars[i - 1].1;
        let next = chars.get(i + 1).map(|&(_, c)| c);

        let boundary = (prev.is_ascii_lowercase() && cur.is_ascii_uppercase())
            || (prev.is_ascii_alphabetic() && cur.is_ascii_digit())
            || (prev.is_ascii_digit() && cur.is_ascii_alphabetic())
            || (prev.is_ascii_uppercase()
                && cur.is_ascii_uppercase()
                && next.is_some_and(|n| n.is_ascii_lowercase()));

        if boundary {
            parts.push(&word[start..idx]);
            start = idx;
        }
    }
    parts.push(&word[start..]);
    parts
}
