//! Query intent detection.
//!
//! A query is classified before it reaches the index. Precedence is exact
//! path, then hook name, then HTTP method prefix, then free text.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::descriptor::HttpMethod;

static HOOK_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^use[A-Z][A-Za-z0-9_]*$").expect("hook pattern"));

/// What the user most likely meant by a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryIntent {
    /// The whole query is a known path template.
    ExactPath(String),
    /// A generated hook name such as `useGetUser`; carries `getUser`.
    Hook(String),
    /// A leading HTTP method; carries the trimmed remainder.
    Method {
        /// The requested method.
        method: HttpMethod,
        /// Remaining query text, possibly empty.
        rest: String,
    },
    /// Generic text.
    Free(String),
}

impl QueryIntent {
    /// Classify a trimmed query. `is_known_path` answers whether a string is
    /// a path template of some indexed descriptor.
    pub fn detect(query: &str, is_known_path: impl Fn(&str) -> bool) -> Self {
        let query = query.trim();

        if !query.is_empty() && is_known_path(query) {
            return Self::ExactPath(query.to_string());
        }

        if HOOK_NAME.is_match(query) {
            return Self::Hook(hook_operation(query));
        }

        if let Some((method, rest)) = split_method(query) {
            return Self::Method {
                method,
                rest: rest.to_string(),
            };
        }

        Self::Free(query.to_string())
    }
}

/// `useGetUser` → `getUser`.
fn hook_operation(hook: &str) -> String {
    let stem = &hook["use".len()..];
    let mut chars = stem.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_lowercase().chain(chars).collect()
    })
}

/// Split a leading method token off a query. Only the methods a generated
/// client exposes are recognized.
fn split_method(query: &str) -> Option<(HttpMethod, &str)> {
    let (head, rest) = query
        .split_once(char::is_whitespace)
        .unwrap_or((query, ""));

    let method = match head.to_ascii_uppercase().as_str() {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "PUT" => HttpMethod::Put,
        "DELETE" => HttpMethod::Delete,
        "PATCH" => HttpMethod::Patch,
        _ => return None,
    };
    Some((method, rest.trim()))
}
