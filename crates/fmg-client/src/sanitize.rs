//! Redaction of credentials and session material before anything is logged
//! or handed back to a caller.

use serde_json::{Map, Value};

pub const REDACTED: &str = "***REDACTED***";

const MAX_DEPTH: usize = 10;

/// Hex runs at least this long are treated as tokens.
const MIN_TOKEN_LEN: usize = 20;

const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "passwd",
    "pass",
    "adm_pass",
    "adm_passwd",
    "api_token",
    "apikey",
    "api_key",
    "token",
    "session",
    "sid",
    "authorization",
    "auth",
    "secret",
    "credential",
    "credentials",
    "private_key",
    "psksecret",
];

fn normalize_key(key: &str) -> String {
    key.to_ascii_lowercase().replace(['-', ' '], "_")
}

/// True when values under `key` must never be shown.
pub fn is_sensitive_key(key: &str) -> bool {
    let key = normalize_key(key);
    SENSITIVE_KEYS.iter().any(|s| {
        key == *s
            || key.ends_with(&format!("_{}", s))
            || key.starts_with(&format!("{}_", s))
            || (s.len() > 4 && key.contains(s))
    })
}

fn looks_like_token(s: &str) -> bool {
    s.len() >= MIN_TOKEN_LEN && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Return a copy of `value` with sensitive fields masked.
pub fn redact(value: &Value) -> Value {
    redact_at(value, 0)
}

fn redact_at(value: &Value, depth: usize) -> Value {
    if depth >= MAX_DEPTH {
        return Value::String("<max depth>".to_string());
    }
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, v) in map {
                let masked = if is_sensitive_key(key) && !v.is_null() {
                    Value::String(REDACTED.to_string())
                } else {
                    redact_at(v, depth + 1)
                };
                out.insert(key.clone(), masked);
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| redact_at(v, depth + 1)).collect())
        }
        Value::String(s) if looks_like_token(s) => Value::String(REDACTED.to_string()),
        other => other.clone(),
    }
}

/// Mask secrets in free text such as error messages.
///
/// Values of `key=value` pairs with a sensitive key are masked, including
/// pairs inside query strings, as are token-like hex words.
pub fn scrub_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(|c: char| !c.is_whitespace()) {
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        scrub_word(&mut out, &rest[..end]);
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}

fn scrub_word(out: &mut String, word: &str) {
    for (i, pair) in word.split('&').enumerate() {
        if i > 0 {
            out.push('&');
        }
        match pair.split_once('=') {
            Some((key, _)) if is_sensitive_key(pair_key(key)) => {
                out.push_str(key);
                out.push('=');
                out.push_str(REDACTED);
            }
            _ => mask_tokens(out, pair),
        }
    }
}

/// The key part of `key`, dropping any URL or punctuation prefix
fn pair_key(key: &str) -> &str {
    let key = key.rsplit(['?', ';', ',', '(', '[', '{', '"', '\'']).next().unwrap_or(key);
    key.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '_' && c != '-')
}

fn mask_tokens(out: &mut String, text: &str) {
    let mut word = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            word.push(c);
            continue;
        }
        flush_word(out, &mut word);
        out.push(c);
    }
    flush_word(out, &mut word);
}
