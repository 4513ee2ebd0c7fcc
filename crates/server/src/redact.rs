//! PII redaction for log output.
//!
//! Customer emails, phones, addresses and payment details must not reach
//! logs or Sentry verbatim. Everything logged about a customer or a payment
//! notification goes through one of these helpers first.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

const MASK: &str = "[REDACTED]";

/// Key fragments whose values are masked by [`redact_json`].
const SENSITIVE_KEYS: &[&str] = &[
    "email", "phone", "name", "address", "dni", "document", "card", "token", "password",
];

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("Invalid regex")
});

static CARD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d[ -]?){12,18}\d\b").expect("Invalid regex"));

/// International numbers (`+54 11 5555-1234`) or local groupings
/// (`(011) 4444-5555`, `11 5555-1234`). Dates, times and bare IDs don't match.
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+\d[\d\s().-]{6,}\d|\(?\b\d{2,4}\)?[\s-]\d{3,4}[\s-]\d{4}\b")
        .expect("Invalid regex")
});

/// Mask an email, keeping the first character and the domain.
///
/// ```
/// use vitrina_server::redact::redact_email;
///
/// assert_eq!(redact_email("juan@example.com"), "j***@example.com");
/// ```
#[must_use]
pub fn redact_email(email: &str) -> String {
    match email.trim().split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {
            let first: String = local.chars().take(1).collect();
            format!("{first}***@{domain}")
        }
        _ => "***".to_owned(),
    }
}

/// Mask a phone number, keeping only its last four digits.
#[must_use]
pub fn redact_phone(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() <= 4 {
        return "***".to_owned();
    }
    let tail: String = digits
        .get(digits.len().saturating_sub(4)..)
        .unwrap_or_default()
        .iter()
        .collect();
    format!("***{tail}")
}

/// Mask emails, card-like digit runs and phone-like digit runs in free text.
#[must_use]
pub fn redact_text(text: &str) -> String {
    let text = EMAIL_RE.replace_all(text, |caps: &regex::Captures<'_>| redact_email(&caps[0]));
    let text = CARD_RE.replace_all(&text, "[CARD]");
    let text = PHONE_RE.replace_all(&text, |caps: &regex::Captures<'_>| redact_phone(&caps[0]));
    text.into_owned()
}

/// Recursively mask sensitive fields of a JSON document.
///
/// Keys are matched case-insensitively on the fragments in
/// [`SENSITIVE_KEYS`]; other string values still go through [`redact_text`].
#[must_use]
pub fn redact_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| (key.clone(), redact_field(key, v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_json).collect()),
        Value::String(s) => Value::String(redact_text(s)),
        other => other.clone(),
    }
}

fn redact_field(key: &str, value: &Value) -> Value {
    let key = key.to_ascii_lowercase();
    if !SENSITIVE_KEYS.iter().any(|k| key.contains(k)) {
        return redact_json(value);
    }
    match value {
        Value::Null => Value::Null,
        Value::String(s) if key.contains("email") => Value::String(redact_email(s)),
        Value::String(s) if key.contains("phone") => Value::String(redact_phone(s)),
        _ => Value::String(MASK.to_owned()),
    }
}
