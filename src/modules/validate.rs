// Input validators shared by the search modules. Each returns the reason
// string sent back in a `Failed{invalid_input}` event.

use regex::Regex;
use std::sync::OnceLock;

pub const NO_INPUT: &str = "No input provided";

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+$").expect("valid email regex")
    })
}

fn domain_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,63}$")
            .expect("valid domain regex")
    })
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https?://\S+$").expect("valid url regex"))
}

fn non_empty(query: &str) -> Result<&str, String> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        Err(NO_INPUT.to_string())
    } else {
        Ok(trimmed)
    }
}

pub fn email(query: &str) -> Result<(), String> {
    let query = non_empty(query)?;
    if email_re().is_match(query) {
        Ok(())
    } else {
        Err("Invalid email format".to_string())
    }
}

pub fn domain(query: &str) -> Result<(), String> {
    let query = non_empty(query)?;
    if query.len() <= 253 && domain_re().is_match(query) {
        Ok(())
    } else {
        Err("Invalid domain format".to_string())
    }
}

pub fn username(query: &str) -> Result<(), String> {
    if query.is_empty() {
        return Err(NO_INPUT.to_string());
    }
    if query.trim().is_empty() {
        return Err("Username is required".to_string());
    }
    Ok(())
}

/// Account handle with the platform's sigil (`@`, `u/`) stripped. A query
/// that is only the sigil is rejected like a blank username.
pub fn handle<'a>(query: &'a str, sigil: &str) -> Result<&'a str, String> {
    username(query)?;
    let handle = query.trim().trim_start_matches(sigil).trim();
    if handle.is_empty() {
        Err("Username is required".to_string())
    } else {
        Ok(handle)
    }
}

pub fn url(query: &str) -> Result<(), String> {
    let query = non_empty(query)?;
    if url_re().is_match(query) {
        Ok(())
    } else {
        Err("Invalid URL format".to_string())
    }
}

/// Discord-style snowflake id: 17 to 20 decimal digits that fit in a u64
pub fn snowflake(query: &str) -> Result<(), String> {
    let query = non_empty(query)?;
    let digits_ok = (17..=20).contains(&query.len()) && query.bytes().all(|b| b.is_ascii_digit());
    if digits_ok && query.parse::<u64>().is_ok() {
        Ok(())
    } else {
        Err("Invalid user ID format".to_string())
    }
}
