//! Connection descriptor encoding.
//!
//! The descriptor is the libpq-style `key=value` string handed to the
//! transport on connect. Tokens always appear in the order `host`,
//! `connect_timeout`, `user`, followed by `port`, `password` and `dbname` when
//! the configuration carries them.

use crate::models::ConnectionConfig;

const MASK: &str = "****";

/// Build the descriptor for a configuration.
pub fn build(config: &ConnectionConfig) -> String {
    build_with(config, config.password())
}

/// Build the descriptor with the password masked, for logging.
pub fn build_masked(config: &ConnectionConfig) -> String {
    build_with(config, config.password().map(|_| MASK))
}

fn build_with(config: &ConnectionConfig, password: Option<&str>) -> String {
    let mut tokens = vec![
        token("host", config.host()),
        token("connect_timeout", &config.connect_timeout_secs().to_string()),
        token("user", config.user()),
    ];
    if let Some(port) = config.port() {
        tokens.push(token("port", &port.to_string()));
    }
    if let Some(password) = password {
        tokens.push(token("password", password));
    }
    if let Some(database) = config.database() {
        tokens.push(token("dbname", database));
    }
    tokens.join(" ")
}

fn token(key: &str, value: &str) -> String {
    format!("{}={}", key, quote(value))
}

/// Quote a value when libpq would otherwise split or misread it.
fn quote(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quotes {
        return value.to_string();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

/// Split a descriptor back into `(key, value)` pairs.
pub fn parse(descriptor: &str) -> Result<Vec<(String, String)>, String> {
    let mut pairs = Vec::new();
    let mut chars = descriptor.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
            key.push(c);
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.next() != Some('=') {
            return Err(format!("missing '=' after '{}'", key));
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'\'').is_some() {
            loop {
                match chars.next() {
                    Some('\\') => match chars.next() {
                        Some(c) => value.push(c),
                        None => return Err(format!("unterminated value for '{}'", key)),
                    },
                    Some('\'') => break,
                    Some(c) => value.push(c),
                    None => return Err(format!("unterminated value for '{}'", key)),
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                value.push(c);
            }
        }

        pairs.push((key, value));
    }

    Ok(pairs)
}
