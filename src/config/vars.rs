//! Environment variable substitution for configuration text.
//!
//! Recognised forms:
//! - `$NAME` and `${NAME}` expand to the variable; an unset variable is an error
//! - `${NAME:-fallback}` uses `fallback` when the variable is unset or empty
//! - `${NAME-fallback}` uses `fallback` only when the variable is unset
//! - `$$` is a literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?P<escape>\$\$)
        |
        \$\{
            (?P<braced>[A-Za-z_][A-Za-z0-9_]*)
            (?: (?P<op>:?-) (?P<fallback>[^}]*) )?
        \}
        |
        \$(?P<bare>[A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("interpolation pattern is valid")
});

/// Outcome of substituting variables into a piece of text.
#[derive(Debug)]
pub struct Substitution {
    pub text: String,
    /// One message per reference that could not be resolved.
    pub errors: Vec<String>,
}

impl Substitution {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// What to do when the referenced variable is missing or empty.
enum Fallback<'a> {
    None,
    WhenUnset(&'a str),
    WhenUnsetOrEmpty(&'a str),
}

impl<'a> Fallback<'a> {
    fn from_captures(caps: &Captures<'a>) -> Self {
        let fallback = caps.name("fallback").map(|m| m.as_str()).unwrap_or("");
        match caps.name("op").map(|m| m.as_str()) {
            Some(":-") => Fallback::WhenUnsetOrEmpty(fallback),
            Some(_) => Fallback::WhenUnset(fallback),
            None => Fallback::None,
        }
    }
}

fn resolve(name: &str, fallback: Fallback<'_>) -> Result<String, String> {
    match (env::var(name), fallback) {
        (Ok(value), _) if value.contains(['\n', '\r']) => Err(format!(
            "environment variable '{name}' contains a line break"
        )),
        (Ok(value), Fallback::WhenUnsetOrEmpty(fallback)) if value.is_empty() => {
            Ok(fallback.to_string())
        }
        (Ok(value), _) => Ok(value),
        (Err(_), Fallback::WhenUnset(fallback) | Fallback::WhenUnsetOrEmpty(fallback)) => {
            Ok(fallback.to_string())
        }
        (Err(_), Fallback::None) => Err(format!("environment variable '{name}' is not set")),
    }
}

/// Substitute environment variables into `input`.
///
/// Every unresolved reference is reported, not just the first one, and is
/// left in place in the returned text.
pub fn substitute(input: &str) -> Substitution {
    let mut errors = Vec::new();

    let text = REFERENCE.replace_all(input, |caps: &Captures| {
        if caps.name("escape").is_some() {
            return "$".to_string();
        }

        let Some(name) = caps.name("braced").or_else(|| caps.name("bare")) else {
            return caps[0].to_string();
        };

        match resolve(name.as_str(), Fallback::from_captures(caps)) {
            Ok(value) => value,
            Err(message) => {
                errors.push(message);
                caps[0].to_string()
            }
        }
    });

    Substitution {
        text: text.into_owned(),
        errors,
    }
}
