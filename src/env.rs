//! `${VAR}` expansion inside parsed configuration values
//!
//! Expansion runs on the YAML tree rather than the raw text: only string
//! scalars are rewritten, so a value containing `:` or `#` cannot change the
//! document structure, and references inside comments or mapping keys are
//! left alone. `${VAR:-fallback}` supplies a value for unset variables.
//! Expanded values are always strings.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_yaml::Value;

use crate::config::ConfigError;

static REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").unwrap()
});

/// A reference that could not be resolved, with where it appeared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingVar {
    pub name: String,
    pub location: String,
}

/// Expand every reference in the string scalars of `value`
///
/// Fails with one error naming every unset variable and its location
/// (`mounts[1].id`).
pub fn expand_env(value: &mut Value) -> Result<(), ConfigError> {
    expand_with(value, |name| std::env::var(name).ok())
}

/// Expansion against an arbitrary variable source
pub fn expand_with<F>(value: &mut Value, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing = Vec::new();
    walk(value, String::new(), &lookup, &mut missing);
    if missing.is_empty() {
        return Ok(());
    }

    let listed: Vec<String> = missing
        .iter()
        .map(|m| format!("{} (at {})", m.name, m.location))
        .collect();
    Err(ConfigError::ValidationError(format!(
        "Missing environment variables: {}",
        listed.join(", ")
    )))
}

fn walk<F>(value: &mut Value, location: String, lookup: &F, missing: &mut Vec<MissingVar>)
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(s) => {
            if let Some(expanded) = expand_str(s, &location, lookup, missing) {
                *s = expanded;
            }
        }
        Value::Sequence(items) => {
            for (i, item) in items.iter_mut().enumerate() {
                walk(item, format!("{}[{}]", location, i), lookup, missing);
            }
        }
        Value::Mapping(map) => {
            for (key, item) in map.iter_mut() {
                let key = match key {
                    Value::String(k) => k.clone(),
                    other => serde_yaml::to_string(other)
                        .map(|k| k.trim().to_string())
                        .unwrap_or_default(),
                };
                let child = if location.is_empty() {
                    key
                } else {
                    format!("{}.{}", location, key)
                };
                walk(item, child, lookup, missing);
            }
        }
        Value::Tagged(tagged) => walk(&mut tagged.value, location, lookup, missing),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Expanded copy of `s`, or `None` when it holds no references
fn expand_str<F>(
    s: &str,
    location: &str,
    lookup: &F,
    missing: &mut Vec<MissingVar>,
) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if !REFERENCE.is_match(s) {
        return None;
    }
    let expanded = REFERENCE.replace_all(s, |caps: &Captures| {
        let name = &caps[1];
        match (lookup(name), caps.get(2)) {
            (Some(v), _) => v,
            (None, Some(fallback)) => fallback.as_str().to_string(),
            (None, None) => {
                missing.push(MissingVar {
                    name: name.to_string(),
                    location: location.to_string(),
                });
                String::new()
            }
        }
    });
    Some(expanded.into_owned())
}
