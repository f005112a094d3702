//! `${VAR}` environment substitution over config documents.

use regex::Regex;
use serde_yaml::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

use storagekit_common::{Error, Result};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Z0-9_]+)\}").expect("placeholder pattern is valid"));

/// Source of environment variables for substitution.
pub trait EnvSource {
    /// Look up a variable, `None` if undefined.
    fn var(&self, name: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl<E: EnvSource + ?Sized> EnvSource for &E {
    fn var(&self, name: &str) -> Option<String> {
        (**self).var(name)
    }
}

/// Replace every `${NAME}` in `text` with its value from `env`.
///
/// # Errors
/// - `Error::Config` naming the first undefined variable
pub fn substitute_str(text: &str, env: &dyn EnvSource) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = env.var(name.as_str()).ok_or_else(|| {
            Error::Config(format!(
                "Missing environment variable for substitution: {}",
                name.as_str()
            ))
        })?;
        out.push_str(&text[last..whole.start()]);
        out.push_str(&value);
        last = whole.end();
    }

    out.push_str(&text[last..]);
    Ok(out)
}

/// Recursively substitute placeholders in every string value of a document.
///
/// Mapping keys are left untouched.
pub fn substitute_value(value: Value, env: &dyn EnvSource) -> Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(substitute_str(&s, env)?)),
        Value::Sequence(items) => items
            .into_iter()
            .map(|item| substitute_value(item, env))
            .collect::<Result<Vec<_>>>()
            .map(Value::Sequence),
        Value::Mapping(map) => {
            let mut out = serde_yaml::Mapping::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key, substitute_value(item, env)?);
            }
            Ok(Value::Mapping(out))
        }
        Value::Tagged(mut tagged) => {
            tagged.value = substitute_value(tagged.value, env)?;
            Ok(Value::Tagged(tagged))
        }
        other => Ok(other),
    }
}
