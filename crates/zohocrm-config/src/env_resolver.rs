//! `${VAR}` / `${VAR:default}` substitution inside configuration files

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::env;
use thiserror::Error;

static VAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}:]+)(?::([^}]*))?\}").expect("valid variable pattern"));

#[derive(Debug, Error)]
pub enum EnvResolverError {
    #[error("Environment variable '{0}' not found and no default provided")]
    VarNotFound(String),
    #[error("Environment variable '{0}' is not in whitelist. Allowed prefixes: {1:?}")]
    VarNotWhitelisted(String, Vec<String>),
    #[error("Recursive variable reference detected in '{0}'")]
    RecursiveReference(String),
}

/// Resolves variable references in string values of a JSON tree.
///
/// Resolved values stay strings; numeric settings are written literally in
/// the file or overridden through their dedicated environment variables.
#[derive(Debug, Clone)]
pub struct EnvResolver {
    /// Empty means every variable may be referenced
    allowed_prefixes: Vec<String>,
    max_depth: usize,
}

impl Default for EnvResolver {
    fn default() -> Self {
        Self {
            allowed_prefixes: vec![
                "NANGO_".to_string(),
                "ZOHO_".to_string(),
                "RUST_".to_string(),
            ],
            max_depth: 10,
        }
    }
}

impl EnvResolver {
    pub fn new(allowed_prefixes: Vec<String>) -> Self {
        Self {
            allowed_prefixes,
            max_depth: 10,
        }
    }

    pub fn unrestricted() -> Self {
        Self {
            allowed_prefixes: vec![],
            max_depth: 10,
        }
    }

    pub fn resolve(&self, value: &JsonValue) -> Result<JsonValue, EnvResolverError> {
        self.resolve_with(value, &|name| env::var(name).ok())
    }

    /// Resolve using an explicit lookup instead of the process environment
    pub fn resolve_with(
        &self,
        value: &JsonValue,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<JsonValue, EnvResolverError> {
        match value {
            JsonValue::String(s) => self
                .resolve_string(s, lookup, 0, &mut HashSet::new())
                .map(JsonValue::String),
            JsonValue::Object(obj) => {
                let mut resolved = serde_json::Map::new();
                for (key, val) in obj {
                    resolved.insert(key.clone(), self.resolve_with(val, lookup)?);
                }
                Ok(JsonValue::Object(resolved))
            }
            JsonValue::Array(arr) => arr
                .iter()
                .map(|item| self.resolve_with(item, lookup))
                .collect::<Result<Vec<_>, _>>()
                .map(JsonValue::Array),
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(
        &self,
        input: &str,
        lookup: &dyn Fn(&str) -> Option<String>,
        depth: usize,
        visited: &mut HashSet<String>,
    ) -> Result<String, EnvResolverError> {
        if !input.contains("${") {
            return Ok(input.to_string());
        }
        if depth > self.max_depth || !visited.insert(input.to_string()) {
            return Err(EnvResolverError::RecursiveReference(input.to_string()));
        }

        let mut result = String::with_capacity(input.len());
        let mut last = 0;
        for caps in VAR_RE.captures_iter(input) {
            let whole = caps.get(0).expect("capture group 0 always present");
            let var_name = &caps[1];
            self.validate_var_name(var_name)?;

            let value = match lookup(var_name) {
                Some(value) => value,
                None => match caps.get(2) {
                    Some(default) => default.as_str().to_string(),
                    None => return Err(EnvResolverError::VarNotFound(var_name.to_string())),
                },
            };

            result.push_str(&input[last..whole.start()]);
            // A value may itself reference other variables
            result.push_str(&self.resolve_string(&value, lookup, depth + 1, visited)?);
            last = whole.end();
        }
        result.push_str(&input[last..]);

        visited.remove(input);
        Ok(result)
    }

    fn validate_var_name(&self, var_name: &str) -> Result<(), EnvResolverError> {
        if self.allowed_prefixes.is_empty()
            || self
                .allowed_prefixes
                .iter()
                .any(|prefix| var_name.starts_with(prefix))
        {
            return Ok(());
        }

        Err(EnvResolverError::VarNotWhitelisted(
            var_name.to_string(),
            self.allowed_prefixes.clone(),
        ))
    }
}
