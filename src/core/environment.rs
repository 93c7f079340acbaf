//! Environment construction and secret masking.
//!
//! Sources are merged lowest to highest precedence:
//! 1. Inherited process environment
//! 2. Launcher defaults (CI, SD_* paths)
//! 3. Build-declared variables
//! 4. Secrets
//!
//! Denylisted keys are removed after merging so user commands never see
//! the launcher's own credentials.

use std::collections::BTreeMap;

use glob::Pattern;
use tracing::warn;

use crate::domain::Secret;

/// Keys that are always stripped
pub const DEFAULT_DENYLIST: &[&str] = &["SD_TOKEN"];

/// Merged, read-only environment for a build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Merge all sources and apply the denylist
    pub fn merge<I>(
        inherited: I,
        defaults: &BTreeMap<String, String>,
        declared: &BTreeMap<String, String>,
        secrets: &[Secret],
        denylist: &EnvDenylist,
    ) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut vars = BTreeMap::new();

        for (key, value) in inherited {
            if key.is_empty() {
                warn!("Dropping inherited environment value with an empty key");
                continue;
            }
            vars.insert(key, value);
        }

        for (key, value) in defaults.iter().chain(declared.iter()) {
            vars.insert(key.clone(), value.clone());
        }

        for secret in secrets {
            vars.insert(secret.name.clone(), secret.value.clone());
        }

        vars.retain(|key, _| !denylist.is_denied(key));

        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// `KEY=VALUE` entries sorted by key
    pub fn to_entries(&self) -> Vec<String> {
        self.vars
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }
}

/// Merge sources into sorted `KEY=VALUE` entries using the default denylist
pub fn build_environment<I>(
    inherited: I,
    defaults: &BTreeMap<String, String>,
    declared: &BTreeMap<String, String>,
    secrets: &[Secret],
) -> Vec<String>
where
    I: IntoIterator<Item = (String, String)>,
{
    Environment::merge(
        inherited,
        defaults,
        declared,
        secrets,
        &EnvDenylist::default(),
    )
    .to_entries()
}

/// Key patterns that are never passed to user commands
#[derive(Debug, Clone)]
pub struct EnvDenylist {
    patterns: Vec<Pattern>,
}

impl Default for EnvDenylist {
    fn default() -> Self {
        Self::new(std::iter::empty::<&str>())
    }
}

impl EnvDenylist {
    /// Defaults plus extra glob patterns (e.g. `AWS_*`)
    ///
    /// Invalid patterns are skipped with a warning.
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut patterns: Vec<Pattern> = DEFAULT_DENYLIST
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .collect();

        for raw in extra {
            match Pattern::new(raw.as_ref()) {
                Ok(pattern) => patterns.push(pattern),
                Err(e) => warn!(pattern = raw.as_ref(), error = %e, "Ignoring invalid denylist pattern"),
            }
        }

        Self { patterns }
    }

    pub fn is_denied(&self, key: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(key))
    }
}

/// Masks secret values in output lines
///
/// Output is redacted line by line, so every line of a multi-line value
/// (PEM keys and the like) is masked on its own as well.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    // Longest first, so a secret that contains another is masked whole.
    values: Vec<String>,
}

pub const REDACTED: &str = "***";

/// Shorter lines of a multi-line secret are left alone
pub const MIN_FRAGMENT_LEN: usize = 4;

impl Redactor {
    pub fn new(secrets: &[Secret]) -> Self {
        let mut values = Vec::new();
        for secret in secrets.iter().filter(|s| !s.value.is_empty()) {
            values.push(secret.value.clone());

            if secret.value.contains('\n') {
                values.extend(
                    secret
                        .value
                        .lines()
                        .map(str::trim_end)
                        .filter(|line| line.len() >= MIN_FRAGMENT_LEN)
                        .map(str::to_string),
                );
            }
        }

        values.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        values.dedup();
        Self { values }
    }

    pub fn redact(&self, line: &str) -> String {
        let mut out = line.to_string();
        for value in &self.values {
            if out.contains(value.as_str()) {
                out = out.replace(value.as_str(), REDACTED);
            }
        }
        out
    }
}
