// SPDX-License-Identifier: MIT OR Apache-2.0
//! Snapshot of the `DEPHEALTH_*` environment variables.
//!
//! The builder never calls `std::env` directly; it consults an
//! [`Environment`] captured once, which keeps overlays reproducible in tests.

use std::collections::BTreeMap;

/// Variable holding the application name when none is given in code.
pub const NAME_VAR: &str = "DEPHEALTH_NAME";

const VAR_PREFIX: &str = "DEPHEALTH_";

/// Variable prefix for a dependency: `DEPHEALTH_<DEP>`, where `<DEP>` is the
/// dependency name uppercased with `-` replaced by `_`.
pub fn dependency_prefix(dependency: &str) -> String {
    format!(
        "{VAR_PREFIX}{}",
        dependency.to_ascii_uppercase().replace('-', "_")
    )
}

/// Immutable view over the variables relevant to dephealth.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Capture every `DEPHEALTH_*` variable of the current process.
    ///
    /// Variables whose name or value is not valid Unicode are skipped.
    pub fn from_process() -> Self {
        Self::from_pairs(std::env::vars_os().filter_map(|(k, v)| {
            let key = k.into_string().ok()?;
            if !key.starts_with(VAR_PREFIX) {
                return None;
            }
            Some((key, v.into_string().ok()?))
        }))
    }

    /// Build a snapshot from explicit pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// An environment with no variables set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Raw lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// `DEPHEALTH_NAME`, if set and non-empty.
    pub fn app_name(&self) -> Option<&str> {
        self.get(NAME_VAR).filter(|v| !v.is_empty())
    }

    /// `DEPHEALTH_<DEP>_CRITICAL` interpreted as `yes`/`no` (case-insensitive).
    ///
    /// Any other value is ignored.
    pub fn critical_for(&self, dependency: &str) -> Option<bool> {
        let raw = self.get(&format!("{}_CRITICAL", dependency_prefix(dependency)))?;
        if raw.eq_ignore_ascii_case("yes") {
            Some(true)
        } else if raw.eq_ignore_ascii_case("no") {
            Some(false)
        } else {
            None
        }
    }

    /// Labels declared through `DEPHEALTH_<DEP>_LABEL_<KEY>`, keyed by the
    /// lowercased `<KEY>`. Names are not validated here.
    pub fn labels_for(&self, dependency: &str) -> BTreeMap<String, String> {
        let prefix = format!("{}_LABEL_", dependency_prefix(dependency));
        self.vars
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, v)| {
                let key = k[prefix.len()..].to_ascii_lowercase();
                (!key.is_empty()).then(|| (key, v.clone()))
            })
            .collect()
    }

    /// Number of captured variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no variables were captured.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
