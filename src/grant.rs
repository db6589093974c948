//! Fine-grained flag maps and grant records

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::legacy::{compute_legacy_flags, LegacyFlags};
use crate::registry::{self, Scope};

/// Capability key -> granted. Absent keys read as false, so equality only
/// looks at granted keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FineGrained(BTreeMap<String, bool>);

impl FineGrained {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the keys that should be granted
    pub fn granted<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(|k| (k.into(), true)).collect())
    }

    #[inline]
    pub fn get(&self, key: &str) -> bool {
        self.0.get(key).copied().unwrap_or(false)
    }

    pub fn set(&mut self, key: impl Into<String>, value: bool) {
        self.0.insert(key.into(), value);
    }

    /// True if any of the keys is granted
    pub fn any(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| self.get(k))
    }

    /// Granted keys, sorted
    pub fn granted_keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter(|(_, v)| **v).map(|(k, _)| k.as_str())
    }

    /// Drop every key not registered for the scope
    pub fn retain_scope(&mut self, scope: Scope) {
        self.0.retain(|k, _| registry::is_known(scope, k));
    }

    /// Every registered key of the scope with its value, absent keys as false
    pub fn columns(&self, scope: Scope) -> Vec<(&'static str, bool)> {
        registry::keys(scope).map(|c| (c.key, self.get(c.key))).collect()
    }

    /// Same grants, ignoring explicit `false` entries
    pub fn same_grants(&self, other: &FineGrained) -> bool {
        self.granted_keys().eq(other.granted_keys())
    }
}

impl PartialEq for FineGrained {
    fn eq(&self, other: &Self) -> bool {
        self.same_grants(other)
    }
}

impl Eq for FineGrained {}

impl FromIterator<(String, bool)> for FineGrained {
    fn from_iter<T: IntoIterator<Item = (String, bool)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A user's grants within one scope instance.
///
/// `legacy` is derived from `fine_grained` by every constructor and is not
/// independently settable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantRecord {
    scope: Scope,
    scope_id: String,
    user_id: String,
    fine_grained: FineGrained,
    legacy: LegacyFlags,
}

impl GrantRecord {
    /// Fresh record with nothing granted
    pub fn new(scope: Scope, scope_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::with_flags(scope, scope_id, user_id, FineGrained::new())
    }

    pub fn with_flags(
        scope: Scope,
        scope_id: impl Into<String>,
        user_id: impl Into<String>,
        fine_grained: FineGrained,
    ) -> Self {
        let legacy = compute_legacy_flags(scope, &fine_grained);
        Self { scope, scope_id: scope_id.into(), user_id: user_id.into(), fine_grained, legacy }
    }

    pub fn scope(&self) -> Scope { self.scope }
    pub fn scope_id(&self) -> &str { &self.scope_id }
    pub fn user_id(&self) -> &str { &self.user_id }
    pub fn fine_grained(&self) -> &FineGrained { &self.fine_grained }
    pub fn legacy(&self) -> &LegacyFlags { &self.legacy }

    /// Replace the fine-grained flags, recomputing legacy flags from scratch
    pub fn replace_flags(&mut self, fine_grained: FineGrained) {
        self.legacy = compute_legacy_flags(self.scope, &fine_grained);
        self.fine_grained = fine_grained;
    }
}

/// A user listed as holding grants in a scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeUser {
    pub user_id: String,
    pub display_name: String,
}
