//! Permission edit session for one (scope, scope id, user)
//!
//! The session reads the stored record when opened, collects checkbox edits
//! in a draft, and writes the draft back on save. A failed save leaves the
//! persisted snapshot and the draft exactly as they were.

use tracing::{info, warn};

use crate::error::{Result, StatecapError};
use crate::grant::{FineGrained, GrantRecord};
use crate::legacy::{compute_legacy_flags, LegacyFlags};
use crate::registry::{self, KeyGroup, Scope};
use crate::store::GrantStore;

pub struct GrantEditor<S: GrantStore> {
    store: S,
    scope: Scope,
    scope_id: String,
    user_id: String,
    persisted: Option<GrantRecord>,
    draft: FineGrained,
}

impl<S: GrantStore> GrantEditor<S> {
    /// Load the current record; a user with no record starts with nothing granted
    pub fn open(store: S, scope: Scope, scope_id: &str, user_id: &str) -> Result<Self> {
        let persisted = store.get_grant(scope, scope_id, user_id)?;
        let draft = persisted.as_ref().map(|r| r.fine_grained().clone()).unwrap_or_default();
        Ok(Self { store, scope, scope_id: scope_id.to_string(), user_id: user_id.to_string(), persisted, draft })
    }

    pub fn scope(&self) -> Scope { self.scope }
    pub fn scope_id(&self) -> &str { &self.scope_id }
    pub fn user_id(&self) -> &str { &self.user_id }

    /// Checkbox groups for this scope
    pub fn groups(&self) -> &'static [KeyGroup] {
        registry::groups(self.scope)
    }

    pub fn is_checked(&self, key: &str) -> bool {
        self.draft.get(key)
    }

    fn known(&self, key: &str) -> Result<()> {
        if registry::is_known(self.scope, key) {
            Ok(())
        } else {
            Err(StatecapError::UnknownCapability { scope: self.scope, key: key.to_string() })
        }
    }

    pub fn set(&mut self, key: &str, value: bool) -> Result<()> {
        self.known(key)?;
        self.draft.set(key, value);
        Ok(())
    }

    /// Flip one flag, returning its new value
    pub fn toggle(&mut self, key: &str) -> Result<bool> {
        let v = !self.is_checked(key);
        self.set(key, v)?;
        Ok(v)
    }

    /// Set every key of a group at once
    pub fn set_group(&mut self, title: &str, value: bool) -> Result<()> {
        let group = self
            .groups()
            .iter()
            .find(|g| g.title == title)
            .ok_or_else(|| StatecapError::UnknownCapability { scope: self.scope, key: title.to_string() })?;
        for k in group.keys {
            self.draft.set(*k, value);
        }
        Ok(())
    }

    pub fn draft(&self) -> &FineGrained {
        &self.draft
    }

    /// Legacy flags the draft would save with
    pub fn preview_legacy(&self) -> LegacyFlags {
        compute_legacy_flags(self.scope, &self.draft)
    }

    pub fn persisted(&self) -> Option<&GrantRecord> {
        self.persisted.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        match &self.persisted {
            Some(r) => !r.fine_grained().same_grants(&self.draft),
            None => self.draft.granted_keys().next().is_some(),
        }
    }

    /// Write the draft; legacy flags are recomputed from it by the store
    pub fn save(&mut self) -> Result<&GrantRecord> {
        let r = self
            .store
            .put_grant(self.scope, &self.scope_id, &self.user_id, &self.draft)
            .inspect_err(|e| warn!(scope = %self.scope, scope_id = %self.scope_id, user_id = %self.user_id, error = %e, "grant save failed"))?;
        info!(scope = %self.scope, scope_id = %self.scope_id, user_id = %self.user_id, granted = r.fine_grained().granted_keys().count(), "grant saved");
        self.draft = r.fine_grained().clone();
        Ok(&*self.persisted.insert(r))
    }

    /// Drop unsaved edits
    pub fn revert(&mut self) {
        self.draft = self.persisted.as_ref().map(|r| r.fine_grained().clone()).unwrap_or_default();
    }

    /// Remove the whole record
    pub fn delete(&mut self) -> Result<bool> {
        let removed = self.store.delete_grant(self.scope, &self.scope_id, &self.user_id)?;
        info!(scope = %self.scope, scope_id = %self.scope_id, user_id = %self.user_id, removed, "grant deleted");
        self.persisted = None;
        self.draft = FineGrained::new();
        Ok(removed)
    }
}
