//! Grant edit sessions: read before edit, write after edit

use std::cell::Cell;

use statecap::*;
use tempfile::TempDir;

fn setup() -> (TempDir, LmdbStore) {
    let dir = TempDir::new().unwrap();
    let store = LmdbStore::open(&StoreConfig::new(dir.path())).unwrap();
    (dir, store)
}

#[test]
fn new_user_starts_empty() {
    let (_d, db) = setup();
    let ed = GrantEditor::open(&db, Scope::State, "S1", "u1").unwrap();
    assert!(ed.persisted().is_none());
    assert!(!ed.is_dirty());
    assert_eq!(ed.preview_legacy(), LegacyFlags::empty(Scope::State));
    assert_eq!(ed.groups().len(), 6);
}

#[test]
fn toggle_and_save() {
    let (_d, db) = setup();
    let mut ed = GrantEditor::open(&db, Scope::State, "S1", "u1").unwrap();
    assert!(ed.toggle("state_alerts_pin").unwrap());
    ed.set("state_view", true).unwrap();
    assert!(ed.is_dirty());
    assert_eq!(ed.preview_legacy().flag("can_manage_state_alerts"), Some(true));

    let saved = ed.save().unwrap().clone();
    assert_eq!(saved.legacy().flag("can_view"), Some(true));
    assert!(!ed.is_dirty());

    let reread = GrantEditor::open(&db, Scope::State, "S1", "u1").unwrap();
    assert!(reread.is_checked("state_alerts_pin"));
    assert_eq!(reread.persisted(), Some(&saved));
}

#[test]
fn unknown_key_rejected() {
    let (_d, db) = setup();
    let mut ed = GrantEditor::open(&db, Scope::Alliance, "7", "u1").unwrap();
    let e = ed.set("state_view", true).unwrap_err();
    assert_eq!(e, StatecapError::UnknownCapability { scope: Scope::Alliance, key: "state_view".into() });
    assert!(ed.toggle("alliance_bogus").is_err());
    assert!(ed.set_group("Mail", true).is_err());
    assert!(!ed.is_dirty());
}

#[test]
fn set_group_and_revert() {
    let (_d, db) = setup();
    let mut ed = GrantEditor::open(&db, Scope::Alliance, "7", "u1").unwrap();
    ed.set_group("Alerts", true).unwrap();
    assert_eq!(ed.draft().granted_keys().count(), 6);
    ed.revert();
    assert_eq!(ed.draft().granted_keys().count(), 0);
    assert!(!ed.is_dirty());
}

#[test]
fn delete_removes_record() {
    let (_d, db) = setup();
    let mut ed = GrantEditor::open(&db, Scope::State, "S1", "u1").unwrap();
    ed.set("state_view", true).unwrap();
    ed.save().unwrap();
    assert!(ed.delete().unwrap());
    assert!(ed.persisted().is_none());
    assert!(db.get_grant(Scope::State, "S1", "u1").unwrap().is_none());
}

/// Grant store that can be switched offline for writes
struct FlakyStore<'a> {
    inner: &'a LmdbStore,
    offline: Cell<bool>,
}

impl GrantStore for FlakyStore<'_> {
    fn get_grant(&self, scope: Scope, scope_id: &str, user_id: &str) -> Result<Option<GrantRecord>> {
        self.inner.get_grant(scope, scope_id, user_id)
    }
    fn put_grant(&self, scope: Scope, scope_id: &str, user_id: &str, f: &FineGrained) -> Result<GrantRecord> {
        if self.offline.get() {
            return Err(StatecapError::StoreUnavailable("network down".into()));
        }
        self.inner.put_grant(scope, scope_id, user_id, f)
    }
    fn delete_grant(&self, scope: Scope, scope_id: &str, user_id: &str) -> Result<bool> {
        if self.offline.get() {
            return Err(StatecapError::StoreUnavailable("network down".into()));
        }
        self.inner.delete_grant(scope, scope_id, user_id)
    }
    fn list_users_in_scope(&self, scope: Scope, scope_id: &str) -> Result<Vec<ScopeUser>> {
        self.inner.list_users_in_scope(scope, scope_id)
    }
}

#[test]
fn failed_save_keeps_snapshot_and_draft() {
    let (_d, db) = setup();
    let flaky = FlakyStore { inner: &db, offline: Cell::new(false) };
    let mut ed = GrantEditor::open(&flaky, Scope::State, "S1", "u1").unwrap();
    ed.set("state_view", true).unwrap();
    let before = ed.save().unwrap().clone();

    ed.set("state_mail_moderate", true).unwrap();
    flaky.offline.set(true);
    let e = ed.save().unwrap_err();
    assert_eq!(e, StatecapError::StoreUnavailable("network down".into()));
    assert_eq!(ed.persisted(), Some(&before));
    assert!(ed.is_checked("state_mail_moderate"));
    assert!(ed.is_dirty());
    assert!(ed.delete().is_err());
    assert_eq!(ed.persisted(), Some(&before));

    flaky.offline.set(false);
    let after = ed.save().unwrap();
    assert_eq!(after.legacy().flag("can_manage_mail"), Some(true));
    assert!(db.get_grant(Scope::State, "S1", "u1").unwrap().unwrap().fine_grained().get("state_mail_moderate"));
}
