//! Mention store persistence, import and export

use std::cell::Cell;

use chrono::{TimeZone, Utc};
use statecap::store::{CHANNEL_DOCUMENT_KEY, ROLE_DOCUMENT_KEY};
use statecap::*;
use tempfile::TempDir;

fn setup() -> (TempDir, LmdbStore) {
    let dir = TempDir::new().unwrap();
    let store = LmdbStore::open(&StoreConfig::new(dir.path())).unwrap();
    (dir, store)
}

fn sample() -> MentionStore {
    let mut s = MentionStore::new();
    s.set_global(
        MentionBucket::default()
            .with_role("Leadership", "<@&999>")
            .with_channel("announcements", "555"),
    );
    s.set_alliance("WOC", MentionBucket::default().with_role("R4", "<@&44>").with_channel("announcements", "123"));
    s.set_alliance("ABC", MentionBucket::default().with_channel("war", "9"));
    s
}

#[test]
fn empty_store_reads_empty() {
    let (_d, db) = setup();
    let m = KvMentionStore::new(&db);
    assert_eq!(m.get_mention_store().unwrap(), MentionStore::new());
}

#[test]
fn put_global_replaces_bucket() {
    let (_d, db) = setup();
    let m = KvMentionStore::new(&db);
    m.put_global_mentions(MentionBucket::default().with_role("R5", "<@&5>").with_channel("a", "1")).unwrap();
    m.put_global_mentions(MentionBucket::default().with_channel("b", "2")).unwrap();
    let s = m.get_mention_store().unwrap();
    assert!(s.global.roles.is_empty());
    assert_eq!(s.global.channels, vec![ChannelEntry::new("b", "2")]);
}

#[test]
fn put_alliance_replaces_only_that_alliance() {
    let (_d, db) = setup();
    let m = KvMentionStore::new(&db);
    m.put_global_mentions(MentionBucket::default().with_role("Leadership", "<@&999>")).unwrap();
    m.put_alliance_mentions("WOC", MentionBucket::default().with_role("R4", "<@&1>")).unwrap();
    m.put_alliance_mentions("ABC", MentionBucket::default().with_role("R4", "<@&2>")).unwrap();
    m.put_alliance_mentions("WOC", MentionBucket::default().with_channel("ops", "3")).unwrap();

    let s = m.get_mention_store().unwrap();
    assert_eq!(s.global.roles["Leadership"], "<@&999>");
    let woc = s.alliance("WOC").unwrap();
    assert!(woc.roles.is_empty());
    assert_eq!(woc.channels.len(), 1);
    assert_eq!(s.alliance("ABC").unwrap().roles["R4"], "<@&2>");

    m.put_alliance_mentions("WOC", MentionBucket::default()).unwrap();
    assert!(m.get_mention_store().unwrap().alliance("WOC").is_none());
}

#[test]
fn invalid_bucket_rejected_before_write() {
    let (_d, db) = setup();
    let m = KvMentionStore::new(&db);
    m.put_global_mentions(MentionBucket::default().with_channel("a", "1")).unwrap();
    let bad = MentionBucket::default().with_channel("x", "1").with_channel("x", "2");
    assert!(matches!(m.put_global_mentions(bad), Err(StatecapError::MalformedImport(_))));
    assert!(m.put_alliance_mentions(" ", MentionBucket::default().with_channel("x", "1")).is_err());
    let shadowed = MentionBucket::default().with_channel("#ops", "1").with_channel("ops", "2");
    assert!(matches!(m.put_alliance_mentions("WOC", shadowed), Err(StatecapError::MalformedImport(_))));
    assert_eq!(m.get_mention_store().unwrap().global.channels[0].name, "a");
}

#[test]
fn stored_documents_have_wire_shape() {
    let (_d, db) = setup();
    let m = KvMentionStore::new(&db);
    m.import_mention_store(&export_mention_store(&sample()).unwrap()).unwrap();

    let roles: serde_json::Value = serde_json::from_str(&db.get(ROLE_DOCUMENT_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(roles["version"], 1);
    assert_eq!(roles["global"]["Leadership"], "<@&999>");
    assert_eq!(roles["alliances"]["WOC"]["R4"], "<@&44>");
    assert!(roles["alliances"].get("ABC").is_none());

    let chans: serde_json::Value = serde_json::from_str(&db.get(CHANNEL_DOCUMENT_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(chans["global"][0]["name"], "announcements");
    assert_eq!(chans["alliances"]["ABC"][0]["id"], "9");
}

#[test]
fn export_import_round_trip() {
    let s = sample();
    let json = export_mention_store(&s).unwrap();
    assert_eq!(import_mention_store(&json).unwrap(), s);

    let (_d, db) = setup();
    let m = KvMentionStore::new(&db);
    m.import_mention_store(&json).unwrap();
    assert_eq!(m.get_mention_store().unwrap(), s);
    assert_eq!(import_mention_store(&m.export_mention_store().unwrap()).unwrap(), s);
}

#[test]
fn export_document_shape() {
    let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let json = export_mention_store_at(&sample(), at).unwrap();
    let v: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(v["version"], 1);
    assert_eq!(v["exportedAt"], "2026-03-01T12:00:00.000Z");
    assert!(v["roles"]["global"].is_object());
    assert!(v["channels"]["global"].is_array());
}

#[test]
fn wrong_version_rejected_and_store_unchanged() {
    let (_d, db) = setup();
    let m = KvMentionStore::new(&db);
    m.import_mention_store(&export_mention_store(&sample()).unwrap()).unwrap();

    let doc = r#"{"version":2,"roles":{"global":{"R5":"<@&5>"}},"channels":{"global":[]}}"#;
    assert!(matches!(m.import_mention_store(doc), Err(StatecapError::MalformedImport(_))));
    assert_eq!(m.get_mention_store().unwrap(), sample());
}

#[test]
fn shape_errors_rejected() {
    let bad = [
        r#"{"roles":{}}"#,
        r#"{"version":1,"channels":{"global":{"a":"1"}}}"#,
        r#"{"version":1,"roles":{"global":["x"]}}"#,
        r#"{"version":1,"roles":{"global":{"R5":5}}}"#,
        r#"{"version":1,"channels":{"global":[{"name":"a","id":"1"},{"name":"a","id":"2"}]}}"#,
        r#"{"version":1,"channels":{"alliances":{"WOC":[{"name":"","id":"1"}]}}}"#,
        r##"{"version":1,"channels":{"global":[{"name":"#ops","id":"1"},{"name":"ops","id":"2"}]}}"##,
        r#"{"version":1,"channels":{"global":[{"name":" ops ","id":"1"},{"name":"ops","id":"2"}]}}"#,
        r##"{"version":1,"channels":{"alliances":{"WOC":[{"name":"#","id":"1"}]}}}"##,
        "not json",
    ];
    for doc in bad {
        assert!(matches!(import_mention_store(doc), Err(StatecapError::MalformedImport(_))), "{}", doc);
    }
}

#[test]
fn unknown_fields_ignored() {
    let doc = r#"{"version":1,"exportedAt":"x","app":"dash","roles":{"global":{"R5":"<@&5>"},"note":1},
                 "channels":{"global":[{"name":"a","id":"1","color":"red"}]}}"#;
    let s = import_mention_store(doc).unwrap();
    assert_eq!(s.global.roles["R5"], "<@&5>");
    assert_eq!(s.global.channels, vec![ChannelEntry::new("a", "1")]);
}

#[test]
fn concurrent_bucket_saves_all_survive() {
    let (_d, db) = setup();
    let m = KvMentionStore::new(&db);
    std::thread::scope(|t| {
        for prefix in ["A", "B", "C"] {
            let m = &m;
            t.spawn(move || {
                for i in 0..20 {
                    let b = MentionBucket::default().with_channel("ops", i.to_string());
                    m.put_alliance_mentions(&format!("{}{}", prefix, i), b).unwrap();
                }
            });
        }
        t.spawn(|| {
            for i in 0..20 {
                m.put_global_mentions(MentionBucket::default().with_role("R5", format!("<@&{}>", i))).unwrap();
            }
        });
    });
    let s = m.get_mention_store().unwrap();
    assert_eq!(s.alliances().count(), 60);
    assert_eq!(s.global.roles["R5"], "<@&19>");
}

/// Key-value store whose writes always fail
struct ReadOnlyKv {
    reads: Cell<usize>,
}

impl KvStore for ReadOnlyKv {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        self.reads.set(self.reads.get() + 1);
        Ok(None)
    }
    fn put(&self, _key: &str, _value: &str) -> Result<()> {
        Err(StatecapError::StoreUnavailable("offline".into()))
    }
}

#[test]
fn write_failure_surfaces() {
    let m = KvMentionStore::new(ReadOnlyKv { reads: Cell::new(0) });
    let err = m.put_global_mentions(MentionBucket::default().with_role("R5", "x")).unwrap_err();
    assert_eq!(err, StatecapError::StoreUnavailable("offline".into()));
    assert!(m.import_mention_store(&export_mention_store(&sample()).unwrap()).is_err());
}
