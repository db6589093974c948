//! Store adapters
//!
//! `GrantStore` and `MentionStoreAdapter` are the only ways the core reaches
//! persisted state. `LmdbStore` implements both grant storage and the plain
//! key-value store that `KvMentionStore` keeps its two documents in.

use std::fs;

use chrono::Utc;
use heed::types::Str;
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::{err, Result, StatecapError};
use crate::grant::{FineGrained, GrantRecord, ScopeUser};
use crate::mentions::{
    export_mention_store_at, import_mention_store, parse_channel_document, parse_role_document, MentionBucket,
    MentionStore,
};
use crate::registry::Scope;
use crate::schema::{decode_grant_row, encode_grant_row, export_grants_at, parse_grant_export};

/// Reads and writes grant records for (scope, scope id, user)
pub trait GrantStore {
    fn get_grant(&self, scope: Scope, scope_id: &str, user_id: &str) -> Result<Option<GrantRecord>>;

    /// Write the flags, returning the record as stored with legacy flags recomputed
    fn put_grant(&self, scope: Scope, scope_id: &str, user_id: &str, fine_grained: &FineGrained) -> Result<GrantRecord>;

    fn delete_grant(&self, scope: Scope, scope_id: &str, user_id: &str) -> Result<bool>;

    fn list_users_in_scope(&self, scope: Scope, scope_id: &str) -> Result<Vec<ScopeUser>>;

    fn list_grants(&self, scope: Scope, scope_id: &str) -> Result<Vec<GrantRecord>> {
        let mut out = Vec::new();
        for u in self.list_users_in_scope(scope, scope_id)? {
            if let Some(r) = self.get_grant(scope, scope_id, &u.user_id)? {
                out.push(r);
            }
        }
        Ok(out)
    }

    fn put_grants(&self, records: &[GrantRecord]) -> Result<()> {
        for r in records {
            self.put_grant(r.scope(), r.scope_id(), r.user_id(), r.fine_grained())?;
        }
        Ok(())
    }
}

impl<T: GrantStore + ?Sized> GrantStore for &T {
    fn get_grant(&self, scope: Scope, scope_id: &str, user_id: &str) -> Result<Option<GrantRecord>> {
        (**self).get_grant(scope, scope_id, user_id)
    }
    fn put_grant(&self, scope: Scope, scope_id: &str, user_id: &str, fine_grained: &FineGrained) -> Result<GrantRecord> {
        (**self).put_grant(scope, scope_id, user_id, fine_grained)
    }
    fn delete_grant(&self, scope: Scope, scope_id: &str, user_id: &str) -> Result<bool> {
        (**self).delete_grant(scope, scope_id, user_id)
    }
    fn list_users_in_scope(&self, scope: Scope, scope_id: &str) -> Result<Vec<ScopeUser>> {
        (**self).list_users_in_scope(scope, scope_id)
    }
    fn list_grants(&self, scope: Scope, scope_id: &str) -> Result<Vec<GrantRecord>> {
        (**self).list_grants(scope, scope_id)
    }
    fn put_grants(&self, records: &[GrantRecord]) -> Result<()> {
        (**self).put_grants(records)
    }
}

/// Export every grant of a scope instance
pub fn export_grants<S: GrantStore + ?Sized>(store: &S, scope: Scope, scope_id: &str) -> Result<String> {
    let records = store.list_grants(scope, scope_id)?;
    export_grants_at(scope, scope_id, &records, Utc::now())
}

/// Validate a grant export and write it. A bad entry rejects the whole
/// document before anything is written.
pub fn import_grants<S: GrantStore + ?Sized>(store: &S, json: &str) -> Result<usize> {
    let (scope, scope_id, records) = parse_grant_export(json).inspect_err(|e| warn!(error = %e, "grant import rejected"))?;
    store.put_grants(&records)?;
    info!(%scope, scope_id = %scope_id, count = records.len(), "imported grants");
    Ok(records.len())
}

/// Opaque string blobs by key
pub trait KvStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Write several keys; implementations with transactions apply all or none
    fn put_many(&self, entries: &[(&str, String)]) -> Result<()> {
        for (k, v) in entries {
            self.put(k, v)?;
        }
        Ok(())
    }

    /// Read `keys`, pass their values to `f` and write back what it returns.
    /// Implementations with transactions hold one write transaction across
    /// the whole exchange; this default does not isolate concurrent writers.
    fn update(&self, keys: &[&str], f: &mut dyn FnMut(&[Option<String>]) -> Result<Vec<String>>) -> Result<()> {
        let current = keys.iter().map(|k| self.get(k)).collect::<Result<Vec<_>>>()?;
        let next = f(&current)?;
        let entries: Vec<(&str, String)> = keys.iter().copied().zip(next).collect();
        self.put_many(&entries)
    }
}

impl<T: KvStore + ?Sized> KvStore for &T {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }
    fn put(&self, key: &str, value: &str) -> Result<()> {
        (**self).put(key, value)
    }
    fn put_many(&self, entries: &[(&str, String)]) -> Result<()> {
        (**self).put_many(entries)
    }
    fn update(&self, keys: &[&str], f: &mut dyn FnMut(&[Option<String>]) -> Result<Vec<String>>) -> Result<()> {
        (**self).update(keys, f)
    }
}

/// Reads and replaces mention buckets.
///
/// Replacing one bucket rewrites the documents holding the others, so an
/// implementation must read and write them atomically or a concurrent save
/// to another bucket is lost. `KvMentionStore` does this through
/// `KvStore::update`.
pub trait MentionStoreAdapter {
    fn get_mention_store(&self) -> Result<MentionStore>;
    /// Replace the global bucket
    fn put_global_mentions(&self, bucket: MentionBucket) -> Result<()>;
    /// Replace one alliance's bucket; an empty bucket removes it
    fn put_alliance_mentions(&self, code: &str, bucket: MentionBucket) -> Result<()>;
    /// Replace the whole store from an export document
    fn import_mention_store(&self, json: &str) -> Result<MentionStore>;

    fn export_mention_store(&self) -> Result<String> {
        export_mention_store_at(&self.get_mention_store()?, Utc::now())
    }
}

pub const ROLE_DOCUMENT_KEY: &str = "mentions.roles";
pub const CHANNEL_DOCUMENT_KEY: &str = "mentions.channels";

/// Mention store kept as two JSON documents in a key-value store
pub struct KvMentionStore<K: KvStore> {
    kv: K,
}

const MENTION_KEYS: [&str; 2] = [ROLE_DOCUMENT_KEY, CHANNEL_DOCUMENT_KEY];

/// Stored documents that fail validation are corrupt records, not bad imports
fn stored(e: StatecapError) -> StatecapError {
    match e {
        StatecapError::MalformedImport(m) => StatecapError::InvalidRecord(m),
        other => other,
    }
}

fn decode_documents(roles: Option<&str>, channels: Option<&str>) -> Result<MentionStore> {
    let roles = match roles {
        Some(s) => parse_role_document(s).map_err(stored)?,
        None => MentionStore::new().role_document(),
    };
    let channels = match channels {
        Some(s) => parse_channel_document(s).map_err(stored)?,
        None => MentionStore::new().channel_document(),
    };
    MentionStore::from_documents(roles, channels).map_err(stored)
}

fn encode_documents(store: &MentionStore) -> Result<Vec<String>> {
    let enc = |e: serde_json::Error| StatecapError::InvalidRecord(e.to_string());
    Ok(vec![
        serde_json::to_string(&store.role_document()).map_err(enc)?,
        serde_json::to_string(&store.channel_document()).map_err(enc)?,
    ])
}

impl<K: KvStore> KvMentionStore<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    /// Read, edit and write both documents through one `KvStore::update`
    fn modify(&self, edit: impl FnOnce(&mut MentionStore)) -> Result<()> {
        let mut edit = Some(edit);
        self.kv.update(&MENTION_KEYS, &mut |current: &[Option<String>]| {
            let mut s = decode_documents(current[0].as_deref(), current[1].as_deref())?;
            if let Some(edit) = edit.take() {
                edit(&mut s);
            }
            encode_documents(&s)
        })
    }
}

impl<K: KvStore> MentionStoreAdapter for KvMentionStore<K> {
    fn get_mention_store(&self) -> Result<MentionStore> {
        let roles = self.kv.get(ROLE_DOCUMENT_KEY)?;
        let channels = self.kv.get(CHANNEL_DOCUMENT_KEY)?;
        decode_documents(roles.as_deref(), channels.as_deref())
    }

    fn put_global_mentions(&self, bucket: MentionBucket) -> Result<()> {
        bucket.validate("global")?;
        self.modify(|s| s.set_global(bucket))?;
        info!("saved global mentions");
        Ok(())
    }

    fn put_alliance_mentions(&self, code: &str, bucket: MentionBucket) -> Result<()> {
        if code.trim().is_empty() {
            return Err(StatecapError::MalformedImport("empty alliance code".into()));
        }
        bucket.validate(code)?;
        self.modify(|s| s.set_alliance(code, bucket))?;
        info!(alliance = code, "saved alliance mentions");
        Ok(())
    }

    fn import_mention_store(&self, json: &str) -> Result<MentionStore> {
        let s = import_mention_store(json).inspect_err(|e| warn!(error = %e, "mention import rejected"))?;
        let docs = encode_documents(&s)?;
        let entries: Vec<(&str, String)> = MENTION_KEYS.into_iter().zip(docs).collect();
        self.kv.put_many(&entries)?;
        info!(alliances = s.alliances().count(), "imported mention store");
        Ok(s)
    }
}

// LMDB

struct Dbs {
    grants: Database<Str, Str>,
    users: Database<Str, Str>,
    kv: Database<Str, Str>,
    defaults: Database<Str, Str>,
}

/// LMDB-backed grant, user, key-value and default-slot storage
pub struct LmdbStore {
    env: Env,
    dbs: Dbs,
}

const SEP: char = '\u{1f}';

/// Key parts are joined with `SEP`, so a part may not contain it
fn key_part<'a>(what: &str, part: &'a str) -> Result<&'a str> {
    if part.contains(SEP) {
        return Err(StatecapError::InvalidRecord(format!("{} {:?} contains a key separator", what, part)));
    }
    Ok(part)
}

fn scope_prefix(scope: Scope, scope_id: &str) -> Result<String> {
    Ok(format!("{}{}{}{}", scope, SEP, key_part("scope id", scope_id)?, SEP))
}

fn grant_key(scope: Scope, scope_id: &str, user_id: &str) -> Result<String> {
    Ok(format!("{}{}", scope_prefix(scope, scope_id)?, key_part("user id", user_id)?))
}

fn default_key(kind: &str, scope_id: &str) -> Result<String> {
    Ok(format!("{}{}{}", key_part("kind", kind)?, SEP, key_part("scope id", scope_id)?))
}

impl LmdbStore {
    pub fn open(cfg: &StoreConfig) -> Result<Self> {
        cfg.validate()?;
        fs::create_dir_all(&cfg.path).map_err(err)?;
        // SAFETY: LMDB requires no other process to open this path concurrently during open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(cfg.map_size)
                .max_dbs(cfg.max_dbs)
                .open(&cfg.path)
                .map_err(err)?
        };
        let mut tx = env.write_txn().map_err(err)?;
        let dbs = Dbs {
            grants: env.create_database(&mut tx, Some("grants")).map_err(err)?,
            users: env.create_database(&mut tx, Some("users")).map_err(err)?,
            kv: env.create_database(&mut tx, Some("kv")).map_err(err)?,
            defaults: env.create_database(&mut tx, Some("defaults")).map_err(err)?,
        };
        tx.commit().map_err(err)?;
        debug!(path = %cfg.path.display(), "opened lmdb store");
        Ok(Self { env, dbs })
    }

    fn read<T, F: FnOnce(&Dbs, &RoTxn) -> Result<T>>(&self, f: F) -> Result<T> {
        let tx = self.env.read_txn().map_err(err)?;
        f(&self.dbs, &tx)
    }

    fn write<T, F: FnOnce(&Dbs, &mut RwTxn) -> Result<T>>(&self, f: F) -> Result<T> {
        let mut tx = self.env.write_txn().map_err(err)?;
        let r = f(&self.dbs, &mut tx)?;
        tx.commit().map_err(err)?;
        Ok(r)
    }

    /// Record the name shown for a user in scope listings
    pub fn put_user(&self, user_id: &str, display_name: &str) -> Result<()> {
        self.write(|d, tx| d.users.put(tx, user_id, display_name).map_err(err))
    }

    /// Make `item_id` the default for (kind, scope id), returning the one it
    /// replaced. The slot holds one value, so there is never zero or two
    /// defaults between writes.
    pub fn set_default(&self, kind: &str, scope_id: &str, item_id: &str) -> Result<Option<String>> {
        let k = default_key(kind, scope_id)?;
        self.write(|d, tx| {
            let prev = d.defaults.get(tx, &k).map_err(err)?.map(str::to_string);
            d.defaults.put(tx, &k, item_id).map_err(err)?;
            Ok(prev)
        })
    }

    pub fn get_default(&self, kind: &str, scope_id: &str) -> Result<Option<String>> {
        let k = default_key(kind, scope_id)?;
        self.read(|d, tx| Ok(d.defaults.get(tx, &k).map_err(err)?.map(str::to_string)))
    }

    pub fn clear_default(&self, kind: &str, scope_id: &str) -> Result<bool> {
        let k = default_key(kind, scope_id)?;
        self.write(|d, tx| d.defaults.delete(tx, &k).map_err(err))
    }

    /// Clear all databases (for testing)
    pub fn clear_all(&self) -> Result<()> {
        self.write(|d, tx| {
            d.grants.clear(tx).map_err(err)?;
            d.users.clear(tx).map_err(err)?;
            d.kv.clear(tx).map_err(err)?;
            d.defaults.clear(tx).map_err(err)
        })
    }

    fn put_row(d: &Dbs, tx: &mut RwTxn, r: &GrantRecord) -> Result<()> {
        let key = grant_key(r.scope(), r.scope_id(), r.user_id())?;
        let row = encode_grant_row(r).to_string();
        d.grants.put(tx, &key, &row).map_err(err)
    }
}

impl GrantStore for LmdbStore {
    fn get_grant(&self, scope: Scope, scope_id: &str, user_id: &str) -> Result<Option<GrantRecord>> {
        let key = grant_key(scope, scope_id, user_id)?;
        let raw = self.read(|d, tx| Ok(d.grants.get(tx, &key).map_err(err)?.map(str::to_string)))?;
        debug!(%scope, scope_id, user_id, found = raw.is_some(), "get grant");
        match raw {
            Some(s) => {
                let v: serde_json::Value =
                    serde_json::from_str(&s).map_err(|e| StatecapError::InvalidRecord(e.to_string()))?;
                decode_grant_row(scope, &v).map(Some)
            }
            None => Ok(None),
        }
    }

    fn put_grant(&self, scope: Scope, scope_id: &str, user_id: &str, fine_grained: &FineGrained) -> Result<GrantRecord> {
        let mut f = fine_grained.clone();
        f.retain_scope(scope);
        let r = GrantRecord::with_flags(scope, scope_id, user_id, f);
        self.write(|d, tx| Self::put_row(d, tx, &r))
            .inspect_err(|e| warn!(%scope, scope_id, user_id, error = %e, "put grant failed"))?;
        Ok(r)
    }

    fn delete_grant(&self, scope: Scope, scope_id: &str, user_id: &str) -> Result<bool> {
        let key = grant_key(scope, scope_id, user_id)?;
        self.write(|d, tx| d.grants.delete(tx, &key).map_err(err))
    }

    fn list_users_in_scope(&self, scope: Scope, scope_id: &str) -> Result<Vec<ScopeUser>> {
        let pfx = scope_prefix(scope, scope_id)?;
        let mut users = self.read(|d, tx| {
            let mut r = Vec::new();
            for item in d.grants.prefix_iter(tx, &pfx).map_err(err)? {
                let (k, _) = item.map_err(err)?;
                if let Some(uid) = k.strip_prefix(pfx.as_str()) {
                    let name = d.users.get(tx, uid).map_err(err)?.unwrap_or(uid);
                    r.push(ScopeUser { user_id: uid.to_string(), display_name: name.to_string() });
                }
            }
            Ok(r)
        })?;
        users.sort_by(|a, b| {
            a.display_name.to_lowercase().cmp(&b.display_name.to_lowercase()).then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(users)
    }

    fn put_grants(&self, records: &[GrantRecord]) -> Result<()> {
        self.write(|d, tx| {
            for r in records {
                let mut f = r.fine_grained().clone();
                f.retain_scope(r.scope());
                Self::put_row(d, tx, &GrantRecord::with_flags(r.scope(), r.scope_id(), r.user_id(), f))?;
            }
            Ok(())
        })
    }
}

impl KvStore for LmdbStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.read(|d, tx| Ok(d.kv.get(tx, key).map_err(err)?.map(str::to_string)))
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.write(|d, tx| d.kv.put(tx, key, value).map_err(err))
    }

    fn put_many(&self, entries: &[(&str, String)]) -> Result<()> {
        self.write(|d, tx| {
            for (k, v) in entries {
                d.kv.put(tx, k, v).map_err(err)?;
            }
            Ok(())
        })
    }

    fn update(&self, keys: &[&str], f: &mut dyn FnMut(&[Option<String>]) -> Result<Vec<String>>) -> Result<()> {
        self.write(|d, tx| {
            let mut current = Vec::with_capacity(keys.len());
            for k in keys {
                current.push(d.kv.get(tx, k).map_err(err)?.map(str::to_string));
            }
            for (k, v) in keys.iter().zip(f(&current)?) {
                d.kv.put(tx, k, &v).map_err(err)?;
            }
            Ok(())
        })
    }
}
