//! Grant row shapes
//!
//! Rows come back from the data service as untyped JSON objects whose shape
//! depends on how old the table is. `decode_grant_row` tries each candidate
//! schema in order and takes the first hit; rows written by this crate always
//! use the flat-column shape.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{malformed, Result, StatecapError};
use crate::grant::{FineGrained, GrantRecord};
use crate::legacy::{expand_legacy_flags, LegacyFlags};
use crate::mentions::{rfc3339, DOCUMENT_VERSION};
use crate::registry::{self, Scope};

type Row = Map<String, Value>;

/// One known row layout. `decode` returns `None` when the row is not in
/// this layout.
pub trait RowSchema {
    fn name(&self) -> &'static str;
    fn decode(&self, scope: Scope, row: &Row) -> Option<GrantRecord>;
}

/// Current layout: one boolean column per capability key
pub struct FlatColumns;

/// Flags nested under a `permissions` object
pub struct PermissionsObject;

/// Old layout with only the coarse `can_*` columns
pub struct LegacyColumns;

/// Candidates in the order they are tried
pub const CANDIDATES: &[&(dyn RowSchema + Sync)] = &[&FlatColumns, &PermissionsObject, &LegacyColumns];

fn text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn ids(scope: Scope, row: &Row) -> Option<(String, String)> {
    Some((text(row.get(scope.id_column())?)?, text(row.get("user_id")?)?))
}

impl RowSchema for FlatColumns {
    fn name(&self) -> &'static str {
        "flat columns"
    }

    fn decode(&self, scope: Scope, row: &Row) -> Option<GrantRecord> {
        let (scope_id, user_id) = ids(scope, row)?;
        let mut hit = false;
        let mut f = FineGrained::new();
        for c in registry::keys(scope) {
            if let Some(v) = row.get(c.key).and_then(Value::as_bool) {
                hit = true;
                f.set(c.key, v);
            }
        }
        hit.then(|| GrantRecord::with_flags(scope, scope_id, user_id, f))
    }
}

impl RowSchema for PermissionsObject {
    fn name(&self) -> &'static str {
        "permissions object"
    }

    fn decode(&self, scope: Scope, row: &Row) -> Option<GrantRecord> {
        let (scope_id, user_id) = ids(scope, row)?;
        let perms = row.get("permissions")?.as_object()?;
        let mut f: FineGrained = perms
            .iter()
            .filter_map(|(k, v)| v.as_bool().map(|b| (k.clone(), b)))
            .collect();
        f.retain_scope(scope);
        Some(GrantRecord::with_flags(scope, scope_id, user_id, f))
    }
}

impl RowSchema for LegacyColumns {
    fn name(&self) -> &'static str {
        "legacy columns"
    }

    fn decode(&self, scope: Scope, row: &Row) -> Option<GrantRecord> {
        let (scope_id, user_id) = ids(scope, row)?;
        let present = LegacyFlags::empty(scope).columns().iter().any(|(c, _)| row.get(*c).is_some_and(Value::is_boolean));
        if !present {
            return None;
        }
        let legacy = LegacyFlags::from_columns(scope, |c| row.get(c).and_then(Value::as_bool));
        Some(GrantRecord::with_flags(scope, scope_id, user_id, expand_legacy_flags(&legacy)))
    }
}

/// Narrow a stored row into a typed record
pub fn decode_grant_row(scope: Scope, row: &Value) -> Result<GrantRecord> {
    let obj = row
        .as_object()
        .ok_or_else(|| StatecapError::InvalidRecord(format!("{} grant row is not an object", scope)))?;
    for schema in CANDIDATES {
        if let Some(r) = schema.decode(scope, obj) {
            debug!(schema = schema.name(), %scope, "decoded grant row");
            return Ok(r);
        }
    }
    Err(StatecapError::InvalidRecord(format!("{} grant row matches no known schema", scope)))
}

/// Flat-column row: ids, every capability column, then the derived legacy columns
pub fn encode_grant_row(r: &GrantRecord) -> Value {
    let mut row = Row::new();
    row.insert(r.scope().id_column().into(), Value::String(r.scope_id().into()));
    row.insert("user_id".into(), Value::String(r.user_id().into()));
    for (k, v) in r.fine_grained().columns(r.scope()) {
        row.insert(k.into(), Value::Bool(v));
    }
    for (k, v) in r.legacy().columns() {
        row.insert(k.into(), Value::Bool(v));
    }
    Value::Object(row)
}

// Grant export documents

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantExportEntry {
    pub user_id: String,
    #[serde(default)]
    pub permissions: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantExport {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<String>,
    pub scope: Scope,
    pub scope_id: String,
    pub grants: Vec<GrantExportEntry>,
}

pub fn export_grants_at(scope: Scope, scope_id: &str, records: &[GrantRecord], at: DateTime<Utc>) -> Result<String> {
    let doc = GrantExport {
        version: DOCUMENT_VERSION,
        exported_at: Some(rfc3339(at)),
        scope,
        scope_id: scope_id.to_string(),
        grants: records
            .iter()
            .map(|r| GrantExportEntry {
                user_id: r.user_id().to_string(),
                permissions: r.fine_grained().granted_keys().map(|k| (k.to_string(), true)).collect(),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&doc).map_err(|e| malformed(e.to_string()))
}

/// Validate a grant export and turn it into records. Keys of the other
/// scope are rejected; keys no scope knows are dropped.
pub fn parse_grant_export(json: &str) -> Result<(Scope, String, Vec<GrantRecord>)> {
    let doc: GrantExport = serde_json::from_str(json).map_err(|e| malformed(e.to_string()))?;
    if doc.version != DOCUMENT_VERSION {
        return Err(malformed(format!("unsupported grant export version {}", doc.version)));
    }
    if doc.scope_id.trim().is_empty() {
        return Err(malformed("grant export has empty scopeId"));
    }
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(doc.grants.len());
    for g in doc.grants {
        if g.user_id.trim().is_empty() {
            return Err(malformed("grant entry with empty userId"));
        }
        if !seen.insert(g.user_id.clone()) {
            return Err(malformed(format!("duplicate grant entry for '{}'", g.user_id)));
        }
        let mut f = FineGrained::new();
        for (k, v) in g.permissions {
            match registry::scope_of(&k) {
                Some(s) if s == doc.scope => f.set(k, v),
                Some(s) => return Err(malformed(format!("{} key '{}' in {} export", s, k, doc.scope))),
                None => debug!(key = %k, "ignoring unknown capability in import"),
            }
        }
        out.push(GrantRecord::with_flags(doc.scope, doc.scope_id.clone(), g.user_id, f));
    }
    Ok((doc.scope, doc.scope_id, out))
}
