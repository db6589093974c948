//! Role and channel mention maps, and their versioned JSON documents
//!
//! Roles and channels are persisted as two separate documents. Both share
//! the same global/alliance bucket layout:
//!
//! ```json
//! { "version": 1, "global": { "Leadership": "<@&999>" }, "alliances": { "WOC": { "R4": "<@&42>" } } }
//! { "version": 1, "global": [ { "name": "announcements", "id": "555" } ], "alliances": { "WOC": [] } }
//! ```

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{malformed, Result};

pub const DOCUMENT_VERSION: u32 = 1;

/// Role key -> mention text (`<@&id>`, a bare id, or plain text)
pub type RoleMap = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEntry {
    pub name: String,
    pub id: String,
}

impl ChannelEntry {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self { name: name.into(), id: id.into() }
    }

    /// The name templates match against: trimmed, leading `#` dropped
    pub fn placeholder_name(&self) -> &str {
        self.name.trim().trim_start_matches('#')
    }
}

/// The mappings of one scope: global, or a single alliance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentionBucket {
    pub roles: RoleMap,
    pub channels: Vec<ChannelEntry>,
}

impl MentionBucket {
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.channels.is_empty()
    }

    pub fn with_role(mut self, key: impl Into<String>, mention: impl Into<String>) -> Self {
        self.roles.insert(key.into(), mention.into());
        self
    }

    pub fn with_channel(mut self, name: impl Into<String>, id: impl Into<String>) -> Self {
        self.channels.push(ChannelEntry::new(name, id));
        self
    }

    /// Role keys and channel names must be non-empty. Channel names must be
    /// unique as templates see them, so `#ops` and `ops` collide.
    pub fn validate(&self, label: &str) -> Result<()> {
        if let Some(k) = self.roles.keys().find(|k| k.trim().is_empty()) {
            return Err(malformed(format!("{}: empty role key {:?}", label, k)));
        }
        let mut seen = HashSet::new();
        for c in &self.channels {
            let name = c.placeholder_name();
            if name.is_empty() {
                return Err(malformed(format!("{}: channel with empty name {:?}", label, c.name)));
            }
            if !seen.insert(name) {
                return Err(malformed(format!("{}: duplicate channel '{}'", label, c.name)));
            }
        }
        Ok(())
    }
}

/// Global mappings plus per-alliance overrides. Empty alliance buckets are
/// never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentionStore {
    pub global: MentionBucket,
    alliances: BTreeMap<String, MentionBucket>,
}

impl MentionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alliance(&self, code: &str) -> Option<&MentionBucket> {
        self.alliances.get(code)
    }

    pub fn alliances(&self) -> impl Iterator<Item = (&str, &MentionBucket)> {
        self.alliances.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn set_global(&mut self, bucket: MentionBucket) {
        self.global = bucket;
    }

    /// Replace an alliance bucket; an empty bucket removes the alliance
    pub fn set_alliance(&mut self, code: impl Into<String>, bucket: MentionBucket) {
        let code = code.into();
        if bucket.is_empty() {
            self.alliances.remove(&code);
        } else {
            self.alliances.insert(code, bucket);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.global.validate("global")?;
        for (code, b) in &self.alliances {
            if code.trim().is_empty() {
                return Err(malformed("empty alliance code"));
            }
            b.validate(code)?;
        }
        Ok(())
    }

    pub fn role_document(&self) -> RoleDocument {
        RoleDocument { version: DOCUMENT_VERSION, maps: self.role_maps() }
    }

    pub fn channel_document(&self) -> ChannelDocument {
        ChannelDocument { version: DOCUMENT_VERSION, maps: self.channel_maps() }
    }

    /// Combine the two persisted documents into one store
    pub fn from_documents(roles: RoleDocument, channels: ChannelDocument) -> Result<Self> {
        check_version(roles.version, "role")?;
        check_version(channels.version, "channel")?;
        Self::from_maps(roles.maps, channels.maps)
    }

    fn role_maps(&self) -> RoleMaps {
        RoleMaps {
            global: self.global.roles.clone(),
            alliances: self
                .alliances
                .iter()
                .filter(|(_, b)| !b.roles.is_empty())
                .map(|(k, b)| (k.clone(), b.roles.clone()))
                .collect(),
        }
    }

    fn channel_maps(&self) -> ChannelMaps {
        ChannelMaps {
            global: self.global.channels.clone(),
            alliances: self
                .alliances
                .iter()
                .filter(|(_, b)| !b.channels.is_empty())
                .map(|(k, b)| (k.clone(), b.channels.clone()))
                .collect(),
        }
    }

    fn from_maps(roles: RoleMaps, channels: ChannelMaps) -> Result<Self> {
        let mut alliances: BTreeMap<String, MentionBucket> = BTreeMap::new();
        for (code, r) in roles.alliances {
            alliances.entry(code).or_default().roles = r;
        }
        for (code, c) in channels.alliances {
            alliances.entry(code).or_default().channels = c;
        }
        alliances.retain(|_, b| !b.is_empty());
        let s = MentionStore {
            global: MentionBucket { roles: roles.global, channels: channels.global },
            alliances,
        };
        s.validate()?;
        Ok(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMaps {
    #[serde(default)]
    pub global: RoleMap,
    #[serde(default)]
    pub alliances: BTreeMap<String, RoleMap>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMaps {
    #[serde(default)]
    pub global: Vec<ChannelEntry>,
    #[serde(default)]
    pub alliances: BTreeMap<String, Vec<ChannelEntry>>,
}

/// Persisted role document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDocument {
    pub version: u32,
    #[serde(flatten)]
    pub maps: RoleMaps,
}

/// Persisted channel document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDocument {
    pub version: u32,
    #[serde(flatten)]
    pub maps: ChannelMaps,
}

/// Export/import document covering roles and channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentionExport {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<String>,
    #[serde(default)]
    pub roles: RoleMaps,
    #[serde(default)]
    pub channels: ChannelMaps,
}

fn check_version(v: u32, what: &str) -> Result<()> {
    if v == DOCUMENT_VERSION {
        Ok(())
    } else {
        Err(malformed(format!("unsupported {} document version {}", what, v)))
    }
}

pub(crate) fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serialize a store for download, stamped with `at`
pub fn export_mention_store_at(store: &MentionStore, at: DateTime<Utc>) -> Result<String> {
    let doc = MentionExport {
        version: DOCUMENT_VERSION,
        exported_at: Some(rfc3339(at)),
        roles: store.role_maps(),
        channels: store.channel_maps(),
    };
    serde_json::to_string_pretty(&doc).map_err(|e| malformed(e.to_string()))
}

pub fn export_mention_store(store: &MentionStore) -> Result<String> {
    export_mention_store_at(store, Utc::now())
}

/// Parse and validate an export document. Any failure rejects the whole
/// document.
pub fn import_mention_store(json: &str) -> Result<MentionStore> {
    let doc: MentionExport = serde_json::from_str(json).map_err(|e| malformed(e.to_string()))?;
    check_version(doc.version, "mention export")?;
    MentionStore::from_maps(doc.roles, doc.channels)
}

pub fn parse_role_document(json: &str) -> Result<RoleDocument> {
    let doc: RoleDocument = serde_json::from_str(json).map_err(|e| malformed(e.to_string()))?;
    check_version(doc.version, "role")?;
    Ok(doc)
}

pub fn parse_channel_document(json: &str) -> Result<ChannelDocument> {
    let doc: ChannelDocument = serde_json::from_str(json).map_err(|e| malformed(e.to_string()))?;
    check_version(doc.version, "channel")?;
    Ok(doc)
}
