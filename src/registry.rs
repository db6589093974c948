//! Capability key registry: every fine-grained permission key, grouped by feature area

use serde::{Deserialize, Serialize};

/// The axis a grant or mention mapping applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    State,
    Alliance,
}

impl Scope {
    pub const ALL: [Scope; 2] = [Scope::State, Scope::Alliance];

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::State => "state",
            Scope::Alliance => "alliance",
        }
    }

    /// Prefix every key of this scope starts with
    pub fn key_prefix(self) -> &'static str {
        match self {
            Scope::State => "state_",
            Scope::Alliance => "alliance_",
        }
    }

    /// Column holding the scope id in a grant row
    pub fn id_column(self) -> &'static str {
        match self {
            Scope::State => "state_code",
            Scope::Alliance => "alliance_id",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Scope {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "state" => Ok(Scope::State),
            "alliance" => Ok(Scope::Alliance),
            other => Err(format!("unknown scope '{}'", other)),
        }
    }
}

/// A named group of keys as shown in the permission editor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyGroup {
    pub title: &'static str,
    pub keys: &'static [&'static str],
}

/// One fine-grained capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CapabilityKey {
    pub key: &'static str,
    pub group_title: &'static str,
    pub scope: Scope,
}

// State scope keys
pub const STATE_VIEW: &str = "state_view";
pub const STATE_PERMISSIONS_MANAGE: &str = "state_permissions_manage";

pub const STATE_ALERTS: &[&str] = &[
    "state_alerts_create",
    "state_alerts_edit_any",
    "state_alerts_pin",
    "state_alerts_delete",
    "state_alerts_moderate",
];

pub const STATE_DISCUSSION: &[&str] = &[
    "state_discussion_create_threads",
    "state_discussion_reply",
    "state_discussion_edit_any",
    "state_discussion_pin",
    "state_discussion_lock",
    "state_discussion_delete",
    "state_discussion_moderate",
];

pub const STATE_DIRECTORY: &[&str] = &[
    "state_directory_add",
    "state_directory_edit",
    "state_directory_deactivate",
    "state_directory_reorder",
    "state_directory_sync",
];

pub const STATE_MAIL: &[&str] = &[
    "state_mail_send_broadcast",
    "state_mail_manage_templates",
    "state_mail_manage_welcome",
    "state_mail_moderate",
];

pub const STATE_OPS: &[&str] = &[
    "state_ops_edit",
    "state_ops_manage_templates",
    "state_ops_control_timers",
    "state_ops_export_import",
];

// Alliance scope keys
pub const ALLIANCE_ALERTS_VIEW: &str = "alliance_alerts_view";
pub const ALLIANCE_ALERTS_CREATE: &str = "alliance_alerts_create";

/// Alert keys that manage existing alerts (everything but view/create)
pub const ALLIANCE_ALERTS_MANAGE: &[&str] = &[
    "alliance_alerts_edit_any",
    "alliance_alerts_pin",
    "alliance_alerts_delete",
    "alliance_alerts_moderate",
];

pub const ALLIANCE_ALERTS: &[&str] = &[
    ALLIANCE_ALERTS_VIEW,
    ALLIANCE_ALERTS_CREATE,
    "alliance_alerts_edit_any",
    "alliance_alerts_pin",
    "alliance_alerts_delete",
    "alliance_alerts_moderate",
];

const STATE_GROUPS: &[KeyGroup] = &[
    KeyGroup { title: "Access", keys: &[STATE_VIEW, STATE_PERMISSIONS_MANAGE] },
    KeyGroup { title: "Alerts", keys: STATE_ALERTS },
    KeyGroup { title: "Discussion", keys: STATE_DISCUSSION },
    KeyGroup { title: "Directory", keys: STATE_DIRECTORY },
    KeyGroup { title: "Mail", keys: STATE_MAIL },
    KeyGroup { title: "Live Ops", keys: STATE_OPS },
];

const ALLIANCE_GROUPS: &[KeyGroup] = &[KeyGroup { title: "Alerts", keys: ALLIANCE_ALERTS }];

/// Groups for a scope, in editor display order
pub fn groups(scope: Scope) -> &'static [KeyGroup] {
    match scope {
        Scope::State => STATE_GROUPS,
        Scope::Alliance => ALLIANCE_GROUPS,
    }
}

/// Every key of a scope, in group order
pub fn keys(scope: Scope) -> impl Iterator<Item = CapabilityKey> {
    groups(scope).iter().flat_map(move |g| {
        g.keys.iter().map(move |k| CapabilityKey { key: *k, group_title: g.title, scope })
    })
}

/// Look up a key within a scope
pub fn find(scope: Scope, key: &str) -> Option<CapabilityKey> {
    keys(scope).find(|c| c.key == key)
}

#[inline]
pub fn is_known(scope: Scope, key: &str) -> bool {
    find(scope, key).is_some()
}

/// Infer which scope a key belongs to
pub fn scope_of(key: &str) -> Option<Scope> {
    Scope::ALL.into_iter().find(|s| is_known(*s, key))
}

/// Resolve a list of key names, dropping any not registered for the scope
pub fn names_to_keys(scope: Scope, names: &[&str]) -> Vec<CapabilityKey> {
    names.iter().filter_map(|n| find(scope, n)).collect()
}
