//! Legacy flag aggregation
//!
//! Older authorization checks read a handful of coarse `can_*` columns. These
//! are derived from the fine-grained flags on every save; they are never
//! edited directly and never merged with what was stored before.

use serde::{Deserialize, Serialize};

use crate::grant::FineGrained;
use crate::registry::{
    Scope, ALLIANCE_ALERTS, ALLIANCE_ALERTS_CREATE, ALLIANCE_ALERTS_MANAGE, STATE_ALERTS,
    STATE_DIRECTORY, STATE_DISCUSSION, STATE_MAIL, STATE_OPS, STATE_PERMISSIONS_MANAGE, STATE_VIEW,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateLegacy {
    pub can_view: bool,
    pub can_edit: bool,
    pub can_manage_state_alerts: bool,
    pub can_manage_discussion: bool,
    pub can_manage_directory: bool,
    pub can_manage_mail: bool,
    pub can_manage_live_ops: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllianceLegacy {
    pub can_view_alerts: bool,
    pub can_post_alerts: bool,
    pub can_manage_alerts: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LegacyFlags {
    State(StateLegacy),
    Alliance(AllianceLegacy),
}

/// Legacy column -> the fine-grained keys OR-ed into it
const STATE_SOURCES: &[(&str, &[&str])] = &[
    ("can_view", &[STATE_VIEW]),
    ("can_edit", &[STATE_PERMISSIONS_MANAGE]),
    ("can_manage_state_alerts", STATE_ALERTS),
    ("can_manage_discussion", STATE_DISCUSSION),
    ("can_manage_directory", STATE_DIRECTORY),
    ("can_manage_mail", STATE_MAIL),
    ("can_manage_live_ops", STATE_OPS),
];

const ALLIANCE_SOURCES: &[(&str, &[&str])] = &[
    ("can_view_alerts", ALLIANCE_ALERTS),
    ("can_post_alerts", &[ALLIANCE_ALERTS_CREATE]),
    ("can_manage_alerts", ALLIANCE_ALERTS_MANAGE),
];

/// The legacy columns of a scope with their contributing keys
pub fn legacy_sources(scope: Scope) -> &'static [(&'static str, &'static [&'static str])] {
    match scope {
        Scope::State => STATE_SOURCES,
        Scope::Alliance => ALLIANCE_SOURCES,
    }
}

/// Compute legacy flags for one scope. Missing keys are false, keys of the
/// other scope or unknown keys are ignored.
pub fn compute_legacy_flags(scope: Scope, f: &FineGrained) -> LegacyFlags {
    match scope {
        Scope::State => LegacyFlags::State(StateLegacy {
            can_view: f.get(STATE_VIEW),
            can_edit: f.get(STATE_PERMISSIONS_MANAGE),
            can_manage_state_alerts: f.any(STATE_ALERTS),
            can_manage_discussion: f.any(STATE_DISCUSSION),
            can_manage_directory: f.any(STATE_DIRECTORY),
            can_manage_mail: f.any(STATE_MAIL),
            can_manage_live_ops: f.any(STATE_OPS),
        }),
        Scope::Alliance => LegacyFlags::Alliance(AllianceLegacy {
            can_view_alerts: f.any(ALLIANCE_ALERTS),
            can_post_alerts: f.get(ALLIANCE_ALERTS_CREATE),
            can_manage_alerts: f.any(ALLIANCE_ALERTS_MANAGE),
        }),
    }
}

/// Fine-grained flags reproducing a legacy-only row.
///
/// A true column turns on each of its contributing keys that does not also
/// feed a false column. For any flags `compute_legacy_flags` can produce,
/// computing again from the expansion gives the same flags back.
pub fn expand_legacy_flags(legacy: &LegacyFlags) -> FineGrained {
    let sources = legacy_sources(legacy.scope());
    let cols = legacy.columns();

    let mut off: Vec<&str> = Vec::new();
    for ((_, keys), (_, on)) in sources.iter().zip(&cols) {
        if !*on {
            off.extend(keys.iter().copied());
        }
    }

    let mut f = FineGrained::new();
    for ((_, keys), (_, on)) in sources.iter().zip(&cols) {
        if *on {
            for k in keys.iter().filter(|k| !off.contains(*k)) {
                f.set(*k, true);
            }
        }
    }
    f
}

impl LegacyFlags {
    /// All-false flags for a scope
    pub fn empty(scope: Scope) -> Self {
        match scope {
            Scope::State => LegacyFlags::State(StateLegacy::default()),
            Scope::Alliance => LegacyFlags::Alliance(AllianceLegacy::default()),
        }
    }

    pub fn scope(&self) -> Scope {
        match self {
            LegacyFlags::State(_) => Scope::State,
            LegacyFlags::Alliance(_) => Scope::Alliance,
        }
    }

    /// `(column, value)` pairs in column order
    pub fn columns(&self) -> Vec<(&'static str, bool)> {
        match self {
            LegacyFlags::State(s) => vec![
                ("can_view", s.can_view),
                ("can_edit", s.can_edit),
                ("can_manage_state_alerts", s.can_manage_state_alerts),
                ("can_manage_discussion", s.can_manage_discussion),
                ("can_manage_directory", s.can_manage_directory),
                ("can_manage_mail", s.can_manage_mail),
                ("can_manage_live_ops", s.can_manage_live_ops),
            ],
            LegacyFlags::Alliance(a) => vec![
                ("can_view_alerts", a.can_view_alerts),
                ("can_post_alerts", a.can_post_alerts),
                ("can_manage_alerts", a.can_manage_alerts),
            ],
        }
    }

    /// Value of one legacy column, `None` if the scope has no such column
    pub fn flag(&self, column: &str) -> Option<bool> {
        self.columns().into_iter().find(|(c, _)| *c == column).map(|(_, v)| v)
    }

    /// Rebuild from column lookups; missing columns read as false
    pub fn from_columns(scope: Scope, mut col: impl FnMut(&str) -> Option<bool>) -> Self {
        let mut get = |name: &str| col(name).unwrap_or(false);
        match scope {
            Scope::State => LegacyFlags::State(StateLegacy {
                can_view: get("can_view"),
                can_edit: get("can_edit"),
                can_manage_state_alerts: get("can_manage_state_alerts"),
                can_manage_discussion: get("can_manage_discussion"),
                can_manage_directory: get("can_manage_directory"),
                can_manage_mail: get("can_manage_mail"),
                can_manage_live_ops: get("can_manage_live_ops"),
            }),
            Scope::Alliance => LegacyFlags::Alliance(AllianceLegacy {
                can_view_alerts: get("can_view_alerts"),
                can_post_alerts: get("can_post_alerts"),
                can_manage_alerts: get("can_manage_alerts"),
            }),
        }
    }

    pub fn any(&self) -> bool {
        self.columns().iter().any(|(_, v)| *v)
    }
}
