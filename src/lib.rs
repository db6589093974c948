//! statecap - scoped capability grants and mention placeholder resolution
//!
//! Two pure cores sit behind thin store adapters:
//!
//! - [`compute_legacy_flags`] derives the coarse `can_*` flags older checks
//!   read from a user's fine-grained state or alliance grants.
//! - [`resolve_template`] rewrites `@Role`, `{{Role}}`, `#channel`,
//!   `{{#channel}}` and `{{channel:name}}` tokens into Discord mentions,
//!   alliance mappings first.

pub mod config;
pub mod error;
pub mod grant;
pub mod legacy;
pub mod mentions;
pub mod registry;
pub mod resolve;
pub mod schema;
pub mod session;
pub mod store;

pub use config::StoreConfig;
pub use error::{Result, StatecapError};
pub use grant::{FineGrained, GrantRecord, ScopeUser};
pub use legacy::{compute_legacy_flags, expand_legacy_flags, AllianceLegacy, LegacyFlags, StateLegacy};
pub use mentions::{
    export_mention_store, export_mention_store_at, import_mention_store, ChannelEntry, MentionBucket, MentionStore,
};
pub use registry::{CapabilityKey, KeyGroup, Scope};
pub use resolve::{resolve_template, unresolved_placeholders, DEFAULT_ROLE_KEYS};
pub use schema::{decode_grant_row, encode_grant_row};
pub use session::GrantEditor;
pub use store::{
    export_grants, import_grants, GrantStore, KvMentionStore, KvStore, LmdbStore, MentionStoreAdapter,
};
