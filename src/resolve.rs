//! Placeholder resolution for Discord message templates
//!
//! Channel tokens (`#name`, `{{#name}}`, `{{channel:name}}`) are rewritten
//! first, then role tokens (`@Key`, `{{Key}}`). Anything without a mapping
//! is left exactly as written.

use tracing::debug;

use crate::mentions::{ChannelEntry, MentionStore};

/// Role keys recognised in templates
pub const DEFAULT_ROLE_KEYS: [&str; 6] = ["Leadership", "R5", "R4", "Member", "StateLeadership", "StateMod"];

#[inline]
fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn non_empty(alliance: Option<&str>) -> Option<&str> {
    alliance.map(str::trim).filter(|a| !a.is_empty())
}

/// Render a stored channel id as a mention, `None` if blank
pub fn channel_mention(id: &str) -> Option<String> {
    let id = id.trim();
    if id.is_empty() {
        None
    } else if id.starts_with("<#") {
        Some(id.to_string())
    } else {
        Some(format!("<#{}>", id))
    }
}

/// Render a stored role value; bare snowflakes become `<@&id>`
pub fn role_mention_text(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        None
    } else if v.chars().all(|c| c.is_ascii_digit()) {
        Some(format!("<@&{}>", v))
    } else {
        Some(v.to_string())
    }
}

/// Alliance mapping if non-empty, else the global one
pub fn role_mention(store: &MentionStore, alliance: Option<&str>, key: &str) -> Option<String> {
    non_empty(alliance)
        .and_then(|code| store.alliance(code))
        .and_then(|b| b.roles.get(key))
        .and_then(|v| role_mention_text(v))
        .or_else(|| store.global.roles.get(key).and_then(|v| role_mention_text(v)))
}

/// The one channel list a template resolves against. A non-empty alliance
/// list wins outright; there is no per-channel fallback to global.
pub fn channel_list<'a>(store: &'a MentionStore, alliance: Option<&str>) -> &'a [ChannelEntry] {
    match non_empty(alliance).and_then(|code| store.alliance(code)) {
        Some(b) if !b.channels.is_empty() => &b.channels,
        _ => &store.global.channels,
    }
}

/// Replace `token` where it is not followed by a name character and not
/// already inside a rendered `<...>` mention
fn replace_bare(text: &str, token: &str, with: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (i, _) in text.match_indices(token) {
        let end = i + token.len();
        if text[end..].chars().next().is_some_and(is_name_char) || text[..i].ends_with('<') {
            continue;
        }
        out.push_str(&text[last..i]);
        out.push_str(with);
        last = end;
    }
    out.push_str(&text[last..]);
    out
}

/// Every `{{...}}` span as (offset, inner text)
fn braced(text: &str) -> Vec<(usize, &str)> {
    let mut spans = Vec::new();
    let mut from = 0;
    while let Some(start) = text[from..].find("{{").map(|i| i + from) {
        let Some(len) = text[start + 2..].find("}}") else { break };
        spans.push((start, &text[start + 2..start + 2 + len]));
        from = start + 2;
    }
    spans
}

/// Channel name of a braced `channel:name` or `#name` token
fn braced_channel(inner: &str) -> Option<&str> {
    inner.strip_prefix("channel:").or_else(|| inner.strip_prefix('#')).filter(|n| !n.is_empty())
}

/// Resolve every role and channel placeholder in `text`.
///
/// Pure: the store is passed fully materialized and the result depends only
/// on the three inputs.
pub fn resolve_template(text: &str, alliance: Option<&str>, store: &MentionStore) -> String {
    if text.is_empty() {
        return String::new();
    }
    let mut out = text.to_string();

    for c in channel_list(store, alliance) {
        let name = c.placeholder_name();
        let Some(target) = channel_mention(&c.id) else { continue };
        if name.is_empty() {
            continue;
        }
        out = out.replace(&format!("{{{{channel:{}}}}}", name), &target);
        out = out.replace(&format!("{{{{#{}}}}}", name), &target);
        out = replace_bare(&out, &format!("#{}", name), &target);
    }
    for (_, inner) in braced(&out) {
        if let Some(name) = braced_channel(inner) {
            debug!(channel = name, alliance = ?alliance, "channel placeholder left unresolved");
        }
    }

    for key in DEFAULT_ROLE_KEYS {
        let braced = format!("{{{{{}}}}}", key);
        let bare = format!("@{}", key);
        match role_mention(store, alliance, key) {
            Some(m) => {
                out = out.replace(&braced, &m);
                out = replace_bare(&out, &bare, &m);
            }
            None if out.contains(&braced) || out.contains(&bare) => {
                debug!(role = key, alliance = ?alliance, "role placeholder left unresolved");
            }
            None => {}
        }
    }
    out
}

/// Recognisable placeholders still present after resolution, in order of
/// first appearance. Bare `#name` tokens are not reported since ordinary
/// hashtags look the same.
pub fn unresolved_placeholders(text: &str, alliance: Option<&str>, store: &MentionStore) -> Vec<String> {
    let resolved = resolve_template(text, alliance, store);
    let mut found: Vec<(usize, String)> = Vec::new();

    for (start, inner) in braced(&resolved) {
        if braced_channel(inner).is_some() || DEFAULT_ROLE_KEYS.contains(&inner) {
            found.push((start, format!("{{{{{}}}}}", inner)));
        }
    }

    for key in DEFAULT_ROLE_KEYS {
        let bare = format!("@{}", key);
        for (i, _) in resolved.match_indices(&bare) {
            let end = i + bare.len();
            if !resolved[end..].chars().next().is_some_and(is_name_char) {
                found.push((i, bare.clone()));
            }
        }
    }

    found.sort_by_key(|(i, _)| *i);
    let mut out: Vec<String> = Vec::new();
    for (_, tok) in found {
        if !out.contains(&tok) {
            out.push(tok);
        }
    }
    if !out.is_empty() {
        debug!(count = out.len(), alliance = ?alliance, "unresolved placeholders");
    }
    out
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::mentions::MentionBucket;

    #[traced_test]
    #[test]
    fn unresolved_channel_is_logged() {
        let mut store = MentionStore::new();
        store.set_global(MentionBucket::default().with_channel("ops", "1"));
        let out = resolve_template("{{channel:missing}} {{#ops}}", None, &store);
        assert_eq!(out, "{{channel:missing}} <#1>");
        assert!(logs_contain("channel placeholder left unresolved"));
        assert!(logs_contain("missing"));
    }

    #[traced_test]
    #[test]
    fn resolved_channel_not_logged() {
        let mut store = MentionStore::new();
        store.set_global(MentionBucket::default().with_channel("ops", "1"));
        assert_eq!(resolve_template("{{channel:ops}}", None, &store), "<#1>");
        assert!(!logs_contain("channel placeholder left unresolved"));
    }

    #[test]
    fn bare_token_respects_boundary() {
        assert_eq!(replace_bare("@R5 @R50 @R5.", "@R5", "X"), "X @R50 X.");
        assert_eq!(replace_bare("#gen #general", "#gen", "<#1>"), "<#1> #general");
        assert_eq!(replace_bare("<#gen>", "#gen", "<#1>"), "<#gen>");
    }

    #[test]
    fn rendering() {
        assert_eq!(channel_mention(" 123 ").as_deref(), Some("<#123>"));
        assert_eq!(channel_mention("<#9>").as_deref(), Some("<#9>"));
        assert_eq!(channel_mention("  "), None);
        assert_eq!(role_mention_text("999").as_deref(), Some("<@&999>"));
        assert_eq!(role_mention_text("@everyone").as_deref(), Some("@everyone"));
        assert_eq!(role_mention_text(""), None);
    }

    #[test]
    fn empty_text() {
        assert_eq!(resolve_template("", Some("WOC"), &MentionStore::new()), "");
    }
}
