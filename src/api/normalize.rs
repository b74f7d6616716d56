//! Tolerant reading of proposal payloads.
//!
//! Rows come back from the API and the local cache in several historical
//! shapes: snake_case or camelCase keys, pricing and sharing fields either
//! nested or flattened onto the proposal, `null` where a value was never set,
//! `{}` / `[]` where an editor cleared something, ids as numbers, timestamps
//! as strings or epoch milliseconds. Everything is folded into the one
//! shape [`Proposal`] deserializes from before serde sees it.
//!
//! The cache-merge shim for fields the backend drops lives here too, see
//! [`reconcile_with_cache`].

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::QuireError;
use crate::model::{new_id, Layout, Proposal, TableObject};

/// Keys that belong under `pricing` when they appear on the proposal itself.
const FLAT_PRICING_KEYS: &[(&str, &str)] = &[
    ("currency", "currency"),
    ("taxRate", "taxRate"),
    ("lineItems", "items"),
    ("pricingItems", "items"),
];

/// Keys that belong under `settings.sharing`.
const FLAT_SHARING_KEYS: &[(&str, &str)] = &[
    ("isPublic", "public"),
    ("shareToken", "token"),
    ("allowComments", "allowComments"),
];

const CANVAS_ARRAYS: &[&str] = &["shapes", "tables", "texts", "images"];

/// Parse one proposal payload, whatever shape it arrived in.
pub fn normalize_proposal(raw: &Value) -> Result<Proposal, QuireError> {
    let mut value = camelize_keys(raw);
    prune_empty(&mut value);
    if let Value::Object(map) = &mut value {
        normalize_object(map, None);
    }
    let proposal: Proposal = serde_json::from_value(value)?;
    Ok(square_tables(proposal))
}

/// Every table grid, including those inside version snapshots, squared to
/// `rows × columns`.
fn square_tables(mut proposal: Proposal) -> Proposal {
    for section in &mut proposal.sections {
        let tables = std::mem::take(&mut section.tables);
        section.tables = tables.into_iter().map(TableObject::normalized).collect();
    }
    for version in &mut proposal.versions {
        let snapshot = std::mem::replace(&mut *version.snapshot, Proposal::new("", ""));
        *version.snapshot = square_tables(snapshot);
    }
    proposal
}

fn normalize_object(map: &mut Map<String, Value>, parent_id: Option<&str>) {
    if !map.contains_key("id") {
        let id = parent_id.map(str::to_string).unwrap_or_else(new_id);
        map.insert("id".to_string(), Value::String(id));
    }
    let id = map
        .get("id")
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default();

    // Some rows carry a client object instead of a name.
    if let Some(Value::Object(client)) = map.get("client") {
        let name = client.get("name").cloned().unwrap_or(Value::Null);
        map.insert("client".to_string(), name);
    }
    for key in ["title", "client"] {
        stringify(map, key);
    }

    lift_flat(map, "pricing", FLAT_PRICING_KEYS);
    if let Some(sharing) = map.remove("sharing") {
        if let Some(settings) = nested(map, "settings") {
            settings.entry("sharing").or_insert(sharing);
        }
    }
    let mut flat_sharing = Map::new();
    for (from, to) in FLAT_SHARING_KEYS {
        if let Some(v) = map.remove(*from) {
            flat_sharing.insert(to.to_string(), v);
        }
    }
    if !flat_sharing.is_empty() {
        if let Some(sharing) = nested(map, "settings").and_then(|s| nested(s, "sharing")) {
            for (k, v) in flat_sharing {
                sharing.entry(k).or_insert(v);
            }
        }
    }

    normalize_enum(map, "status", &["draft", "sent", "accepted", "declined"]);
    normalize_timestamps(map);

    if let Some(Value::Array(sections)) = map.get_mut("sections") {
        sections.retain(Value::is_object);
        for section in sections.iter_mut() {
            if let Value::Object(section) = section {
                normalize_section(section);
            }
        }
    }
    if let Some(Value::Object(pricing)) = map.get_mut("pricing") {
        if let Some(Value::Array(items)) = pricing.get_mut("items") {
            items.retain(Value::is_object);
            for item in items.iter_mut() {
                if let Value::Object(item) = item {
                    ensure_id(item);
                    stringify(item, "label");
                }
            }
        }
    }
    if let Some(Value::Array(versions)) = map.get_mut("versions") {
        versions.retain(|v| {
            v.get("snapshot")
                .or_else(|| v.get("data"))
                .is_some_and(Value::is_object)
        });
        for version in versions.iter_mut() {
            if let Value::Object(version) = version {
                ensure_id(version);
                normalize_timestamps(version);
                let key = if version.contains_key("snapshot") { "snapshot" } else { "data" };
                if let Some(Value::Object(snapshot)) = version.get_mut(key) {
                    normalize_object(snapshot, Some(&id));
                }
                if !version.contains_key("createdAt") {
                    version.insert("createdAt".to_string(), Value::String(Utc::now().to_rfc3339()));
                }
            }
        }
    }
}

fn normalize_section(section: &mut Map<String, Value>) {
    ensure_id(section);
    stringify(section, "title");
    stringify(section, "content");

    if let Some(Value::Array(columns)) = section.get_mut("columnContents") {
        for column in columns.iter_mut() {
            if !column.is_string() {
                *column = Value::String(match &*column {
                    Value::Null => String::new(),
                    other => other.to_string(),
                });
            }
        }
    }
    if let Some(Value::Array(styles)) = section.get_mut("columnStyles") {
        for style in styles.iter_mut() {
            if !style.is_object() {
                *style = Value::Object(Map::new());
            }
        }
    }

    if let Some(Value::Array(media)) = section.get_mut("media") {
        media.retain(|m| {
            m.get("url").is_some_and(Value::is_string)
                && m.get("type")
                    .and_then(Value::as_str)
                    .is_some_and(|t| matches!(t.to_ascii_lowercase().as_str(), "image" | "video"))
        });
        for m in media.iter_mut() {
            if let Some(Value::String(t)) = m.get_mut("type") {
                *t = t.to_ascii_lowercase();
            }
        }
    }

    for key in CANVAS_ARRAYS {
        if let Some(Value::Array(objects)) = section.get_mut(*key) {
            objects.retain(Value::is_object);
            for object in objects.iter_mut() {
                if let Value::Object(object) = object {
                    ensure_id(object);
                }
            }
        }
    }

    if let Some(Value::Array(comments)) = section.get_mut("comments") {
        comments.retain(Value::is_object);
        for comment in comments.iter_mut() {
            if let Value::Object(comment) = comment {
                ensure_id(comment);
                stringify(comment, "author");
                stringify(comment, "text");
                normalize_timestamps(comment);
            }
        }
    }
}

/// snake_case keys to camelCase, recursively. String values are untouched.
fn camelize_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (camel_case(k), camelize_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(camelize_keys).collect()),
        other => other.clone(),
    }
}

fn camel_case(key: &str) -> String {
    if !key.contains('_') {
        return key.to_string();
    }
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for (i, c) in key.chars().enumerate() {
        if c == '_' && i > 0 {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Drop object members that are `null`, `{}` or `[]`, recursively. Array
/// elements are kept so table grids keep their positions.
fn prune_empty(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for v in map.values_mut() {
                prune_empty(v);
            }
            map.retain(|_, v| !is_empty_value(v));
        }
        Value::Array(items) => items.iter_mut().for_each(prune_empty),
        _ => {}
    }
}

fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

fn ensure_id(map: &mut Map<String, Value>) {
    if !map.contains_key("id") {
        map.insert("id".to_string(), Value::String(new_id()));
    }
}

/// Numbers and booleans become strings; other non-strings are dropped.
fn stringify(map: &mut Map<String, Value>, key: &str) {
    match map.get(key) {
        Some(Value::String(_)) | None => {}
        Some(Value::Number(n)) => {
            let s = n.to_string();
            map.insert(key.to_string(), Value::String(s));
        }
        Some(Value::Bool(b)) => {
            let s = b.to_string();
            map.insert(key.to_string(), Value::String(s));
        }
        Some(_) => {
            map.remove(key);
        }
    }
}

fn normalize_enum(map: &mut Map<String, Value>, key: &str, allowed: &[&str]) {
    let Some(Value::String(s)) = map.get(key) else {
        map.remove(key);
        return;
    };
    let lower = s.trim().to_ascii_lowercase();
    if allowed.contains(&lower.as_str()) {
        map.insert(key.to_string(), Value::String(lower));
    } else {
        debug!(key, value = %s, "Dropping unknown enum value");
        map.remove(key);
    }
}

/// The object under `key`, created (or replacing a non-object) if needed.
fn nested<'m>(map: &'m mut Map<String, Value>, key: &str) -> Option<&'m mut Map<String, Value>> {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    slot.as_object_mut()
}

fn lift_flat(map: &mut Map<String, Value>, into: &str, keys: &[(&str, &str)]) {
    let mut lifted = Map::new();
    for (from, to) in keys {
        if let Some(v) = map.remove(*from) {
            lifted.entry(to.to_string()).or_insert(v);
        }
    }
    if lifted.is_empty() {
        return;
    }
    if let Some(target) = nested(map, into) {
        for (k, v) in lifted {
            target.entry(k).or_insert(v);
        }
    }
}

fn normalize_timestamps(map: &mut Map<String, Value>) {
    if let Some(ts) = map.remove("timestamp") {
        map.entry("createdAt").or_insert(ts);
    }
    for key in ["createdAt", "updatedAt"] {
        let Some(v) = map.remove(key) else { continue };
        match parse_timestamp(&v) {
            Some(ts) => {
                map.insert(key.to_string(), Value::String(ts.to_rfc3339()));
            }
            None => warn!(key, value = %v, "Unreadable timestamp, using now"),
        }
    }
}

fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|d| d.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                chrono::NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|n| n.and_utc())
            }),
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

/// Fill in fields the server dropped from the locally cached copy.
///
/// The backend has been seen returning sections without their multi-column
/// layout, column contents, column styles or style bags right after a save.
/// Per section id, a server value that is absent, empty or `single` is
/// replaced by the cached one when the cache holds something richer. All
/// other fields come from the server unchanged.
pub fn reconcile_with_cache(server: &Proposal, cached: Option<&Proposal>) -> Proposal {
    let Some(cached) = cached.filter(|c| c.id == server.id) else {
        return server.clone();
    };
    let mut merged = server.clone();
    for section in &mut merged.sections {
        let Some(local) = cached.section(&section.id) else {
            continue;
        };
        let mut restored = Vec::new();
        if matches!(section.layout, None | Some(Layout::Single))
            && local.effective_layout().is_multi_column()
        {
            section.layout = local.layout;
            restored.push("layout");
        }
        if section.column_contents.iter().all(|c| c.trim().is_empty())
            && local.column_contents.iter().any(|c| !c.trim().is_empty())
        {
            section.column_contents = local.column_contents.clone();
            restored.push("columnContents");
        }
        if section.column_styles.iter().all(|s| s.is_empty())
            && local.column_styles.iter().any(|s| !s.is_empty())
        {
            section.column_styles = local.column_styles.clone();
            restored.push("columnStyles");
        }
        if section.title_styles.is_empty() && !local.title_styles.is_empty() {
            section.title_styles = local.title_styles.clone();
            restored.push("titleStyles");
        }
        if section.content_styles.is_empty() && !local.content_styles.is_empty() {
            section.content_styles = local.content_styles.clone();
            restored.push("contentStyles");
        }
        if !restored.is_empty() {
            debug!(section = %section.id, fields = ?restored, "Restored fields from cache");
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutate::{
        add_section, update_section_content, update_section_style, ContentTarget, StyleTarget,
    };
    use crate::style::StyleBag;
    use serde_json::json;

    #[test]
    fn reads_snake_case_flat_row() {
        let p = normalize_proposal(&json!({
            "id": 42,
            "title": "Website",
            "client_name": "ignored",
            "status": "SENT",
            "tax_rate": "8.5",
            "currency": "EUR",
            "line_items": [{ "description": "Design", "quantity": 2, "unit_price": "100" }],
            "is_public": true,
            "share_token": "tok",
            "created_at": "2024-03-01 10:00:00",
            "updated_at": 1709287200000_i64,
            "sections": [{
                "title": "Scope",
                "layout": null,
                "column_contents": ["<p>a</p>", "<p>b</p>"],
                "content_styles": {},
                "shapes": [{ "type": "circle", "top": "10px" }]
            }]
        }))
        .unwrap();
        assert_eq!(p.id, "42");
        assert_eq!(p.status, crate::model::ProposalStatus::Sent);
        assert_eq!(p.pricing.currency, "EUR");
        assert_eq!(p.pricing.tax_rate, 8.5);
        assert_eq!(p.pricing.items[0].price, 100.0);
        assert!(p.settings.sharing.public);
        assert_eq!(p.settings.sharing.token.as_deref(), Some("tok"));
        assert_eq!(p.created_at.to_rfc3339(), "2024-03-01T10:00:00+00:00");
        assert_eq!(p.updated_at.timestamp_millis(), 1709287200000);
        let s = &p.sections[0];
        assert!(!s.id.is_empty());
        assert_eq!(s.effective_layout(), Layout::TwoColumn);
        assert!(s.content_styles.is_empty());
        assert!(!s.shapes[0].id.is_empty());
        assert_eq!(s.shapes[0].top, 10.0);
    }

    #[test]
    fn nested_shape_wins_over_flat() {
        let p = normalize_proposal(&json!({
            "id": "p",
            "pricing": { "currency": "GBP" },
            "currency": "EUR",
            "settings": { "sharing": { "public": false } },
            "isPublic": true
        }))
        .unwrap();
        assert_eq!(p.pricing.currency, "GBP");
        assert!(!p.settings.sharing.public);
    }

    #[test]
    fn unknown_status_and_bad_timestamp_fall_back() {
        let p = normalize_proposal(&json!({
            "id": "p",
            "status": "archived",
            "createdAt": "yesterday",
            "title": null,
            "sections": [null, { "id": 1, "comments": [{ "text": "hi" }] }]
        }))
        .unwrap();
        assert_eq!(p.status, crate::model::ProposalStatus::Draft);
        assert_eq!(p.title, "");
        assert_eq!(p.sections.len(), 1);
        assert_eq!(p.sections[0].id, "1");
        assert_eq!(p.sections[0].comments[0].text, "hi");
    }

    #[test]
    fn jagged_tables_are_squared_on_load() {
        let section = json!({
            "id": "s",
            "column_contents": [null, 3, "<p>c</p>"],
            "tables": [{
                "id": "t",
                "rows": 2,
                "columns": 2,
                "cells": [
                    [{ "id": "a", "content": "A" }, { "id": "b", "content": "B" }],
                    [{ "id": "c", "content": "C" }]
                ]
            }]
        });
        let p = normalize_proposal(&json!({
            "id": "p",
            "sections": [section.clone()],
            "versions": [{ "id": "v", "snapshot": { "sections": [section] } }]
        }))
        .unwrap();
        let table = &p.sections[0].tables[0];
        assert!(table.is_rectangular());
        assert_eq!(table.cells[1][0].content, "C");
        assert_eq!(table.cells[1][1].content, "");
        assert!(p.versions[0].snapshot.sections[0].tables[0].is_rectangular());
        assert_eq!(p.sections[0].column_contents, vec!["", "3", "<p>c</p>"]);
    }

    #[test]
    fn non_object_payload_is_an_error() {
        assert!(normalize_proposal(&json!([1, 2])).is_err());
    }

    #[test]
    fn reconcile_restores_dropped_column_fields() {
        let local = add_section(&Proposal::new("t", "c"), "Cols", Layout::TwoColumn);
        let id = local.sections[0].id.clone();
        let local = update_section_content(&local, &id, ContentTarget::Column(1), "<p>b</p>").unwrap();
        let local = update_section_style(
            &local,
            &id,
            StyleTarget::Column(1),
            &StyleBag { background_color: Some("#ff0000".into()), ..Default::default() },
        )
        .unwrap();

        let mut server = local.clone();
        server.title = "Server title".into();
        server.sections[0].layout = None;
        server.sections[0].column_contents.clear();
        server.sections[0].column_styles.clear();

        let merged = reconcile_with_cache(&server, Some(&local));
        assert_eq!(merged.title, "Server title");
        assert_eq!(merged.sections[0].layout, Some(Layout::TwoColumn));
        assert_eq!(merged.sections[0].column_contents, local.sections[0].column_contents);
        assert_eq!(merged.sections[0].column_styles, local.sections[0].column_styles);

        let unrelated = Proposal::new("other", "c");
        assert_eq!(reconcile_with_cache(&server, Some(&unrelated)), server);
    }
}
