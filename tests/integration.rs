//! Integration tests for the Quire pipeline.
//!
//! These tests exercise the full path from proposal data to surface markup.
//! They verify:
//! - Column styles win over section content styles
//! - Canvas height follows the lowest object
//! - Share links round-trip to the shared proposal
//! - Variable substitution and entity decoding behave the same everywhere
//! - Modal and public surfaces are byte-identical
//! - Edits flow through the session into the store

use chrono::{DateTime, Utc};
use serde_json::json;

use quire::api::{self, MemoryKv, MemoryProposalStore, ProposalCache, ProposalStore};
use quire::canvas::{compute_canvas_height, place_new_object, CanvasConfig, ObjectPatch};
use quire::model::*;
use quire::mutate::{self, ContentTarget, Mutation, StyleTarget};
use quire::render::{self, SectionBody};
use quire::session::EditSession;
use quire::share;
use quire::style::StyleBag;
use quire::template::{decode_html_entities, prepare_rich_content, substitute_variables};
use quire::{EngineConfig, Selection, Surface, Variable};

// ─── Helpers ────────────────────────────────────────────────────

fn make_proposal(sections: Vec<Section>) -> Proposal {
    let mut p = Proposal::new("Proposal for {{Client}}", "Acme");
    p.sections = sections;
    p
}

fn make_section(title: &str, layout: Layout) -> Section {
    Section::new(title, layout)
}

fn make_shape(top: f64, height: f64) -> Shape {
    Shape {
        id: new_id(),
        shape_type: ShapeType::Square,
        top,
        left: 10.0,
        width: 100.0,
        height,
        style: StyleBag::default(),
    }
}

fn make_text_box(top: f64, height: Option<f64>, content: &str) -> TextBox {
    TextBox {
        id: new_id(),
        top,
        left: 0.0,
        width: 200.0,
        height,
        content: content.to_string(),
        style: StyleBag::default(),
    }
}

fn background(color: &str) -> StyleBag {
    StyleBag {
        background_color: Some(color.to_string()),
        ..Default::default()
    }
}

fn vars() -> Vec<Variable> {
    vec![Variable::new("Client", "Acme"), Variable::new("Name", "Ava")]
}

fn render(p: &Proposal, surface: &Surface) -> String {
    quire::render(p, &vars(), surface, &EngineConfig::default())
}

fn at(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
}

// ─── Style cascade ──────────────────────────────────────────────

#[test]
fn test_column_background_ignores_content_background() {
    let p = make_proposal(vec![make_section("Scope", Layout::TwoColumn)]);
    let id = p.sections[0].id.clone();
    let p = mutate::update_section_style(&p, &id, StyleTarget::Content, &background("#00ff00")).unwrap();
    let p = mutate::update_section_style(&p, &id, StyleTarget::Column(1), &background("#ff0000")).unwrap();

    let doc = render::prepare(&p, &vars(), &CanvasConfig::default());
    let SectionBody::Columns { columns, .. } = &doc.sections[0].body else {
        panic!("expected a two-column body");
    };
    assert_eq!(columns.len(), 2);
    assert_eq!(columns[1].style.background_color, "#ff0000");

    for surface in [Surface::Modal, Surface::Public, Surface::Export] {
        assert!(render(&p, &surface).contains("background-color: #ff0000"));
    }
}

#[test]
fn test_content_style_does_not_leak_into_title() {
    let p = make_proposal(vec![make_section("Intro", Layout::Single)]);
    let id = p.sections[0].id.clone();
    let p = mutate::update_section_style(&p, &id, StyleTarget::Content, &background("#123456")).unwrap();
    let doc = render::prepare(&p, &[], &CanvasConfig::default());
    assert_ne!(doc.sections[0].title_style.background_color, "#123456");
}

// ─── Canvas ─────────────────────────────────────────────────────

#[test]
fn test_canvas_height_follows_lowest_object() {
    let mut section = make_section("Canvas", Layout::Single);
    let config = CanvasConfig::default();
    assert_eq!(compute_canvas_height(&section, &config), 400.0);

    section.shapes.push(make_shape(300.0, 150.0));
    assert_eq!(compute_canvas_height(&section, &config), 470.0);

    section.texts.push(make_text_box(450.0, None, "note"));
    assert_eq!(compute_canvas_height(&section, &config), 570.0);
}

#[test]
fn test_dropped_object_is_clamped_and_movable() {
    let p = make_proposal(vec![make_section("Canvas", Layout::Single)]);
    let id = p.sections[0].id.clone();
    let p = mutate::add_canvas_object(&p, &id, place_new_object(CanvasKind::Shape, -20.0, 50.0)).unwrap();
    assert_eq!(p.sections[0].shapes[0].left, 0.0);
    assert_eq!(p.sections[0].shapes[0].top, 50.0);

    let p = mutate::update_canvas_object(&p, &id, CanvasKind::Shape, 0, &ObjectPatch::move_to(600.0, 30.0)).unwrap();
    let html = render(&p, &Surface::Public);
    assert!(html.contains("top: 600px"));
    assert!(html.contains(&format!("height: {}px", 600 + 100 + 20)));
}

// ─── Content pipeline ───────────────────────────────────────────

#[test]
fn test_substitution_keeps_unknown_placeholders() {
    assert_eq!(substitute_variables("Hello {{Name}}", &vars()), "Hello Ava");
    assert_eq!(substitute_variables("Hello {{Nobody}}", &vars()), "Hello {{Nobody}}");
}

#[test]
fn test_decoding_is_idempotent() {
    let twice = "&amp;lt;p&amp;gt;Tom &amp;amp; Jerry&amp;lt;/p&amp;gt;";
    let once = decode_html_entities(twice);
    assert_eq!(once, "<p>Tom & Jerry</p>");
    assert_eq!(decode_html_entities(&once), once);
}

#[test]
fn test_encoded_markup_renders_as_markup() {
    let content = prepare_rich_content("&lt;p&gt;Hi {{Name}}&lt;/p&gt;", &vars());
    assert_eq!(content.to_markup(), "<p>Hi Ava</p>");

    let plain = prepare_rich_content("line one\nTom & {{Name}}", &vars());
    assert_eq!(plain.to_markup(), "line one<br>Tom &amp; Ava");
}

#[test]
fn test_same_content_on_every_surface() {
    let p = make_proposal(vec![make_section("Intro", Layout::Single)]);
    let id = p.sections[0].id.clone();
    let p = mutate::update_section_content(&p, &id, ContentTarget::Single, "<p>Dear {{Name}}</p><script>x()</script>").unwrap();

    let editor = render(&p, &Surface::Editor(Selection::none()));
    let modal = render(&p, &Surface::Modal);
    let public = render(&p, &Surface::Public);
    let export = render(&p, &Surface::Export);
    assert_eq!(modal, public);
    for html in [&editor, &modal, &export] {
        assert!(html.contains("<p>Dear Ava</p>"));
        assert!(html.contains("Proposal for Acme"));
        assert!(!html.contains("<script"));
    }
}

#[test]
fn test_variable_values_cannot_inject_markup() {
    let p = make_proposal(vec![make_section("Intro", Layout::Single)]);
    let id = p.sections[0].id.clone();
    let p = mutate::update_section_content(&p, &id, ContentTarget::Single, "<p>{{Name}}</p>").unwrap();
    let evil = vec![Variable::new("Name", "<img src=x onerror=alert(1)>")];
    let html = quire::render(&p, &evil, &Surface::Public, &EngineConfig::default());
    assert!(html.contains("&lt;img"));
    assert!(!html.contains("<img src=x"));
}

// ─── Sharing ────────────────────────────────────────────────────

#[test]
fn test_share_link_round_trip() {
    let p = make_proposal(vec![make_section("Intro", Layout::Single)]);
    let shared = Mutation::SetSharing {
        public: true,
        allow_comments: Some(true),
    }
    .apply(&p)
    .unwrap();
    let token = shared.settings.sharing.token.clone().unwrap();

    let url = share::share_url("https://proposals.test", &token);
    let parsed = share::parse_share_path(&url).unwrap();
    assert_eq!(parsed, token);

    let all = vec![Proposal::new("other", "x"), shared.clone()];
    let found = share::get_proposal_by_token(&all, &parsed).unwrap();
    assert_eq!(found.id, shared.id);

    let html = render::render_public(&all, &parsed, &vars(), &CanvasConfig::default()).unwrap();
    assert_eq!(html, render(&shared, &Surface::Public));
}

#[test]
fn test_private_proposal_has_no_public_page() {
    let shared = share::enable_sharing(&make_proposal(vec![]), true);
    let token = shared.settings.sharing.token.clone().unwrap();
    let private = share::enable_sharing(&shared, false);
    assert_eq!(private.settings.sharing.token.as_deref(), Some(token.as_str()));
    assert!(render::render_public(&[private], &token, &[], &CanvasConfig::default()).is_none());
}

// ─── JSON entry points ──────────────────────────────────────────

#[test]
fn test_render_json_accepts_snake_case_rows() {
    let row = json!({
        "id": 7,
        "title": "Hello {{Name}}",
        "client": { "name": "Acme" },
        "status": "Accepted",
        "sections": [{
            "id": "s1",
            "title": "Scope",
            "column_contents": ["<p>left</p>", "<p>right</p>"],
            "column_styles": [{}, { "background_color": "#ff0000" }],
            "content_styles": { "background_color": "#00ff00" }
        }]
    });
    let html = quire::render_json(&row.to_string(), &vars(), &Surface::Public, &EngineConfig::default()).unwrap();
    assert!(html.contains("Hello Ava"));
    assert!(html.contains("<p>left</p>"));
    assert!(html.contains("background-color: #ff0000"));
}

#[test]
fn test_render_json_squares_jagged_tables() {
    let row = json!({
        "id": "p",
        "sections": [{
            "id": "s1",
            "tables": [{
                "id": "t",
                "rows": 2,
                "columns": 2,
                "cells": [
                    [{ "id": "a", "content": "A" }, { "id": "b", "content": "B" }],
                    [{ "id": "c", "content": "C" }]
                ]
            }]
        }]
    });
    let html = quire::render_json(&row.to_string(), &[], &Surface::Public, &EngineConfig::default()).unwrap();
    assert_eq!(html.matches("<td style=").count(), 4);
}

#[test]
fn test_raw_text_elements_cannot_smuggle_markup() {
    let p = make_proposal(vec![make_section("Intro", Layout::Single)]);
    let id = p.sections[0].id.clone();
    let dirty = r#"<p>Hi</p><noembed><img title="</noembed><img src=x onerror=alert(1)>"></noembed><svg><a><animate attributeName="href" values="javascript:alert(1)"/></a></svg>"#;
    let p = mutate::update_section_content(&p, &id, ContentTarget::Single, dirty).unwrap();
    let html = render(&p, &Surface::Public);
    assert!(html.contains("<p>Hi</p>"));
    assert!(!html.contains("onerror"));
    assert!(!html.contains("javascript:"));
}

#[test]
fn test_render_json_reports_bad_json() {
    let err = quire::render_json("{\"id\": ", &[], &Surface::Public, &EngineConfig::default()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse document"));
}

#[test]
fn test_export_snapshot_layers_background_images() {
    let p = make_proposal(vec![make_section("Cover", Layout::Single)]);
    let id = p.sections[0].id.clone();
    let p = mutate::update_section_style(
        &p,
        &id,
        StyleTarget::Content,
        &StyleBag {
            background_image: Some("https://cdn.test/cover.png".into()),
            background_opacity: Some(50.0),
            ..Default::default()
        },
    )
    .unwrap();

    let snapshot = quire::export_json(&serde_json::to_string(&p).unwrap(), &vars(), &EngineConfig::default()).unwrap();
    assert!(snapshot.html.contains("<img class=\"background-image\""));
    assert!(!snapshot.html.contains("background-image: url("));
    assert!(snapshot.html.contains("background-overlay"));
    assert_eq!(snapshot.options.scale, 2.0);
}

// ─── Editing session ────────────────────────────────────────────

#[test]
fn test_session_edits_reach_store_after_quiet_period() {
    let mut store = MemoryProposalStore::new();
    let mut cache = ProposalCache::new(MemoryKv::new());
    let mut session = EditSession::new(make_proposal(vec![]), EngineConfig::default().autosave());

    session
        .apply(
            &Mutation::AddSection {
                title: "Scope".into(),
                layout: Layout::ThreeColumn,
            },
            at(0),
        )
        .unwrap();
    let id = session.proposal.sections[0].id.clone();
    session
        .apply(
            &Mutation::SetLayout {
                section_id: id.clone(),
                layout: Layout::TwoColumn,
            },
            at(100),
        )
        .unwrap();
    assert!(session.flush(&mut store, &mut cache, at(300)).is_none());
    assert!(store.list().unwrap().is_empty());

    assert!(session.flush(&mut store, &mut cache, at(600)).is_none());
    let saved = store.get(&session.proposal.id).unwrap();
    assert_eq!(saved.sections[0].effective_layout(), Layout::TwoColumn);
    assert_eq!(saved.sections[0].column_contents.len(), 2);

    let loaded = api::load_proposals(&store, &mut cache).unwrap();
    assert_eq!(loaded.proposals.len(), 1);
    assert!(!loaded.from_cache);
}
