//! # Quire
//!
//! A proposal-document composition engine.
//!
//! A proposal is an ordered list of sections. Each section holds flowing
//! rich text (one column or several) and a free-form canvas of shapes,
//! tables, text boxes and images. The same proposal is shown on four
//! surfaces (the editor, a review modal, a public share page and a PDF
//! export) and they must agree pixel for pixel on everything but the
//! editing affordances.
//!
//! Quire keeps them in agreement by construction: one style cascade, one
//! content pipeline and one HTML writer, parameterized by surface.
//!
//! ## Architecture
//!
//! ```text
//! Input (API rows / cache / JSON)
//!       ↓
//!   [api]       — Tolerant normalization, cache merge, stores, validation
//!       ↓
//!   [model]     — Proposal, sections, canvas objects
//!       ↓
//!   [mutate]    — Pure edits: Proposal → Proposal   ← [session] debounced autosave
//!       ↓                                              ← [richtext] structured text edits
//!   [style]     — Kind default < section < column < element
//!   [template]  — {{Variable}} substitution, entity decoding, sanitizing
//!   [canvas]    — Canvas height and object geometry
//!       ↓
//!   [render]    — RenderDocument → HTML for Editor / Modal / Public / Export
//! ```

pub mod api;
pub mod canvas;
pub mod config;
pub mod error;
pub mod model;
pub mod mutate;
pub mod render;
pub mod richtext;
pub mod session;
pub mod share;
pub mod style;
pub mod template;

#[cfg(feature = "wasm")]
pub mod wasm;

pub use config::EngineConfig;
pub use error::QuireError;
pub use model::Proposal;
pub use render::{ExportSnapshot, Selection, Surface};
pub use template::Variable;

/// Render a proposal for one surface.
///
/// This is the primary entry point: preparation and writing in one call.
pub fn render(
    proposal: &Proposal,
    variables: &[Variable],
    surface: &Surface,
    config: &EngineConfig,
) -> String {
    let doc = render::prepare(proposal, variables, &config.canvas);
    render::render_html(&doc, surface)
}

/// Render a proposal given as JSON (any shape the API has produced).
pub fn render_json(
    json: &str,
    variables: &[Variable],
    surface: &Surface,
    config: &EngineConfig,
) -> Result<String, QuireError> {
    let raw: serde_json::Value = serde_json::from_str(json)?;
    let proposal = api::normalize_proposal(&raw)?;
    Ok(render(&proposal, variables, surface, config))
}

/// Prepare the PDF export handoff for a proposal given as JSON.
pub fn export_json(
    json: &str,
    variables: &[Variable],
    config: &EngineConfig,
) -> Result<ExportSnapshot, QuireError> {
    let raw: serde_json::Value = serde_json::from_str(json)?;
    let proposal = api::normalize_proposal(&raw)?;
    Ok(render::export_snapshot(
        &proposal,
        variables,
        &config.canvas,
        config.export,
    ))
}
