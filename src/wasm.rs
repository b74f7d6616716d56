use wasm_bindgen::prelude::*;

use crate::model::Proposal;
use crate::mutate::Mutation;
use crate::render::{Selection, Surface};
use crate::style::ElementKind;
use crate::template::Variable;
use crate::{api, share, EngineConfig};

fn js_error(e: impl std::fmt::Display) -> JsValue {
    js_sys::Error::new(&e.to_string()).into()
}

fn variables(vars: JsValue) -> Result<Vec<Variable>, JsValue> {
    if vars.is_undefined() || vars.is_null() {
        return Ok(vec![]);
    }
    serde_wasm_bindgen::from_value(vars).map_err(js_error)
}

fn selectable(kind: &str) -> Option<ElementKind> {
    match kind {
        "title" => Some(ElementKind::DocumentTitle),
        "section-title" => Some(ElementKind::SectionTitle),
        "section-content" => Some(ElementKind::SectionContent),
        "text" => Some(ElementKind::Text),
        "shape" => Some(ElementKind::Shape),
        "table" => Some(ElementKind::Table),
        "image" => Some(ElementKind::Image),
        _ => kind
            .strip_prefix("column-")
            .and_then(|n| n.parse().ok())
            .map(ElementKind::Column),
    }
}

/// Render a proposal JSON for `surface` ("editor", "modal", "public" or "export").
#[wasm_bindgen]
pub fn render_proposal(
    json: &str,
    surface: &str,
    vars: JsValue,
    selected_id: Option<String>,
    selected_type: Option<String>,
) -> Result<String, JsValue> {
    let surface = match surface {
        "editor" => Surface::Editor(Selection {
            element_id: selected_id,
            element_type: selected_type.as_deref().and_then(selectable),
        }),
        "modal" => Surface::Modal,
        "public" => Surface::Public,
        "export" => Surface::Export,
        other => return Err(js_error(format!("Unknown surface: {}", other))),
    };
    crate::render_json(json, &variables(vars)?, &surface, &EngineConfig::default()).map_err(js_error)
}

/// Prepare the export handoff: `{ html, options }`.
#[wasm_bindgen]
pub fn export_snapshot(json: &str, vars: JsValue) -> Result<JsValue, JsValue> {
    let snapshot = crate::export_json(json, &variables(vars)?, &EngineConfig::default())
        .map_err(js_error)?;
    serde_wasm_bindgen::to_value(&snapshot).map_err(js_error)
}

/// Apply one serialized mutation and return the next proposal JSON.
#[wasm_bindgen]
pub fn apply_mutation(proposal_json: &str, mutation_json: &str) -> Result<String, JsValue> {
    let raw: serde_json::Value = serde_json::from_str(proposal_json).map_err(js_error)?;
    let proposal: Proposal = api::normalize_proposal(&raw).map_err(js_error)?;
    let mutation: Mutation = serde_json::from_str(mutation_json).map_err(js_error)?;
    let next = mutation.apply(&proposal).map_err(js_error)?;
    serde_json::to_string(&next).map_err(js_error)
}

#[wasm_bindgen]
pub fn share_qr_svg(url: &str) -> Result<String, JsValue> {
    share::share_qr_svg(url).map_err(js_error)
}
