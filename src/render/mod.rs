//! # Multi-Surface Rendering
//!
//! A proposal is shown on four surfaces: the editor preview, the read-only
//! modal, the public shared page and the export snapshot handed to a PDF
//! rasterizer. They all consume one [`RenderDocument`] built by [`prepare`],
//! so style math and content preparation happen exactly once:
//!
//! ```text
//!   Proposal + variables
//!        │  prepare()      resolve styles, substitute + sanitize content,
//!        ▼                 canvas heights and object boxes, pricing totals
//!   RenderDocument
//!        │  render_html(surface)
//!        ▼
//!   Editor  = shared markup + selection affordances + AI-assist buttons
//!   Modal   = shared markup
//!   Public  = shared markup
//!   Export  = shared markup with CSS background images as <img> layers
//! ```

mod html;

pub use html::render_html;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::canvas::{compute_canvas_height, CanvasConfig};
use crate::model::{
    Bounds, CanvasKind, Layout, MediaKind, ObjectRef, PageSize, Proposal, Section, ShapeType,
};
use crate::share;
use crate::style::{resolve_style, ElementKind, ResolvedStyle, StyleBag};
use crate::template::{
    escape_text, is_unsafe_url, prepare_rich_content, substitute_variables, Variable,
};

/// What the interactive preview has selected. Local to the editor; never
/// persisted and never consulted by style resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub element_id: Option<String>,
    pub element_type: Option<ElementKind>,
}

impl Selection {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn of(element_type: ElementKind, element_id: &str) -> Self {
        Self {
            element_id: Some(element_id.to_string()),
            element_type: Some(element_type),
        }
    }

    pub fn is_selected(&self, element_type: ElementKind, element_id: &str) -> bool {
        self.element_type == Some(element_type) && self.element_id.as_deref() == Some(element_id)
    }
}

/// The four render targets.
#[derive(Debug, Clone, PartialEq)]
pub enum Surface {
    Editor(Selection),
    Modal,
    Public,
    Export,
}

impl Surface {
    pub fn is_editor(&self) -> bool {
        matches!(self, Surface::Editor(_))
    }

    pub fn selection(&self) -> Option<&Selection> {
        match self {
            Surface::Editor(selection) => Some(selection),
            _ => None,
        }
    }
}

/// Everything a surface needs, with nothing left to resolve.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderDocument {
    pub proposal_id: String,
    /// Escaped, substituted.
    pub title: String,
    pub title_style: ResolvedStyle,
    pub client: String,
    pub sections: Vec<RenderSection>,
    pub pricing: Option<RenderPricing>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderSection {
    pub id: String,
    /// Escaped, substituted.
    pub title: String,
    pub title_style: ResolvedStyle,
    pub layout: Layout,
    pub body: SectionBody,
    pub media: Vec<RenderMedia>,
    pub canvas: Option<RenderCanvas>,
    /// Space below the section.
    pub gap_after: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SectionBody {
    Single {
        style: ResolvedStyle,
        markup: String,
    },
    Columns {
        gap: f64,
        columns: Vec<RenderColumn>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderColumn {
    /// Selection id, `{section}:{index}`.
    pub id: String,
    pub index: usize,
    pub style: ResolvedStyle,
    pub markup: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderMedia {
    pub kind: MediaKind,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderCanvas {
    pub height: f64,
    pub objects: Vec<RenderObject>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderObject {
    pub id: String,
    pub kind: CanvasKind,
    pub bounds: Bounds,
    pub style: ResolvedStyle,
    pub body: ObjectBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectBody {
    Shape(ShapeType),
    /// Cell markup, row-major.
    Table(Vec<Vec<String>>),
    Text(String),
    Image { url: String, opacity: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPricing {
    pub currency: String,
    pub tax_rate: f64,
    pub items: Vec<RenderLineItem>,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderLineItem {
    /// Escaped, substituted.
    pub label: String,
    pub qty: f64,
    pub price: f64,
    pub amount: f64,
}

/// Column selection id.
pub fn column_id(section_id: &str, index: usize) -> String {
    format!("{}:{}", section_id, index)
}

fn text_field(raw: &str, variables: &[Variable]) -> String {
    escape_text(&substitute_variables(raw, variables))
}

fn rich_field(raw: &str, variables: &[Variable]) -> String {
    prepare_rich_content(raw, variables).to_markup()
}

fn safe_url(url: &str) -> Option<String> {
    let url = url.trim();
    (!url.is_empty() && !is_unsafe_url(url)).then(|| url.to_string())
}

/// Build the shared render data for a proposal.
#[instrument(skip_all, fields(proposal = %proposal.id))]
pub fn prepare(proposal: &Proposal, variables: &[Variable], config: &CanvasConfig) -> RenderDocument {
    let sections = proposal
        .sections
        .iter()
        .map(|s| prepare_section(s, variables, config))
        .collect();

    let pricing = (!proposal.pricing.items.is_empty()).then(|| {
        let totals = proposal.pricing.totals();
        RenderPricing {
            currency: escape_text(&proposal.pricing.currency),
            tax_rate: proposal.pricing.tax_rate,
            items: proposal
                .pricing
                .items
                .iter()
                .map(|i| RenderLineItem {
                    label: text_field(&i.label, variables),
                    qty: i.qty,
                    price: i.price,
                    amount: i.amount(),
                })
                .collect(),
            subtotal: totals.subtotal,
            tax: totals.tax,
            total: totals.total,
        }
    });

    RenderDocument {
        proposal_id: proposal.id.clone(),
        title: text_field(&proposal.title, variables),
        title_style: resolve_style(ElementKind::DocumentTitle, &proposal.title_styles, None, None),
        client: text_field(&proposal.client, variables),
        sections,
        pricing,
    }
}

fn prepare_section(section: &Section, variables: &[Variable], config: &CanvasConfig) -> RenderSection {
    let layout = section.effective_layout();
    let content_style = resolve_style(ElementKind::SectionContent, &section.content_styles, None, None);

    let body = if layout.is_multi_column() {
        let columns = section
            .columns()
            .into_iter()
            .enumerate()
            .map(|(index, raw)| RenderColumn {
                id: column_id(&section.id, index),
                index,
                style: resolve_style(
                    ElementKind::Column(index),
                    &section.content_styles,
                    section.column_style(index),
                    None,
                ),
                markup: rich_field(raw, variables),
            })
            .collect();
        SectionBody::Columns {
            gap: content_style.column_gap,
            columns,
        }
    } else {
        SectionBody::Single {
            markup: rich_field(&section.content, variables),
            style: content_style.clone(),
        }
    };

    let media = section
        .media
        .iter()
        .filter_map(|m| {
            safe_url(&m.url).map(|url| RenderMedia { kind: m.kind, url })
        })
        .collect();

    let canvas = section.has_canvas().then(|| RenderCanvas {
        height: compute_canvas_height(section, config),
        objects: section
            .objects()
            .map(|o| prepare_object(o, variables))
            .collect(),
    });

    RenderSection {
        id: section.id.clone(),
        title: text_field(&section.title, variables),
        title_style: resolve_style(ElementKind::SectionTitle, &section.title_styles, None, None),
        layout,
        body,
        media,
        canvas,
        gap_after: content_style.gap_after,
    }
}

fn prepare_object(object: ObjectRef<'_>, variables: &[Variable]) -> RenderObject {
    let kind = object.kind();
    let element = match kind {
        CanvasKind::Shape => ElementKind::Shape,
        CanvasKind::Table => ElementKind::Table,
        CanvasKind::Text => ElementKind::Text,
        CanvasKind::Image => ElementKind::Image,
    };
    let body = match object {
        ObjectRef::Shape(s) => ObjectBody::Shape(s.shape_type),
        ObjectRef::Table(t) => ObjectBody::Table(
            t.cells
                .iter()
                .map(|row| row.iter().map(|c| rich_field(&c.content, variables)).collect())
                .collect(),
        ),
        ObjectRef::Text(t) => ObjectBody::Text(rich_field(&t.content, variables)),
        ObjectRef::Image(i) => ObjectBody::Image {
            url: safe_url(&i.url).unwrap_or_default(),
            opacity: i.opacity,
        },
    };
    RenderObject {
        id: object.id().to_string(),
        kind,
        bounds: object.bounds(),
        style: resolve_style(element, &StyleBag::default(), None, Some(object.style())),
        body,
    }
}

/// Handoff parameters for the external rasterizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportOptions {
    pub page: PageSize,
    pub scale: f64,
    pub margin_mm: f64,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            page: PageSize::A4,
            scale: 2.0,
            margin_mm: 10.0,
        }
    }
}

/// Resolved markup plus the page setup to rasterize it with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSnapshot {
    pub html: String,
    pub options: ExportOptions,
}

/// Prepare the export handoff for a proposal.
#[instrument(skip_all, fields(proposal = %proposal.id))]
pub fn export_snapshot(
    proposal: &Proposal,
    variables: &[Variable],
    config: &CanvasConfig,
    options: ExportOptions,
) -> ExportSnapshot {
    let doc = prepare(proposal, variables, config);
    ExportSnapshot {
        html: render_html(&doc, &Surface::Export),
        options,
    }
}

/// Render the public page for a share token. `None` when no proposal is
/// shared under that token.
pub fn render_public(
    proposals: &[Proposal],
    token: &str,
    variables: &[Variable],
    config: &CanvasConfig,
) -> Option<String> {
    let Some(proposal) = share::get_proposal_by_token(proposals, token) else {
        tracing::debug!("No public proposal for share token");
        return None;
    };
    let doc = prepare(proposal, variables, config);
    Some(render_html(&doc, &Surface::Public))
}
