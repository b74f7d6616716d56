//! # Proposal Model
//!
//! The in-memory representation of a proposal document. A proposal is an
//! ordered list of sections; each section carries flowing content (one HTML
//! string, or one per column) plus a free-form canvas of absolutely
//! positioned objects.
//!
//! The shape matches what the persistence API stores, camelCase on the wire.
//! Everything except ids is optional on input: older rows are missing whole
//! subtrees, and [`crate::api::normalize_proposal`] deals with the rest.

pub mod canvas;
pub(crate) mod lenient;

pub use canvas::{
    Bounds, CanvasKind, CanvasObject, ImageObject, ObjectRef, Shape, ShapeType, TableCell,
    TableObject, TextBox, MAX_TABLE_COLUMNS, MAX_TABLE_ROWS,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::style::StyleBag;

/// Generate a fresh locally-unique id.
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Root aggregate: one proposal document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    #[serde(deserialize_with = "lenient::id_string")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub status: ProposalStatus,
    /// Canonical reading order.
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub pricing: Pricing,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub title_styles: StyleBag,
    /// Append-only history.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<Version>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Proposal {
    pub fn new(title: &str, client: &str) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            title: title.to_string(),
            client: client.to_string(),
            status: ProposalStatus::Draft,
            sections: vec![],
            pricing: Pricing::default(),
            settings: Settings::default(),
            title_styles: StyleBag::default(),
            versions: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    pub fn section_index(&self, id: &str) -> Option<usize> {
        self.sections.iter().position(|s| s.id == id)
    }

    /// True when no section id appears twice.
    pub fn has_unique_section_ids(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.sections.iter().all(|s| seen.insert(s.id.as_str()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    #[default]
    Draft,
    Sent,
    Accepted,
    Declined,
}

impl std::str::FromStr for ProposalStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Ok(ProposalStatus::Draft),
            "sent" => Ok(ProposalStatus::Sent),
            "accepted" => Ok(ProposalStatus::Accepted),
            "declined" => Ok(ProposalStatus::Declined),
            _ => Err(()),
        }
    }
}

/// Pricing block rendered after the sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Percent, e.g. `8.5`.
    #[serde(default, alias = "tax_rate", deserialize_with = "lenient::f64_or_zero")]
    pub tax_rate: f64,
    #[serde(default, alias = "lineItems", alias = "line_items")]
    pub items: Vec<LineItem>,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            tax_rate: 0.0,
            items: vec![],
        }
    }
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(default, deserialize_with = "lenient::id_string")]
    pub id: String,
    #[serde(default, alias = "description", alias = "name")]
    pub label: String,
    #[serde(default, alias = "quantity", deserialize_with = "lenient::f64_or_zero")]
    pub qty: f64,
    #[serde(default, alias = "unitPrice", alias = "unit_price", deserialize_with = "lenient::f64_or_zero")]
    pub price: f64,
}

impl LineItem {
    pub fn amount(&self) -> f64 {
        self.qty * self.price
    }
}

/// Derived totals; never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingTotals {
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
}

impl Pricing {
    pub fn totals(&self) -> PricingTotals {
        let subtotal: f64 = self.items.iter().map(LineItem::amount).sum();
        let tax = subtotal * self.tax_rate / 100.0;
        PricingTotals {
            subtotal,
            tax,
            total: subtotal + tax,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub sharing: Sharing,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sharing {
    #[serde(default, alias = "isPublic", alias = "is_public", deserialize_with = "lenient::bool_or_false")]
    pub public: bool,
    #[serde(default, alias = "shareToken", alias = "share_token", deserialize_with = "lenient::opt_string")]
    pub token: Option<String>,
    #[serde(default, alias = "allow_comments", deserialize_with = "lenient::bool_or_false")]
    pub allow_comments: bool,
}

/// An immutable snapshot of a proposal at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: String,
    #[serde(alias = "timestamp", alias = "created_at")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(alias = "data")]
    pub snapshot: Box<Proposal>,
}

/// How a section's flowing content is split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    #[default]
    #[serde(rename = "single")]
    Single,
    #[serde(rename = "two-column")]
    TwoColumn,
    #[serde(rename = "three-column")]
    ThreeColumn,
}

impl Layout {
    pub fn column_count(self) -> usize {
        match self {
            Layout::Single => 1,
            Layout::TwoColumn => 2,
            Layout::ThreeColumn => 3,
        }
    }

    pub fn is_multi_column(self) -> bool {
        self != Layout::Single
    }

    /// Legacy rows carry no layout; the column array length decides.
    pub fn infer_from_columns(columns: usize) -> Self {
        match columns {
            2 => Layout::TwoColumn,
            3 => Layout::ThreeColumn,
            _ => Layout::Single,
        }
    }
}

impl std::str::FromStr for Layout {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Layout::Single),
            "two-column" => Ok(Layout::TwoColumn),
            "three-column" => Ok(Layout::ThreeColumn),
            _ => Err(()),
        }
    }
}

/// One content block of the proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    #[serde(deserialize_with = "lenient::id_string")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// HTML, used when the layout is single.
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "lenient::opt_parse")]
    pub layout: Option<Layout>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub column_contents: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub column_styles: Vec<StyleBag>,
    #[serde(default)]
    pub title_styles: StyleBag,
    #[serde(default)]
    pub content_styles: StyleBag,
    #[serde(default)]
    pub media: Vec<Media>,
    #[serde(default)]
    pub shapes: Vec<Shape>,
    #[serde(default)]
    pub tables: Vec<TableObject>,
    #[serde(default)]
    pub texts: Vec<TextBox>,
    #[serde(default)]
    pub images: Vec<ImageObject>,
    /// Newest first.
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Section {
    pub fn new(title: &str, layout: Layout) -> Self {
        let columns = if layout.is_multi_column() {
            layout.column_count()
        } else {
            0
        };
        Self {
            id: new_id(),
            title: title.to_string(),
            content: String::new(),
            layout: Some(layout),
            column_contents: vec![String::new(); columns],
            column_styles: (0..columns).map(|_| StyleBag::column_default()).collect(),
            title_styles: StyleBag::default(),
            content_styles: StyleBag {
                gap_after: Some(10.0),
                ..Default::default()
            },
            media: vec![],
            shapes: vec![],
            tables: vec![],
            texts: vec![],
            images: vec![],
            comments: vec![],
        }
    }

    /// The layout to render with, applying the legacy inference rule when
    /// no layout was stored.
    pub fn effective_layout(&self) -> Layout {
        match self.layout {
            Some(layout) => layout,
            None => Layout::infer_from_columns(self.column_contents.len()),
        }
    }

    /// Column texts padded or cut to the layout's column count.
    pub fn columns(&self) -> Vec<&str> {
        let layout = self.effective_layout();
        if !layout.is_multi_column() {
            return vec![self.content.as_str()];
        }
        (0..layout.column_count())
            .map(|i| self.column_contents.get(i).map(String::as_str).unwrap_or(""))
            .collect()
    }

    pub fn column_style(&self, index: usize) -> Option<&StyleBag> {
        self.column_styles.get(index)
    }

    /// Every canvas object in paint order: shapes, tables, texts, images.
    pub fn objects(&self) -> impl Iterator<Item = ObjectRef<'_>> {
        self.shapes
            .iter()
            .map(ObjectRef::Shape)
            .chain(self.tables.iter().map(ObjectRef::Table))
            .chain(self.texts.iter().map(ObjectRef::Text))
            .chain(self.images.iter().map(ObjectRef::Image))
    }

    pub fn has_canvas(&self) -> bool {
        self.objects().next().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(deserialize_with = "lenient::id_string")]
    pub id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub text: String,
    #[serde(alias = "created_at", default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Edge values (top, right, bottom, left) used for margin and padding.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Edges {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Edges {
    pub fn is_zero(&self) -> bool {
        self.top == 0.0 && self.right == 0.0 && self.bottom == 0.0 && self.left == 0.0
    }

    /// CSS shorthand in px, clockwise from top.
    pub fn to_css(&self) -> String {
        format!(
            "{}px {}px {}px {}px",
            self.top, self.right, self.bottom, self.left
        )
    }
}

/// Paper the export rasterizer lays pages out on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSize {
    #[default]
    A4,
    Letter,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_section_initializes_columns() {
        let s = Section::new("Scope", Layout::ThreeColumn);
        assert_eq!(s.column_contents.len(), 3);
        assert_eq!(s.column_styles.len(), 3);
        assert_eq!(s.content_styles.gap_after, Some(10.0));

        let single = Section::new("Intro", Layout::Single);
        assert!(single.column_contents.is_empty());
        assert!(single.column_styles.is_empty());
    }

    #[test]
    fn legacy_layout_is_inferred_from_columns() {
        let s: Section = serde_json::from_value(json!({
            "id": "s1",
            "layout": null,
            "columnContents": ["<p>a</p>", "<p>b</p>"]
        }))
        .unwrap();
        assert_eq!(s.layout, None);
        assert_eq!(s.effective_layout(), Layout::TwoColumn);

        let s: Section = serde_json::from_value(json!({
            "id": "s2",
            "columnContents": ["a", "b", "c"]
        }))
        .unwrap();
        assert_eq!(s.effective_layout(), Layout::ThreeColumn);

        let s: Section = serde_json::from_value(json!({ "id": "s3", "layout": "diagonal" })).unwrap();
        assert_eq!(s.effective_layout(), Layout::Single);
    }

    #[test]
    fn columns_are_padded_to_layout() {
        let mut s = Section::new("x", Layout::ThreeColumn);
        s.column_contents = vec!["a".into()];
        assert_eq!(s.columns(), vec!["a", "", ""]);
    }

    #[test]
    fn pricing_totals() {
        let pricing = Pricing {
            currency: "USD".into(),
            tax_rate: 10.0,
            items: vec![
                LineItem { id: "1".into(), label: "Design".into(), qty: 2.0, price: 100.0 },
                LineItem { id: "2".into(), label: "Build".into(), qty: 1.0, price: 300.0 },
            ],
        };
        let t = pricing.totals();
        assert_eq!(t.subtotal, 500.0);
        assert_eq!(t.tax, 50.0);
        assert_eq!(t.total, 550.0);
    }

    #[test]
    fn status_round_trips_lowercase() {
        let v = serde_json::to_value(ProposalStatus::Accepted).unwrap();
        assert_eq!(v, json!("accepted"));
        assert_eq!("Sent".parse::<ProposalStatus>(), Ok(ProposalStatus::Sent));
    }

    #[test]
    fn duplicate_section_ids_detected() {
        let mut p = Proposal::new("t", "c");
        let s = Section::new("a", Layout::Single);
        p.sections = vec![s.clone(), s];
        assert!(!p.has_unique_section_ids());
    }
}
