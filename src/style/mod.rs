//! # Style Resolution
//!
//! Every renderable element carries a sparse [`StyleBag`]. Absent keys mean
//! "use the default for this kind of element", never zero. Resolution walks
//! the bags from least to most specific:
//!
//! ```text
//!   kind default  <  section bag  <  column bag  <  element bag
//! ```
//!
//! and produces a [`ResolvedStyle`] in which every value is concrete. The
//! resolved record is the only thing the renderer reads, so every surface
//! (editor, modal, public view, export) paints the same pixels.

use serde::{Deserialize, Serialize};

use crate::model::lenient;
use crate::model::Edges;

/// Which side(s) receive the border.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorderSide {
    #[default]
    All,
    Top,
    Right,
    Bottom,
    Left,
}

impl BorderSide {
    fn property(self) -> &'static str {
        match self {
            BorderSide::All => "border",
            BorderSide::Top => "border-top",
            BorderSide::Right => "border-right",
            BorderSide::Bottom => "border-bottom",
            BorderSide::Left => "border-left",
        }
    }
}

impl std::str::FromStr for BorderSide {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(BorderSide::All),
            "top" => Ok(BorderSide::Top),
            "right" => Ok(BorderSide::Right),
            "bottom" => Ok(BorderSide::Bottom),
            "left" => Ok(BorderSide::Left),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

impl TextAlign {
    pub fn as_css(self) -> &'static str {
        match self {
            TextAlign::Left => "left",
            TextAlign::Center => "center",
            TextAlign::Right => "right",
            TextAlign::Justify => "justify",
        }
    }
}

impl std::str::FromStr for TextAlign {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" | "start" => Ok(TextAlign::Left),
            "center" => Ok(TextAlign::Center),
            "right" | "end" => Ok(TextAlign::Right),
            "justify" => Ok(TextAlign::Justify),
            _ => Err(()),
        }
    }
}

/// A sparse set of style properties. `None` means inherit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleBag {
    // ── Typography ─────────────────────────────────────────────
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_parse", skip_serializing_if = "Option::is_none")]
    pub text_align: Option<TextAlign>,
    #[serde(default, deserialize_with = "lenient::opt_bool", skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_bool", skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_bool", skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_bool", skip_serializing_if = "Option::is_none")]
    pub strikethrough: Option<bool>,

    // ── Background ─────────────────────────────────────────────
    #[serde(default, alias = "fill", deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub background_size: Option<String>,
    /// 0–100; 100 shows the image untouched.
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub background_opacity: Option<f64>,

    // ── Border ─────────────────────────────────────────────────
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub border_color: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub border_width: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub border_radius: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_parse", skip_serializing_if = "Option::is_none")]
    pub border_style: Option<BorderSide>,

    // ── Box ────────────────────────────────────────────────────
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub padding_top: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub padding_right: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub padding_bottom: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub padding_left: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub margin_top: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub margin_right: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub margin_bottom: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub margin_left: Option<f64>,

    // ── Section flow ───────────────────────────────────────────
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub column_gap: Option<f64>,
    /// Space below the section.
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub gap_after: Option<f64>,
}

macro_rules! overlay {
    ($base:expr, $over:expr; $($field:ident),* $(,)?) => {
        StyleBag {
            $($field: $over.$field.clone().or_else(|| $base.$field.clone()),)*
        }
    };
}

impl StyleBag {
    /// The bag every new column starts with.
    pub fn column_default() -> Self {
        StyleBag {
            margin_top: Some(0.0),
            margin_right: Some(0.0),
            margin_bottom: Some(0.0),
            margin_left: Some(0.0),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == StyleBag::default()
    }

    /// Overlay `over` onto `self`: keys present in `over` win.
    pub fn cascade(&self, over: &StyleBag) -> StyleBag {
        overlay!(self, over;
            color, font_size, text_align, bold, italic, underline, strikethrough,
            background_color, background_image, background_size, background_opacity,
            border_color, border_width, border_radius, border_style,
            padding_top, padding_right, padding_bottom, padding_left,
            margin_top, margin_right, margin_bottom, margin_left,
            column_gap, gap_after,
        )
    }

    /// Resolve this bag alone against the defaults for `kind`.
    pub fn resolve(&self, kind: ElementKind) -> ResolvedStyle {
        ResolvedStyle::from_bag(kind, self)
    }
}

/// The kinds of renderable element, each with its own defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    DocumentTitle,
    SectionTitle,
    SectionContent,
    /// Flowing content of column `n` in a multi-column section.
    Column(usize),
    /// Canvas text box.
    Text,
    Shape,
    Table,
    Image,
}

impl ElementKind {
    pub fn name(self) -> &'static str {
        match self {
            ElementKind::DocumentTitle => "title",
            ElementKind::SectionTitle => "section-title",
            ElementKind::SectionContent => "section-content",
            ElementKind::Column(_) => "column",
            ElementKind::Text => "text",
            ElementKind::Shape => "shape",
            ElementKind::Table => "table",
            ElementKind::Image => "image",
        }
    }

    pub fn defaults(self) -> KindDefaults {
        let base = KindDefaults {
            font_size: 16.0,
            color: "inherit",
            background_color: "transparent",
            bold: false,
            border_width: 0.0,
            border_color: "#000000",
        };
        match self {
            ElementKind::DocumentTitle => KindDefaults {
                font_size: 32.0,
                bold: true,
                ..base
            },
            ElementKind::SectionTitle => KindDefaults {
                font_size: 24.0,
                bold: true,
                ..base
            },
            ElementKind::SectionContent | ElementKind::Column(_) => base,
            ElementKind::Text | ElementKind::Image => KindDefaults {
                color: "#000000",
                ..base
            },
            ElementKind::Shape => KindDefaults {
                color: "#000000",
                background_color: "#e5e7eb",
                ..base
            },
            ElementKind::Table => KindDefaults {
                font_size: 14.0,
                color: "#000000",
                border_width: 1.0,
                border_color: "#d1d5db",
                ..base
            },
        }
    }
}

/// Built-in values used when no bag supplies a key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KindDefaults {
    pub font_size: f64,
    pub color: &'static str,
    pub background_color: &'static str,
    pub bold: bool,
    pub border_width: f64,
    pub border_color: &'static str,
}

pub const DEFAULT_GAP_AFTER: f64 = 10.0;
pub const DEFAULT_COLUMN_GAP: f64 = 20.0;

/// Resolved border. Drawn only when `width > 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Border {
    pub width: f64,
    pub color: String,
    pub radius: f64,
    pub side: BorderSide,
}

impl Border {
    pub fn is_visible(&self) -> bool {
        self.width > 0.0
    }

    /// CSS declarations for the border. A single side yields only that
    /// edge; the other three stay at zero.
    pub fn declarations(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        if self.is_visible() {
            out.push((
                self.side.property(),
                format!("{}px solid {}", self.width, self.color),
            ));
        }
        if self.radius > 0.0 {
            out.push(("border-radius", format!("{}px", self.radius)));
        }
        out
    }
}

/// Resolved background image with its white wash-out layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Background {
    pub image: String,
    pub size: String,
    /// `(100 - opacity) / 100`. Zero means no overlay layer at all.
    pub overlay_alpha: f64,
}

impl Background {
    pub fn has_overlay(&self) -> bool {
        self.overlay_alpha > 0.0
    }

    pub fn overlay_color(&self) -> String {
        format!("rgba(255, 255, 255, {})", self.overlay_alpha)
    }
}

/// Fully resolved style: nothing left to look up.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStyle {
    pub color: String,
    pub font_size: f64,
    pub text_align: TextAlign,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub background_color: String,
    pub background: Option<Background>,
    pub border: Border,
    pub padding: Edges,
    pub margin: Edges,
    pub column_gap: f64,
    pub gap_after: f64,
}

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|v| v.is_finite())
}

fn non_negative(v: Option<f64>) -> f64 {
    finite(v).map(|v| v.max(0.0)).unwrap_or(0.0)
}

/// Resolve one element's style.
///
/// Precedence, highest first: `element`, `column`, `section`, then the
/// built-in defaults for `kind`.
pub fn resolve_style(
    kind: ElementKind,
    section: &StyleBag,
    column: Option<&StyleBag>,
    element: Option<&StyleBag>,
) -> ResolvedStyle {
    let mut bag = section.clone();
    if let Some(column) = column {
        bag = bag.cascade(column);
    }
    if let Some(element) = element {
        bag = bag.cascade(element);
    }
    ResolvedStyle::from_bag(kind, &bag)
}

impl ResolvedStyle {
    fn from_bag(kind: ElementKind, bag: &StyleBag) -> Self {
        let d = kind.defaults();

        let background = bag.background_image.as_ref().map(|image| {
            let opacity = finite(bag.background_opacity)
                .unwrap_or(100.0)
                .clamp(0.0, 100.0);
            Background {
                image: image.clone(),
                size: bag
                    .background_size
                    .clone()
                    .unwrap_or_else(|| "cover".to_string()),
                overlay_alpha: (100.0 - opacity) / 100.0,
            }
        });

        ResolvedStyle {
            color: bag.color.clone().unwrap_or_else(|| d.color.to_string()),
            font_size: finite(bag.font_size)
                .filter(|v| *v > 0.0)
                .unwrap_or(d.font_size),
            text_align: bag.text_align.unwrap_or_default(),
            bold: bag.bold.unwrap_or(d.bold),
            italic: bag.italic.unwrap_or(false),
            underline: bag.underline.unwrap_or(false),
            strikethrough: bag.strikethrough.unwrap_or(false),
            background_color: bag
                .background_color
                .clone()
                .unwrap_or_else(|| d.background_color.to_string()),
            background,
            border: Border {
                width: finite(bag.border_width)
                    .map(|v| v.max(0.0))
                    .unwrap_or(d.border_width),
                color: bag
                    .border_color
                    .clone()
                    .unwrap_or_else(|| d.border_color.to_string()),
                radius: non_negative(bag.border_radius),
                side: bag.border_style.unwrap_or_default(),
            },
            padding: Edges {
                top: non_negative(bag.padding_top),
                right: non_negative(bag.padding_right),
                bottom: non_negative(bag.padding_bottom),
                left: non_negative(bag.padding_left),
            },
            margin: Edges {
                top: finite(bag.margin_top).unwrap_or(0.0),
                right: finite(bag.margin_right).unwrap_or(0.0),
                bottom: finite(bag.margin_bottom).unwrap_or(0.0),
                left: finite(bag.margin_left).unwrap_or(0.0),
            },
            column_gap: finite(bag.column_gap)
                .map(|v| v.max(0.0))
                .unwrap_or(DEFAULT_COLUMN_GAP),
            gap_after: finite(bag.gap_after)
                .map(|v| v.max(0.0))
                .unwrap_or(DEFAULT_GAP_AFTER),
        }
    }

    /// Ordered CSS declarations for the element box. `column_gap` and
    /// `gap_after` are layout values the renderer places itself.
    pub fn to_css(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![
            ("color", self.color.clone()),
            ("font-size", format!("{}px", self.font_size)),
            ("text-align", self.text_align.as_css().to_string()),
            (
                "font-weight",
                if self.bold { "bold" } else { "normal" }.to_string(),
            ),
        ];
        if self.italic {
            out.push(("font-style", "italic".to_string()));
        }
        let decorations: Vec<&str> = [
            (self.underline, "underline"),
            (self.strikethrough, "line-through"),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, d)| *d)
        .collect();
        if !decorations.is_empty() {
            out.push(("text-decoration", decorations.join(" ")));
        }
        out.push(("background-color", self.background_color.clone()));
        out.extend(self.border.declarations());
        if !self.padding.is_zero() {
            out.push(("padding", self.padding.to_css()));
        }
        if !self.margin.is_zero() {
            out.push(("margin", self.margin.to_css()));
        }
        out
    }

    /// Declarations joined into an inline `style` attribute value.
    pub fn css_string(&self) -> String {
        join_css(&self.to_css())
    }
}

pub fn join_css(decls: &[(&'static str, String)]) -> String {
    decls
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>()
        .join("; ")
}
