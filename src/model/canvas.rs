//! Free-position canvas objects.
//!
//! Each section owns four independent arrays (shapes, tables, texts,
//! images). Objects are placed by absolute `top`/`left` in pixels from the
//! section canvas origin. Visual styling is a flattened [`StyleBag`] so an
//! object's JSON reads `{ "id", "top", "left", ..., "borderColor", ... }`.

use serde::{Deserialize, Deserializer, Serialize};

use super::lenient;
use crate::style::StyleBag;

/// Which canvas array an object lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanvasKind {
    Shape,
    Table,
    Text,
    Image,
}

impl CanvasKind {
    pub fn name(self) -> &'static str {
        match self {
            CanvasKind::Shape => "shape",
            CanvasKind::Table => "table",
            CanvasKind::Text => "text",
            CanvasKind::Image => "image",
        }
    }
}

impl std::str::FromStr for CanvasKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shape" => Ok(CanvasKind::Shape),
            "table" => Ok(CanvasKind::Table),
            "text" => Ok(CanvasKind::Text),
            "image" => Ok(CanvasKind::Image),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeType {
    #[default]
    Square,
    Circle,
    Triangle,
}

impl std::str::FromStr for ShapeType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "square" | "rectangle" => Ok(ShapeType::Square),
            "circle" => Ok(ShapeType::Circle),
            "triangle" => Ok(ShapeType::Triangle),
            _ => Err(()),
        }
    }
}

fn shape_type_or_square<'de, D: Deserializer<'de>>(d: D) -> Result<ShapeType, D::Error> {
    Ok(lenient::opt_parse(d)?.unwrap_or_default())
}

fn opacity_or_full<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(lenient::opt_f64(d)?.unwrap_or(100.0).clamp(0.0, 100.0))
}

fn full_opacity() -> f64 {
    100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shape {
    #[serde(deserialize_with = "lenient::id_string")]
    pub id: String,
    #[serde(rename = "type", default, deserialize_with = "shape_type_or_square")]
    pub shape_type: ShapeType,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub top: f64,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub left: f64,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub width: f64,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub height: f64,
    #[serde(flatten)]
    pub style: StyleBag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    #[serde(default, deserialize_with = "lenient::id_string")]
    pub id: String,
    #[serde(default)]
    pub content: String,
}

impl TableCell {
    pub fn empty() -> Self {
        Self {
            id: super::new_id(),
            content: String::new(),
        }
    }
}

/// Largest grid a table may have, per dimension.
pub const MAX_TABLE_ROWS: usize = 200;
pub const MAX_TABLE_COLUMNS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableObject {
    #[serde(deserialize_with = "lenient::id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub top: f64,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub left: f64,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub width: f64,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub height: f64,
    #[serde(default, deserialize_with = "lenient::usize_or_zero")]
    pub rows: usize,
    #[serde(default, deserialize_with = "lenient::usize_or_zero")]
    pub columns: usize,
    #[serde(default, alias = "data")]
    pub cells: Vec<Vec<TableCell>>,
    #[serde(flatten)]
    pub style: StyleBag,
}

impl TableObject {
    pub fn is_rectangular(&self) -> bool {
        self.cells.len() == self.rows && self.cells.iter().all(|r| r.len() == self.columns)
    }

    /// Repair a grid loaded from storage: missing dimensions are taken from
    /// the cells, both are capped at [`MAX_TABLE_ROWS`] / [`MAX_TABLE_COLUMNS`],
    /// then the grid is squared up to `rows × columns`.
    pub fn normalized(mut self) -> Self {
        if self.rows == 0 {
            self.rows = self.cells.len();
        }
        if self.columns == 0 {
            self.columns = self.cells.iter().map(Vec::len).max().unwrap_or(0);
        }
        self.rows = self.rows.min(MAX_TABLE_ROWS);
        self.columns = self.columns.min(MAX_TABLE_COLUMNS);
        self.cells = crate::canvas::resize_table_grid(self.cells, self.rows, self.columns);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextBox {
    #[serde(deserialize_with = "lenient::id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub top: f64,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub left: f64,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub width: f64,
    /// Auto height when absent.
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    /// Rich HTML.
    #[serde(default)]
    pub content: String,
    #[serde(flatten)]
    pub style: StyleBag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageObject {
    #[serde(deserialize_with = "lenient::id_string")]
    pub id: String,
    #[serde(default, alias = "src")]
    pub url: String,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub top: f64,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub left: f64,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub width: f64,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub height: f64,
    /// 0–100.
    #[serde(default = "full_opacity", deserialize_with = "opacity_or_full")]
    pub opacity: f64,
    #[serde(flatten)]
    pub style: StyleBag,
}

/// Position and size of one object. `height` is `None` for auto-height text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: Option<f64>,
}

/// A borrowed view over any canvas object.
#[derive(Debug, Clone, Copy)]
pub enum ObjectRef<'a> {
    Shape(&'a Shape),
    Table(&'a TableObject),
    Text(&'a TextBox),
    Image(&'a ImageObject),
}

impl<'a> ObjectRef<'a> {
    pub fn kind(&self) -> CanvasKind {
        match self {
            ObjectRef::Shape(_) => CanvasKind::Shape,
            ObjectRef::Table(_) => CanvasKind::Table,
            ObjectRef::Text(_) => CanvasKind::Text,
            ObjectRef::Image(_) => CanvasKind::Image,
        }
    }

    pub fn id(&self) -> &'a str {
        match self {
            ObjectRef::Shape(o) => &o.id,
            ObjectRef::Table(o) => &o.id,
            ObjectRef::Text(o) => &o.id,
            ObjectRef::Image(o) => &o.id,
        }
    }

    pub fn style(&self) -> &'a StyleBag {
        match self {
            ObjectRef::Shape(o) => &o.style,
            ObjectRef::Table(o) => &o.style,
            ObjectRef::Text(o) => &o.style,
            ObjectRef::Image(o) => &o.style,
        }
    }

    pub fn bounds(&self) -> Bounds {
        match self {
            ObjectRef::Shape(o) => Bounds {
                top: o.top,
                left: o.left,
                width: o.width,
                height: Some(o.height),
            },
            ObjectRef::Table(o) => Bounds {
                top: o.top,
                left: o.left,
                width: o.width,
                height: Some(o.height),
            },
            ObjectRef::Text(o) => Bounds {
                top: o.top,
                left: o.left,
                width: o.width,
                height: o.height,
            },
            ObjectRef::Image(o) => Bounds {
                top: o.top,
                left: o.left,
                width: o.width,
                height: Some(o.height),
            },
        }
    }
}

/// An owned canvas object, as produced by a drop onto the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CanvasObject {
    Shape(Shape),
    Table(TableObject),
    Text(TextBox),
    Image(ImageObject),
}

impl CanvasObject {
    pub fn as_ref(&self) -> ObjectRef<'_> {
        match self {
            CanvasObject::Shape(o) => ObjectRef::Shape(o),
            CanvasObject::Table(o) => ObjectRef::Table(o),
            CanvasObject::Text(o) => ObjectRef::Text(o),
            CanvasObject::Image(o) => ObjectRef::Image(o),
        }
    }

    pub fn kind(&self) -> CanvasKind {
        self.as_ref().kind()
    }

    pub fn id(&self) -> &str {
        self.as_ref().id()
    }

    pub fn bounds(&self) -> Bounds {
        self.as_ref().bounds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shape_reads_flat_style_and_string_geometry() {
        let shape: Shape = serde_json::from_value(json!({
            "id": 7,
            "type": "circle",
            "top": "120px",
            "left": 40,
            "width": 80,
            "height": "80",
            "fill": "#ff0000",
            "borderWidth": "oops"
        }))
        .unwrap();
        assert_eq!(shape.id, "7");
        assert_eq!(shape.shape_type, ShapeType::Circle);
        assert_eq!(shape.top, 120.0);
        assert_eq!(shape.height, 80.0);
        assert_eq!(shape.style.background_color.as_deref(), Some("#ff0000"));
        assert_eq!(shape.style.border_width, None);
    }

    #[test]
    fn unknown_shape_type_defaults_to_square() {
        let shape: Shape = serde_json::from_value(json!({ "id": "a", "type": "hexagon" })).unwrap();
        assert_eq!(shape.shape_type, ShapeType::Square);
    }

    #[test]
    fn jagged_table_is_squared_on_normalize() {
        let table: TableObject = serde_json::from_value(json!({
            "id": "t",
            "cells": [
                [{ "id": "a", "content": "A" }, { "id": "b", "content": "B" }],
                [{ "id": "c", "content": "C" }]
            ]
        }))
        .unwrap();
        assert!(!table.is_rectangular());
        let table = table.normalized();
        assert_eq!((table.rows, table.columns), (2, 2));
        assert!(table.is_rectangular());
        assert_eq!(table.cells[1][0].content, "C");
        assert_eq!(table.cells[1][1].content, "");
    }

    #[test]
    fn oversized_table_is_capped_on_normalize() {
        let table: TableObject = serde_json::from_value(json!({
            "id": "t",
            "rows": 4_000_000_000_u64,
            "columns": 3
        }))
        .unwrap();
        let table = table.normalized();
        assert_eq!((table.rows, table.columns), (MAX_TABLE_ROWS, 3));
        assert!(table.is_rectangular());
    }

    #[test]
    fn image_opacity_defaults_and_clamps() {
        let img: ImageObject = serde_json::from_value(json!({ "id": "i", "src": "a.png" })).unwrap();
        assert_eq!(img.opacity, 100.0);
        assert_eq!(img.url, "a.png");
        let img: ImageObject = serde_json::from_value(json!({ "id": "i", "opacity": 250 })).unwrap();
        assert_eq!(img.opacity, 100.0);
    }

    #[test]
    fn text_bounds_keep_auto_height() {
        let t = TextBox {
            id: "x".into(),
            top: 10.0,
            left: 0.0,
            width: 200.0,
            height: None,
            content: String::new(),
            style: StyleBag::default(),
        };
        assert_eq!(ObjectRef::Text(&t).bounds().height, None);
    }
}
