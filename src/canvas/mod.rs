//! # Canvas Layout
//!
//! Each section has a free-form canvas on which shapes, tables, text boxes
//! and images sit at absolute coordinates. Nothing flows: the only layout
//! decision is how tall the canvas container must be so no object is
//! clipped, plus the geometry rules for dropping, moving and resizing.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{
    new_id, CanvasKind, CanvasObject, ImageObject, Section, Shape, ShapeType, TableCell,
    TableObject, TextBox, MAX_TABLE_COLUMNS, MAX_TABLE_ROWS,
};
use crate::mutate::MutationError;
use crate::style::StyleBag;

/// Tunables for canvas geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CanvasConfig {
    /// The canvas is never shorter than this.
    pub min_height: f64,
    /// Space kept below the lowest object.
    pub padding: f64,
    /// Assumed height of a text box with no explicit height.
    pub default_text_height: f64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            min_height: 400.0,
            padding: 20.0,
            default_text_height: 100.0,
        }
    }
}

pub const DEFAULT_SHAPE_SIZE: f64 = 100.0;
pub const DEFAULT_TABLE_ROWS: usize = 3;
pub const DEFAULT_TABLE_COLUMNS: usize = 3;
pub const DEFAULT_TABLE_WIDTH: f64 = 300.0;
pub const DEFAULT_TABLE_HEIGHT: f64 = 120.0;
pub const DEFAULT_TEXT_WIDTH: f64 = 200.0;
pub const DEFAULT_IMAGE_WIDTH: f64 = 200.0;
pub const DEFAULT_IMAGE_HEIGHT: f64 = 150.0;

/// Height of the canvas container for `section`:
/// `max(min_height, top + height + padding)` over every object.
pub fn compute_canvas_height(section: &Section, config: &CanvasConfig) -> f64 {
    section
        .objects()
        .map(|o| {
            let b = o.bounds();
            let height = b.height.unwrap_or(config.default_text_height);
            b.top + height + config.padding
        })
        .filter(|bottom| bottom.is_finite())
        .fold(config.min_height, f64::max)
}

/// Build a new object of `kind` dropped at (`drop_x`, `drop_y`), clamped to
/// the canvas origin.
pub fn place_new_object(kind: CanvasKind, drop_x: f64, drop_y: f64) -> CanvasObject {
    let left = clamp_coordinate(drop_x);
    let top = clamp_coordinate(drop_y);
    debug!(kind = kind.name(), top, left, "Placing canvas object");
    match kind {
        CanvasKind::Shape => CanvasObject::Shape(Shape {
            id: new_id(),
            shape_type: ShapeType::Square,
            top,
            left,
            width: DEFAULT_SHAPE_SIZE,
            height: DEFAULT_SHAPE_SIZE,
            style: StyleBag::default(),
        }),
        CanvasKind::Table => CanvasObject::Table(TableObject {
            id: new_id(),
            top,
            left,
            width: DEFAULT_TABLE_WIDTH,
            height: DEFAULT_TABLE_HEIGHT,
            rows: DEFAULT_TABLE_ROWS,
            columns: DEFAULT_TABLE_COLUMNS,
            cells: resize_table_grid(vec![], DEFAULT_TABLE_ROWS, DEFAULT_TABLE_COLUMNS),
            style: StyleBag::default(),
        }),
        CanvasKind::Text => CanvasObject::Text(TextBox {
            id: new_id(),
            top,
            left,
            width: DEFAULT_TEXT_WIDTH,
            height: None,
            content: String::new(),
            style: StyleBag::default(),
        }),
        CanvasKind::Image => CanvasObject::Image(ImageObject {
            id: new_id(),
            url: String::new(),
            top,
            left,
            width: DEFAULT_IMAGE_WIDTH,
            height: DEFAULT_IMAGE_HEIGHT,
            opacity: 100.0,
            style: StyleBag::default(),
        }),
    }
}

fn clamp_coordinate(v: f64) -> f64 {
    if v.is_finite() {
        v.max(0.0)
    } else {
        0.0
    }
}

fn clamp_size(v: f64) -> Option<f64> {
    v.is_finite().then(|| v.max(0.0))
}

/// Square a cell grid up to exactly `rows × columns`. Existing cells keep
/// their position and content; new cells are empty; extra rows and columns
/// are dropped.
pub fn resize_table_grid(
    mut cells: Vec<Vec<TableCell>>,
    rows: usize,
    columns: usize,
) -> Vec<Vec<TableCell>> {
    cells.truncate(rows);
    for row in cells.iter_mut() {
        row.truncate(columns);
        while row.len() < columns {
            row.push(TableCell::empty());
        }
    }
    while cells.len() < rows {
        cells.push((0..columns).map(|_| TableCell::empty()).collect());
    }
    cells
}

/// Targets one cell of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellEdit {
    pub row: usize,
    pub column: usize,
    pub content: String,
}

/// A partial update to one canvas object. Fields that do not apply to the
/// object's kind are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    /// Table only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    /// Table only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<usize>,
    /// Table only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<CellEdit>,
    /// Text only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Image only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Image only, 0–100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    /// Shape only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape_type: Option<ShapeType>,
    /// Merged over the object's current style.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleBag>,
}

impl ObjectPatch {
    pub fn move_to(top: f64, left: f64) -> Self {
        Self {
            top: Some(top),
            left: Some(left),
            ..Default::default()
        }
    }

    pub fn resize(width: f64, height: f64) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Default::default()
        }
    }

    fn apply_position(&self, top: &mut f64, left: &mut f64) {
        if let Some(t) = self.top {
            *top = clamp_coordinate(t);
        }
        if let Some(l) = self.left {
            *left = clamp_coordinate(l);
        }
    }

    fn apply_style(&self, style: &mut StyleBag) {
        if let Some(patch) = &self.style {
            *style = style.cascade(patch);
        }
    }

    fn apply_box(&self, top: &mut f64, left: &mut f64, width: &mut f64, height: &mut f64) {
        self.apply_position(top, left);
        if let Some(w) = self.width.and_then(clamp_size) {
            *width = w;
        }
        if let Some(h) = self.height.and_then(clamp_size) {
            *height = h;
        }
    }
}

fn apply_to_table(table: &mut TableObject, patch: &ObjectPatch) -> Result<(), MutationError> {
    let rows = patch.rows.unwrap_or(table.rows);
    let columns = patch.columns.unwrap_or(table.columns);
    if rows > MAX_TABLE_ROWS || columns > MAX_TABLE_COLUMNS {
        return Err(MutationError::TableTooLarge {
            rows,
            columns,
            max_rows: MAX_TABLE_ROWS,
            max_columns: MAX_TABLE_COLUMNS,
        });
    }
    patch.apply_box(&mut table.top, &mut table.left, &mut table.width, &mut table.height);
    patch.apply_style(&mut table.style);
    if patch.rows.is_some() || patch.columns.is_some() {
        table.rows = rows;
        table.columns = columns;
        table.cells = resize_table_grid(std::mem::take(&mut table.cells), rows, columns);
    }
    if let Some(edit) = &patch.cell {
        let cell = table
            .cells
            .get_mut(edit.row)
            .and_then(|r| r.get_mut(edit.column))
            .ok_or(MutationError::CellOutOfRange {
                row: edit.row,
                column: edit.column,
            })?;
        cell.content = edit.content.clone();
    }
    Ok(())
}

/// Apply `patch` to the `index`-th object of `kind` in `section`, returning
/// the updated section. No other object is touched.
pub fn update_object_geometry(
    section: &Section,
    kind: CanvasKind,
    index: usize,
    patch: &ObjectPatch,
) -> Result<Section, MutationError> {
    let mut next = section.clone();
    let missing = || MutationError::ObjectNotFound { kind, index };
    match kind {
        CanvasKind::Shape => {
            let shape = next.shapes.get_mut(index).ok_or_else(missing)?;
            patch.apply_box(&mut shape.top, &mut shape.left, &mut shape.width, &mut shape.height);
            patch.apply_style(&mut shape.style);
            if let Some(t) = patch.shape_type {
                shape.shape_type = t;
            }
        }
        CanvasKind::Table => {
            let table = next.tables.get_mut(index).ok_or_else(missing)?;
            apply_to_table(table, patch)?;
        }
        CanvasKind::Text => {
            let text = next.texts.get_mut(index).ok_or_else(missing)?;
            patch.apply_position(&mut text.top, &mut text.left);
            if let Some(w) = patch.width.and_then(clamp_size) {
                text.width = w;
            }
            if let Some(h) = patch.height.and_then(clamp_size) {
                text.height = Some(h);
            }
            if let Some(content) = &patch.content {
                text.content = content.clone();
            }
            patch.apply_style(&mut text.style);
        }
        CanvasKind::Image => {
            let image = next.images.get_mut(index).ok_or_else(missing)?;
            patch.apply_box(&mut image.top, &mut image.left, &mut image.width, &mut image.height);
            if let Some(url) = &patch.url {
                image.url = url.clone();
            }
            if let Some(o) = patch.opacity.filter(|o| o.is_finite()) {
                image.opacity = o.clamp(0.0, 100.0);
            }
            patch.apply_style(&mut image.style);
        }
    }
    debug!(kind = kind.name(), index, section = %section.id, "Updated canvas object");
    Ok(next)
}

/// Append `object` to the matching array of `section`.
pub fn insert_object(section: &Section, object: CanvasObject) -> Section {
    let mut next = section.clone();
    match object {
        CanvasObject::Shape(o) => next.shapes.push(o),
        CanvasObject::Table(o) => next.tables.push(o.normalized()),
        CanvasObject::Text(o) => next.texts.push(o),
        CanvasObject::Image(o) => next.images.push(o),
    }
    next
}

/// Remove the `index`-th object of `kind`.
pub fn remove_object(
    section: &Section,
    kind: CanvasKind,
    index: usize,
) -> Result<Section, MutationError> {
    let mut next = section.clone();
    let len = match kind {
        CanvasKind::Shape => next.shapes.len(),
        CanvasKind::Table => next.tables.len(),
        CanvasKind::Text => next.texts.len(),
        CanvasKind::Image => next.images.len(),
    };
    if index >= len {
        return Err(MutationError::ObjectNotFound { kind, index });
    }
    match kind {
        CanvasKind::Shape => {
            next.shapes.remove(index);
        }
        CanvasKind::Table => {
            next.tables.remove(index);
        }
        CanvasKind::Text => {
            next.texts.remove(index);
        }
        CanvasKind::Image => {
            next.images.remove(index);
        }
    }
    Ok(next)
}
