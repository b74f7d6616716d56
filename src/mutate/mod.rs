//! # Proposal Mutations
//!
//! Every editing surface funnels through the operations in this module.
//! They are pure: each takes the current [`Proposal`] by reference and
//! returns a new one, so callers may keep older values around (version
//! snapshots, a pending autosave) without fear of them changing underneath.
//!
//! Every successful mutation advances `updated_at`.
//!
//! The [`Mutation`] enum names the same operations as serializable intents,
//! for surfaces that queue or transport edits.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::canvas::{self, ObjectPatch};
use crate::share;
use crate::model::{
    new_id, CanvasKind, CanvasObject, Comment, Layout, LineItem, Proposal, ProposalStatus,
    Section, Version,
};
use crate::style::StyleBag;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutationError {
    #[error("Section not found: {0}")]
    SectionNotFound(String),

    #[error("No {} at index {index}", kind.name())]
    ObjectNotFound { kind: CanvasKind, index: usize },

    #[error("Table of {rows}x{columns} exceeds the {max_rows}x{max_columns} limit")]
    TableTooLarge {
        rows: usize,
        columns: usize,
        max_rows: usize,
        max_columns: usize,
    },

    #[error("Table cell ({row}, {column}) out of range")]
    CellOutOfRange { row: usize, column: usize },

    #[error("Index {index} out of range for {len} sections")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Column {column} out of range for a {columns}-column layout")]
    ColumnOutOfRange { column: usize, columns: usize },

    #[error("Version not found: {0}")]
    VersionNotFound(String),
}

/// Which style bag of a section a style patch targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StyleTarget {
    Title,
    Content,
    Column(usize),
}

/// Which flowing content of a section an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentTarget {
    Single,
    Column(usize),
}

/// Stamp `updated_at`, strictly later than before even within one clock tick.
pub(crate) fn touch(mut proposal: Proposal) -> Proposal {
    let now = Utc::now();
    let floor = proposal.updated_at + Duration::milliseconds(1);
    proposal.updated_at = if now >= floor { now } else { floor };
    proposal
}

fn with_section(
    proposal: &Proposal,
    section_id: &str,
    f: impl FnOnce(&Section) -> Result<Section, MutationError>,
) -> Result<Proposal, MutationError> {
    let index = proposal
        .section_index(section_id)
        .ok_or_else(|| MutationError::SectionNotFound(section_id.to_string()))?;
    let updated = f(&proposal.sections[index])?;
    let mut next = proposal.clone();
    next.sections[index] = updated;
    Ok(touch(next))
}

/// Append a new section with columns initialized for `layout`.
pub fn add_section(proposal: &Proposal, title: &str, layout: Layout) -> Proposal {
    let section = Section::new(title, layout);
    debug!(section = %section.id, ?layout, "Adding section");
    let mut next = proposal.clone();
    next.sections.push(section);
    touch(next)
}

/// Remove a section by id. Unknown ids leave the content as it was.
pub fn remove_section(proposal: &Proposal, section_id: &str) -> Proposal {
    let mut next = proposal.clone();
    next.sections.retain(|s| s.id != section_id);
    touch(next)
}

/// Move the section at `from` to `to` (clamped to the last position). All
/// other sections keep their relative order.
pub fn reorder_section(
    proposal: &Proposal,
    from: usize,
    to: usize,
) -> Result<Proposal, MutationError> {
    let len = proposal.sections.len();
    if from >= len {
        return Err(MutationError::IndexOutOfRange { index: from, len });
    }
    let mut next = proposal.clone();
    let section = next.sections.remove(from);
    let to = to.min(next.sections.len());
    next.sections.insert(to, section);
    Ok(touch(next))
}

/// Merge `patch` into one style bag of one section.
pub fn update_section_style(
    proposal: &Proposal,
    section_id: &str,
    target: StyleTarget,
    patch: &StyleBag,
) -> Result<Proposal, MutationError> {
    with_section(proposal, section_id, |section| {
        let mut next = section.clone();
        match target {
            StyleTarget::Title => next.title_styles = next.title_styles.cascade(patch),
            StyleTarget::Content => next.content_styles = next.content_styles.cascade(patch),
            StyleTarget::Column(column) => {
                let columns = section.effective_layout().column_count();
                if !section.effective_layout().is_multi_column() || column >= columns {
                    return Err(MutationError::ColumnOutOfRange { column, columns });
                }
                while next.column_styles.len() < columns {
                    next.column_styles.push(StyleBag::column_default());
                }
                next.column_styles[column] = next.column_styles[column].cascade(patch);
            }
        }
        Ok(next)
    })
}

/// Merge `patch` into the document title's style bag.
pub fn update_title_styles(proposal: &Proposal, patch: &StyleBag) -> Proposal {
    let mut next = proposal.clone();
    next.title_styles = next.title_styles.cascade(patch);
    touch(next)
}

/// Replace the single content or one column's content.
pub fn update_section_content(
    proposal: &Proposal,
    section_id: &str,
    target: ContentTarget,
    html: &str,
) -> Result<Proposal, MutationError> {
    with_section(proposal, section_id, |section| {
        let mut next = section.clone();
        match target {
            ContentTarget::Single => next.content = html.to_string(),
            ContentTarget::Column(column) => {
                let layout = section.effective_layout();
                let columns = layout.column_count();
                if !layout.is_multi_column() || column >= columns {
                    return Err(MutationError::ColumnOutOfRange { column, columns });
                }
                next.column_contents.resize(columns.max(next.column_contents.len()), String::new());
                next.column_contents[column] = html.to_string();
            }
        }
        Ok(next)
    })
}

pub fn rename_section(
    proposal: &Proposal,
    section_id: &str,
    title: &str,
) -> Result<Proposal, MutationError> {
    with_section(proposal, section_id, |section| {
        let mut next = section.clone();
        next.title = title.to_string();
        Ok(next)
    })
}

/// Switch a section's layout. Text is never dropped: going single → multi
/// moves the single content into the first column, going to fewer columns
/// appends the removed columns onto the last remaining one, and going
/// multi → single joins the columns into the single content when it is empty.
pub fn set_layout(
    proposal: &Proposal,
    section_id: &str,
    layout: Layout,
) -> Result<Proposal, MutationError> {
    with_section(proposal, section_id, |section| {
        let mut next = section.clone();
        let previous = section.effective_layout();
        next.layout = Some(layout);
        if !layout.is_multi_column() {
            if next.content.trim().is_empty() {
                next.content = section.column_contents.concat();
            }
            next.column_contents.clear();
            next.column_styles.clear();
            return Ok(next);
        }

        let columns = layout.column_count();
        let mut contents: Vec<String> = if previous.is_multi_column() {
            section.columns().into_iter().map(str::to_string).collect()
        } else {
            vec![std::mem::take(&mut next.content)]
        };
        if contents.len() > columns {
            let overflow: String = contents.split_off(columns).concat();
            if let Some(last) = contents.last_mut() {
                last.push_str(&overflow);
            }
        }
        contents.resize(columns, String::new());
        next.column_contents = contents;

        next.column_styles.truncate(columns);
        while next.column_styles.len() < columns {
            next.column_styles.push(StyleBag::column_default());
        }
        Ok(next)
    })
}

/// Prepend a comment. Existing comments are never edited here.
pub fn add_comment(
    proposal: &Proposal,
    section_id: &str,
    author: &str,
    text: &str,
) -> Result<Proposal, MutationError> {
    with_section(proposal, section_id, |section| {
        let mut next = section.clone();
        next.comments.insert(
            0,
            Comment {
                id: new_id(),
                author: author.to_string(),
                text: text.to_string(),
                created_at: Utc::now(),
            },
        );
        Ok(next)
    })
}

pub fn add_canvas_object(
    proposal: &Proposal,
    section_id: &str,
    object: CanvasObject,
) -> Result<Proposal, MutationError> {
    debug!(section = section_id, kind = object.kind().name(), "Adding canvas object");
    with_section(proposal, section_id, |section| {
        Ok(canvas::insert_object(section, object))
    })
}

pub fn update_canvas_object(
    proposal: &Proposal,
    section_id: &str,
    kind: CanvasKind,
    index: usize,
    patch: &ObjectPatch,
) -> Result<Proposal, MutationError> {
    with_section(proposal, section_id, |section| {
        canvas::update_object_geometry(section, kind, index, patch)
    })
}

pub fn remove_canvas_object(
    proposal: &Proposal,
    section_id: &str,
    kind: CanvasKind,
    index: usize,
) -> Result<Proposal, MutationError> {
    with_section(proposal, section_id, |section| {
        canvas::remove_object(section, kind, index)
    })
}

pub fn set_status(proposal: &Proposal, status: ProposalStatus) -> Proposal {
    let mut next = proposal.clone();
    next.status = status;
    touch(next)
}

pub fn add_line_item(proposal: &Proposal, label: &str, qty: f64, price: f64) -> Proposal {
    let mut next = proposal.clone();
    next.pricing.items.push(LineItem {
        id: new_id(),
        label: label.to_string(),
        qty,
        price,
    });
    touch(next)
}

/// Remove a line item by id; unknown ids change nothing but the timestamp.
pub fn remove_line_item(proposal: &Proposal, item_id: &str) -> Proposal {
    let mut next = proposal.clone();
    next.pricing.items.retain(|i| i.id != item_id);
    touch(next)
}

/// Append an immutable snapshot of the current state to the history.
pub fn snapshot_version(proposal: &Proposal, note: Option<&str>) -> Proposal {
    let mut snapshot = proposal.clone();
    snapshot.versions.clear();
    let mut next = proposal.clone();
    next.versions.push(Version {
        id: new_id(),
        created_at: Utc::now(),
        note: note.map(str::to_string),
        snapshot: Box::new(snapshot),
    });
    touch(next)
}

/// Bring back the content of a stored version. The history itself, the id
/// and the sharing settings stay as they are now.
pub fn restore_version(proposal: &Proposal, version_id: &str) -> Result<Proposal, MutationError> {
    let version = proposal
        .versions
        .iter()
        .find(|v| v.id == version_id)
        .ok_or_else(|| MutationError::VersionNotFound(version_id.to_string()))?;
    let mut next = (*version.snapshot).clone();
    next.id = proposal.id.clone();
    next.versions = proposal.versions.clone();
    next.settings = proposal.settings.clone();
    next.created_at = proposal.created_at;
    next.updated_at = proposal.updated_at;
    Ok(touch(next))
}

/// A serializable edit intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Mutation {
    AddSection {
        title: String,
        layout: Layout,
    },
    RemoveSection {
        section_id: String,
    },
    ReorderSection {
        from: usize,
        to: usize,
    },
    UpdateSectionStyle {
        section_id: String,
        target: StyleTarget,
        patch: StyleBag,
    },
    UpdateSectionContent {
        section_id: String,
        target: ContentTarget,
        html: String,
    },
    RenameSection {
        section_id: String,
        title: String,
    },
    SetLayout {
        section_id: String,
        layout: Layout,
    },
    UpdateTitleStyles {
        patch: StyleBag,
    },
    AddComment {
        section_id: String,
        author: String,
        text: String,
    },
    AddCanvasObject {
        section_id: String,
        object: CanvasObject,
    },
    UpdateCanvasObject {
        section_id: String,
        kind: CanvasKind,
        index: usize,
        patch: ObjectPatch,
    },
    RemoveCanvasObject {
        section_id: String,
        kind: CanvasKind,
        index: usize,
    },
    SetStatus {
        status: ProposalStatus,
    },
    AddLineItem {
        label: String,
        qty: f64,
        price: f64,
    },
    RemoveLineItem {
        item_id: String,
    },
    SnapshotVersion {
        note: Option<String>,
    },
    SetSharing {
        public: bool,
        #[serde(default)]
        allow_comments: Option<bool>,
    },
    RestoreVersion {
        version_id: String,
    },
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::AddSection { .. } => "addSection",
            Mutation::RemoveSection { .. } => "removeSection",
            Mutation::ReorderSection { .. } => "reorderSection",
            Mutation::UpdateSectionStyle { .. } => "updateSectionStyle",
            Mutation::UpdateSectionContent { .. } => "updateSectionContent",
            Mutation::RenameSection { .. } => "renameSection",
            Mutation::SetLayout { .. } => "setLayout",
            Mutation::UpdateTitleStyles { .. } => "updateTitleStyles",
            Mutation::AddComment { .. } => "addComment",
            Mutation::AddCanvasObject { .. } => "addCanvasObject",
            Mutation::UpdateCanvasObject { .. } => "updateCanvasObject",
            Mutation::RemoveCanvasObject { .. } => "removeCanvasObject",
            Mutation::SetStatus { .. } => "setStatus",
            Mutation::AddLineItem { .. } => "addLineItem",
            Mutation::RemoveLineItem { .. } => "removeLineItem",
            Mutation::SnapshotVersion { .. } => "snapshotVersion",
            Mutation::SetSharing { .. } => "setSharing",
            Mutation::RestoreVersion { .. } => "restoreVersion",
        }
    }

    /// Apply this intent, producing the next proposal.
    pub fn apply(&self, proposal: &Proposal) -> Result<Proposal, MutationError> {
        debug!(mutation = self.name(), proposal = %proposal.id, "Applying mutation");
        match self {
            Mutation::AddSection { title, layout } => Ok(add_section(proposal, title, *layout)),
            Mutation::RemoveSection { section_id } => Ok(remove_section(proposal, section_id)),
            Mutation::ReorderSection { from, to } => reorder_section(proposal, *from, *to),
            Mutation::UpdateSectionStyle {
                section_id,
                target,
                patch,
            } => update_section_style(proposal, section_id, *target, patch),
            Mutation::UpdateSectionContent {
                section_id,
                target,
                html,
            } => update_section_content(proposal, section_id, *target, html),
            Mutation::RenameSection { section_id, title } => {
                rename_section(proposal, section_id, title)
            }
            Mutation::SetLayout { section_id, layout } => set_layout(proposal, section_id, *layout),
            Mutation::UpdateTitleStyles { patch } => Ok(update_title_styles(proposal, patch)),
            Mutation::AddComment {
                section_id,
                author,
                text,
            } => add_comment(proposal, section_id, author, text),
            Mutation::AddCanvasObject { section_id, object } => {
                add_canvas_object(proposal, section_id, object.clone())
            }
            Mutation::UpdateCanvasObject {
                section_id,
                kind,
                index,
                patch,
            } => update_canvas_object(proposal, section_id, *kind, *index, patch),
            Mutation::RemoveCanvasObject {
                section_id,
                kind,
                index,
            } => remove_canvas_object(proposal, section_id, *kind, *index),
            Mutation::SetStatus { status } => Ok(set_status(proposal, *status)),
            Mutation::AddLineItem { label, qty, price } => {
                Ok(add_line_item(proposal, label, *qty, *price))
            }
            Mutation::RemoveLineItem { item_id } => Ok(remove_line_item(proposal, item_id)),
            Mutation::SnapshotVersion { note } => Ok(snapshot_version(proposal, note.as_deref())),
            Mutation::RestoreVersion { version_id } => restore_version(proposal, version_id),
            Mutation::SetSharing {
                public,
                allow_comments,
            } => Ok(share::set_sharing(proposal, *public, *allow_comments)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn proposal_with_sections(n: usize) -> Proposal {
        (0..n).fold(Proposal::new("Website", "Acme"), |p, i| {
            add_section(&p, &format!("S{}", i), Layout::Single)
        })
    }

    fn ids(p: &Proposal) -> Vec<String> {
        p.sections.iter().map(|s| s.id.clone()).collect()
    }

    #[test]
    fn add_section_sizes_columns_to_layout() {
        let p = Proposal::new("t", "c");
        let two = add_section(&p, "Two", Layout::TwoColumn);
        assert_eq!(two.sections.last().unwrap().column_contents.len(), 2);
        let three = add_section(&p, "Three", Layout::ThreeColumn);
        assert_eq!(three.sections.last().unwrap().column_contents.len(), 3);
        assert_eq!(three.sections.last().unwrap().column_styles.len(), 3);
        assert!(p.sections.is_empty());
    }

    #[test]
    fn every_mutation_advances_updated_at() {
        let p = Proposal::new("t", "c");
        let a = add_section(&p, "A", Layout::Single);
        let b = rename_section(&a, &a.sections[0].id, "B").unwrap();
        let c = remove_section(&b, "nope");
        assert!(a.updated_at > p.updated_at);
        assert!(b.updated_at > a.updated_at);
        assert!(c.updated_at > b.updated_at);
    }

    #[test]
    fn remove_missing_section_keeps_sections() {
        let p = proposal_with_sections(2);
        let next = remove_section(&p, "missing");
        assert_eq!(ids(&next), ids(&p));
        let next = remove_section(&p, &p.sections[0].id);
        assert_eq!(ids(&next), vec![p.sections[1].id.clone()]);
    }

    #[test]
    fn reorder_is_a_permutation() {
        let p = proposal_with_sections(5);
        let next = reorder_section(&p, 0, 3).unwrap();
        let mut before = ids(&p);
        let mut after = ids(&next);
        assert_eq!(after[3], before[0]);
        assert_eq!(after[0], before[1]);
        before.sort();
        after.sort();
        assert_eq!(before, after);

        let clamped = reorder_section(&p, 4, 99).unwrap();
        assert_eq!(ids(&clamped), ids(&p));
        assert_matches!(
            reorder_section(&p, 5, 0),
            Err(MutationError::IndexOutOfRange { index: 5, len: 5 })
        );
    }

    #[test]
    fn style_update_touches_one_bag() {
        let p = add_section(&Proposal::new("t", "c"), "S", Layout::TwoColumn);
        let id = p.sections[0].id.clone();
        let patch = StyleBag {
            background_color: Some("#ff0000".into()),
            ..Default::default()
        };
        let next = update_section_style(&p, &id, StyleTarget::Column(1), &patch).unwrap();
        let s = &next.sections[0];
        assert_eq!(s.column_styles[1].background_color.as_deref(), Some("#ff0000"));
        assert_eq!(s.column_styles[1].margin_top, Some(0.0));
        assert_eq!(s.column_styles[0], p.sections[0].column_styles[0]);
        assert_eq!(s.content_styles, p.sections[0].content_styles);
        assert_eq!(s.title_styles, p.sections[0].title_styles);

        assert_matches!(
            update_section_style(&p, &id, StyleTarget::Column(2), &patch),
            Err(MutationError::ColumnOutOfRange { column: 2, columns: 2 })
        );
        assert_matches!(
            update_section_style(&p, "x", StyleTarget::Title, &patch),
            Err(MutationError::SectionNotFound(_))
        );
    }

    #[test]
    fn comments_are_prepended() {
        let p = proposal_with_sections(1);
        let id = p.sections[0].id.clone();
        let p1 = add_comment(&p, &id, "Ava", "first").unwrap();
        let p2 = add_comment(&p1, &id, "Ben", "second").unwrap();
        let comments = &p2.sections[0].comments;
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].text, "second");
        assert_eq!(comments[1], p1.sections[0].comments[0]);
    }

    #[test]
    fn layout_switch_keeps_text() {
        let p = proposal_with_sections(1);
        let id = p.sections[0].id.clone();
        let p = update_section_content(&p, &id, ContentTarget::Single, "<p>intro</p>").unwrap();
        let three = set_layout(&p, &id, Layout::ThreeColumn).unwrap();
        assert_eq!(three.sections[0].column_contents, vec!["<p>intro</p>", "", ""]);
        let three = update_section_content(&three, &id, ContentTarget::Column(2), "<p>c</p>").unwrap();
        let two = set_layout(&three, &id, Layout::TwoColumn).unwrap();
        assert_eq!(two.sections[0].column_contents, vec!["<p>intro</p>", "<p>c</p>"]);
        assert_eq!(two.sections[0].column_styles.len(), 2);
        let single = set_layout(&two, &id, Layout::Single).unwrap();
        assert_eq!(single.sections[0].content, "<p>intro</p><p>c</p>");
        assert!(single.sections[0].column_contents.is_empty());
    }

    #[test]
    fn versions_are_append_only_snapshots() {
        let p = proposal_with_sections(1);
        let v1 = snapshot_version(&p, Some("first draft"));
        let edited = rename_section(&v1, &v1.sections[0].id, "Renamed").unwrap();
        let v2 = snapshot_version(&edited, None);
        assert_eq!(v2.versions.len(), 2);
        assert_eq!(v2.versions[0], v1.versions[0]);
        assert!(v2.versions[0].snapshot.versions.is_empty());

        let restored = restore_version(&v2, &v2.versions[0].id).unwrap();
        assert_eq!(restored.sections[0].title, "S0");
        assert_eq!(restored.versions.len(), 2);
        assert_eq!(restored.id, p.id);
    }

    #[test]
    fn mutation_intents_round_trip_and_apply() {
        let m: Mutation = serde_json::from_value(serde_json::json!({
            "type": "addSection",
            "title": "Pricing",
            "layout": "two-column"
        }))
        .unwrap();
        let p = m.apply(&Proposal::new("t", "c")).unwrap();
        assert_eq!(p.sections[0].title, "Pricing");
        assert_eq!(p.sections[0].effective_layout(), Layout::TwoColumn);
    }
}
