//! # Edit Session
//!
//! One open proposal in the editor: the current value, what is selected,
//! and when it next needs saving. Edits apply synchronously; persistence is
//! debounced so a burst of keystrokes produces one write once the user
//! pauses. A failed write never rolls anything back: the in-memory proposal
//! stays authoritative and the caller gets a [`Notification`] to show.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::{KeyValueStore, ProposalCache, ProposalStore};
use crate::canvas::ObjectPatch;
use crate::error::QuireError;
use crate::model::{CanvasKind, Proposal};
use crate::mutate::{update_canvas_object, update_section_content, ContentTarget, Mutation};
use crate::render::Selection;
use crate::richtext::{EditOp, RichText, RichTextError};
use crate::template::is_html;

pub const DEFAULT_AUTOSAVE_MS: i64 = 400;

/// Quiet-period debouncer. Each recorded edit pushes the deadline out.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoSave {
    quiet: Duration,
    last_edit: Option<DateTime<Utc>>,
}

impl Default for AutoSave {
    fn default() -> Self {
        Self::new(Duration::milliseconds(DEFAULT_AUTOSAVE_MS))
    }
}

impl AutoSave {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            last_edit: None,
        }
    }

    pub fn record(&mut self, now: DateTime<Utc>) {
        self.last_edit = Some(now);
    }

    pub fn is_pending(&self) -> bool {
        self.last_edit.is_some()
    }

    /// When the pending write becomes due.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.last_edit.map(|t| t + self.quiet)
    }

    pub fn due(&self, now: DateTime<Utc>) -> bool {
        self.deadline().is_some_and(|d| now >= d)
    }

    pub fn mark_saved(&mut self) {
        self.last_edit = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Error,
}

/// A message for the user, shown inline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }
}

/// Rich text a structured edit lands in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RichTextTarget {
    Section {
        section_id: String,
        content: ContentTarget,
    },
    TextBox {
        section_id: String,
        index: usize,
    },
}

/// The markup currently stored for `target`, `None` when it does not exist.
fn stored_content<'p>(proposal: &'p Proposal, target: &RichTextTarget) -> Option<&'p str> {
    match target {
        RichTextTarget::Section {
            section_id,
            content: ContentTarget::Single,
        } => proposal.section(section_id).map(|s| s.content.as_str()),
        RichTextTarget::Section {
            section_id,
            content: ContentTarget::Column(i),
        } => proposal
            .section(section_id)
            .and_then(|s| s.column_contents.get(*i))
            .map(String::as_str),
        RichTextTarget::TextBox { section_id, index } => proposal
            .section(section_id)
            .and_then(|s| s.texts.get(*index))
            .map(|t| t.content.as_str()),
    }
}

#[derive(Debug, Clone)]
pub struct EditSession {
    pub proposal: Proposal,
    pub selection: Selection,
    pub autosave: AutoSave,
    /// Bumped on every applied edit.
    pub revision: u64,
    saved_revision: u64,
    documents: HashMap<RichTextTarget, RichText>,
}

impl EditSession {
    pub fn new(proposal: Proposal, autosave: AutoSave) -> Self {
        Self {
            proposal,
            selection: Selection::none(),
            autosave,
            revision: 0,
            saved_revision: 0,
            documents: HashMap::new(),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.revision != self.saved_revision
    }

    /// Apply an edit and schedule a save. Open rich-text documents whose
    /// stored markup the edit changed (or removed) are closed.
    pub fn apply(&mut self, mutation: &Mutation, now: DateTime<Utc>) -> Result<(), QuireError> {
        let next = mutation.apply(&self.proposal)?;
        let prev = std::mem::replace(&mut self.proposal, next);
        let current = &self.proposal;
        self.documents.retain(|target, _| {
            let stored = stored_content(current, target);
            stored.is_some() && stored == stored_content(&prev, target)
        });
        self.revision += 1;
        self.autosave.record(now);
        Ok(())
    }

    /// Start editing `target` from `doc`. Replaces any document already open
    /// for it.
    pub fn open_rich_text(&mut self, target: RichTextTarget, doc: RichText) {
        self.documents.insert(target, doc);
    }

    pub fn rich_text(&self, target: &RichTextTarget) -> Option<&RichText> {
        self.documents.get(target)
    }

    /// Apply a structured rich-text edit to the document open for `target`
    /// and store the resulting markup there.
    ///
    /// With no open document, plain-text content is opened as is; markup has
    /// to be opened with [`Self::open_rich_text`] first.
    pub fn edit_rich_text(
        &mut self,
        target: &RichTextTarget,
        op: &EditOp,
        now: DateTime<Utc>,
    ) -> Result<&RichText, QuireError> {
        let edited = match self.documents.get(target) {
            Some(doc) => doc.apply(op)?,
            None => {
                let stored = stored_content(&self.proposal, target).unwrap_or_default();
                if is_html(stored) {
                    return Err(RichTextError::NotOpen.into());
                }
                RichText::from_plain(stored).apply(op)?
            }
        };
        let html = edited.to_html();
        self.proposal = match target {
            RichTextTarget::Section {
                section_id,
                content,
            } => update_section_content(&self.proposal, section_id, *content, &html)?,
            RichTextTarget::TextBox { section_id, index } => update_canvas_object(
                &self.proposal,
                section_id,
                CanvasKind::Text,
                *index,
                &ObjectPatch {
                    content: Some(html),
                    ..Default::default()
                },
            )?,
        };
        self.revision += 1;
        self.autosave.record(now);
        self.documents.insert(target.clone(), edited);
        Ok(&self.documents[target])
    }

    pub fn select(&mut self, selection: Selection) {
        self.selection = selection;
    }

    /// Save if the quiet period has passed. `None` when nothing was due or
    /// the save went through.
    pub fn flush<S: ProposalStore, K: KeyValueStore>(
        &mut self,
        store: &mut S,
        cache: &mut ProposalCache<K>,
        now: DateTime<Utc>,
    ) -> Option<Notification> {
        if !self.autosave.due(now) {
            return None;
        }
        self.save_now(store, cache, now)
    }

    /// Save immediately, ignoring the debounce.
    pub fn save_now<S: ProposalStore, K: KeyValueStore>(
        &mut self,
        store: &mut S,
        cache: &mut ProposalCache<K>,
        now: DateTime<Utc>,
    ) -> Option<Notification> {
        match store.save(&self.proposal) {
            Ok(_) => {
                self.saved_revision = self.revision;
                self.autosave.mark_saved();
                if let Err(e) = cache.upsert(&self.proposal) {
                    warn!(error = %e, "Saved, but the local cache could not be updated");
                }
                debug!(proposal = %self.proposal.id, revision = self.revision, "Saved proposal");
                None
            }
            Err(e) => {
                warn!(proposal = %self.proposal.id, error = %e, "Save failed, keeping local changes");
                // Retry after another quiet period.
                self.autosave.record(now);
                Some(Notification::error(format!("Could not save your changes. {}", e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MemoryKv, MemoryProposalStore, StoreError};
    use crate::model::Layout;
    use crate::richtext::Position;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    fn add(title: &str) -> Mutation {
        Mutation::AddSection {
            title: title.into(),
            layout: Layout::Single,
        }
    }

    #[test]
    fn superseding_edits_push_the_deadline() {
        let mut save = AutoSave::default();
        assert!(!save.due(at(10_000)));
        save.record(at(0));
        assert!(!save.due(at(399)));
        save.record(at(300));
        assert!(!save.due(at(600)));
        assert!(save.due(at(700)));
        save.mark_saved();
        assert!(!save.due(at(10_000)));
    }

    #[test]
    fn burst_of_edits_is_one_write() {
        let mut store = MemoryProposalStore::new();
        let mut cache = ProposalCache::new(MemoryKv::new());
        let mut session = EditSession::new(Proposal::new("t", "c"), AutoSave::default());

        session.apply(&add("A"), at(0)).unwrap();
        assert_eq!(session.flush(&mut store, &mut cache, at(100)), None);
        session.apply(&add("B"), at(200)).unwrap();
        assert!(store.list().unwrap().is_empty());

        assert_eq!(session.flush(&mut store, &mut cache, at(600)), None);
        assert!(!session.is_dirty());
        let saved = store.get(&session.proposal.id).unwrap();
        assert_eq!(saved.sections.len(), 2);
        assert_eq!(cache.get(&session.proposal.id).unwrap().sections.len(), 2);
    }

    #[test]
    fn failed_save_keeps_state_and_notifies() {
        let mut store = MemoryProposalStore::new();
        store.fail_with(Some(StoreError::Network("offline".into())));
        let mut cache = ProposalCache::new(MemoryKv::new());
        let mut session = EditSession::new(Proposal::new("t", "c"), AutoSave::default());

        session.apply(&add("A"), at(0)).unwrap();
        let note = session.flush(&mut store, &mut cache, at(500)).unwrap();
        assert_eq!(note.level, NotificationLevel::Error);
        assert!(note.message.contains("offline"));
        assert_eq!(session.proposal.sections.len(), 1);
        assert!(session.is_dirty());
        assert!(!session.autosave.due(at(800)));

        store.fail_with(None);
        assert_eq!(session.flush(&mut store, &mut cache, at(900)), None);
        assert!(!session.is_dirty());
    }

    fn insert(block: usize, offset: usize, text: &str) -> EditOp {
        EditOp::InsertText {
            at: Position::new(block, offset),
            text: text.into(),
            marks: None,
        }
    }

    #[test]
    fn rich_text_edits_land_in_section_content() {
        let mut session = EditSession::new(Proposal::new("t", "c"), AutoSave::default());
        session.apply(&add("Intro"), at(0)).unwrap();
        let target = RichTextTarget::Section {
            section_id: session.proposal.sections[0].id.clone(),
            content: ContentTarget::Single,
        };
        session.open_rich_text(target.clone(), RichText::from_plain("Hello"));
        let edited = session.edit_rich_text(&target, &insert(0, 5, " world"), at(50)).unwrap();
        assert_eq!(edited.plain_text(), "Hello world");
        assert_eq!(session.proposal.sections[0].content, "<p>Hello world</p>");
        assert_eq!(session.revision, 2);

        session.edit_rich_text(&target, &insert(0, 0, ">"), at(60)).unwrap();
        assert_eq!(session.proposal.sections[0].content, "<p>&gt;Hello world</p>");
    }

    #[test]
    fn rich_text_edits_land_in_text_boxes() {
        let mut session = EditSession::new(Proposal::new("t", "c"), AutoSave::default());
        session.apply(&add("Canvas"), at(0)).unwrap();
        let section_id = session.proposal.sections[0].id.clone();
        session
            .apply(
                &Mutation::AddCanvasObject {
                    section_id: section_id.clone(),
                    object: crate::canvas::place_new_object(CanvasKind::Text, 0.0, 0.0),
                },
                at(10),
            )
            .unwrap();
        let target = RichTextTarget::TextBox {
            section_id,
            index: 0,
        };
        session.edit_rich_text(&target, &insert(0, 0, "Note"), at(20)).unwrap();
        assert_eq!(session.proposal.sections[0].texts[0].content, "<p>Note</p>");
        assert_eq!(session.rich_text(&target).unwrap().plain_text(), "Note");
    }

    #[test]
    fn stored_markup_must_be_opened_first() {
        let mut session = EditSession::new(Proposal::new("t", "c"), AutoSave::default());
        session.apply(&add("Intro"), at(0)).unwrap();
        let section_id = session.proposal.sections[0].id.clone();
        session
            .apply(
                &Mutation::UpdateSectionContent {
                    section_id: section_id.clone(),
                    target: ContentTarget::Single,
                    html: "<p><strong>Bold</strong></p>".into(),
                },
                at(10),
            )
            .unwrap();
        let target = RichTextTarget::Section {
            section_id,
            content: ContentTarget::Single,
        };
        assert!(matches!(
            session.edit_rich_text(&target, &insert(0, 0, "x"), at(20)),
            Err(QuireError::RichText(RichTextError::NotOpen))
        ));
        assert_eq!(session.proposal.sections[0].content, "<p><strong>Bold</strong></p>");
    }

    #[test]
    fn outside_content_change_closes_the_document() {
        let mut session = EditSession::new(Proposal::new("t", "c"), AutoSave::default());
        session.apply(&add("Intro"), at(0)).unwrap();
        let section_id = session.proposal.sections[0].id.clone();
        let target = RichTextTarget::Section {
            section_id: section_id.clone(),
            content: ContentTarget::Single,
        };
        session.edit_rich_text(&target, &insert(0, 0, "Draft"), at(10)).unwrap();

        session.apply(&add("Other"), at(20)).unwrap();
        assert!(session.rich_text(&target).is_some());

        session
            .apply(
                &Mutation::UpdateSectionContent {
                    section_id,
                    target: ContentTarget::Single,
                    html: "<p>Replaced</p>".into(),
                },
                at(30),
            )
            .unwrap();
        assert!(session.rich_text(&target).is_none());
    }
}
