//! # Rich Text Documents
//!
//! Structured rich text for section content and canvas text boxes. An
//! editing surface never touches markup directly: it emits [`EditOp`]s,
//! which [`RichText::apply`] turns into a new document, and the stored HTML
//! is produced by [`RichText::to_html`]. Stored markup is never parsed
//! back: the editor opens a document per target, see
//! [`crate::session::EditSession::open_rich_text`].
//!
//! Positions are `(block, offset)` pairs where `offset` counts characters
//! (Unicode scalar values) within the block. Runs are kept normalized:
//! no empty runs, and no two neighbours with identical marks.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::template::escape_text;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RichTextError {
    #[error("Content is markup; open it as a document before editing")]
    NotOpen,

    #[error("Block {block} out of range ({len} blocks)")]
    BlockOutOfRange { block: usize, len: usize },

    #[error("Offset {offset} out of range in block {block} ({len} characters)")]
    OffsetOutOfRange {
        block: usize,
        offset: usize,
        len: usize,
    },
}

/// Inline formatting carried by a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marks {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub underline: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub strikethrough: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// One mark to toggle over a range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mark {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Color(String),
    Link(String),
}

impl Marks {
    fn has(&self, mark: &Mark) -> bool {
        match mark {
            Mark::Bold => self.bold,
            Mark::Italic => self.italic,
            Mark::Underline => self.underline,
            Mark::Strikethrough => self.strikethrough,
            Mark::Color(c) => self.color.as_deref() == Some(c.as_str()),
            Mark::Link(l) => self.link.as_deref() == Some(l.as_str()),
        }
    }

    fn set(&mut self, mark: &Mark, on: bool) {
        match mark {
            Mark::Bold => self.bold = on,
            Mark::Italic => self.italic = on,
            Mark::Underline => self.underline = on,
            Mark::Strikethrough => self.strikethrough = on,
            Mark::Color(c) => self.color = on.then(|| c.clone()),
            Mark::Link(l) => self.link = on.then(|| l.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    #[serde(default)]
    pub marks: Marks,
}

impl TextRun {
    pub fn plain(text: &str) -> Self {
        Self {
            text: text.to_string(),
            marks: Marks::default(),
        }
    }

    fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A paragraph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub runs: Vec<TextRun>,
}

impl Block {
    pub fn char_len(&self) -> usize {
        self.runs.iter().map(TextRun::char_len).sum()
    }

    pub fn plain_text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    /// Split the runs at a character offset into (before, after).
    fn split_at(&self, offset: usize) -> (Vec<TextRun>, Vec<TextRun>) {
        let mut before = Vec::new();
        let mut after = Vec::new();
        let mut remaining = offset;
        for run in &self.runs {
            let len = run.char_len();
            if remaining >= len {
                before.push(run.clone());
                remaining -= len;
            } else if remaining == 0 {
                after.push(run.clone());
            } else {
                let byte = run
                    .text
                    .char_indices()
                    .nth(remaining)
                    .map(|(i, _)| i)
                    .unwrap_or(run.text.len());
                before.push(TextRun {
                    text: run.text[..byte].to_string(),
                    marks: run.marks.clone(),
                });
                after.push(TextRun {
                    text: run.text[byte..].to_string(),
                    marks: run.marks.clone(),
                });
                remaining = 0;
            }
        }
        (before, after)
    }

    /// Marks in effect just before `offset`, falling back to the first run.
    fn marks_at(&self, offset: usize) -> Marks {
        let (before, after) = self.split_at(offset);
        before
            .last()
            .or_else(|| after.first())
            .map(|r| r.marks.clone())
            .unwrap_or_default()
    }

    fn normalize(&mut self) {
        let mut runs: Vec<TextRun> = Vec::with_capacity(self.runs.len());
        for run in self.runs.drain(..) {
            if run.text.is_empty() {
                continue;
            }
            match runs.last_mut() {
                Some(last) if last.marks == run.marks => last.text.push_str(&run.text),
                _ => runs.push(run),
            }
        }
        self.runs = runs;
    }

    fn to_html(&self) -> String {
        if self.runs.is_empty() {
            return "<p><br></p>".to_string();
        }
        let mut out = String::from("<p>");
        for run in &self.runs {
            out.push_str(&run_html(run));
        }
        out.push_str("</p>");
        out
    }
}

fn run_html(run: &TextRun) -> String {
    let mut html = escape_text(&run.text).replace('\n', "<br>");
    let m = &run.marks;
    if let Some(color) = &m.color {
        html = format!("<span style=\"color: {}\">{}</span>", escape_text(color), html);
    }
    if m.strikethrough {
        html = format!("<s>{}</s>", html);
    }
    if m.underline {
        html = format!("<u>{}</u>", html);
    }
    if m.italic {
        html = format!("<em>{}</em>", html);
    }
    if m.bold {
        html = format!("<strong>{}</strong>", html);
    }
    if let Some(link) = &m.link {
        html = format!("<a href=\"{}\">{}</a>", escape_text(link), html);
    }
    html
}

/// A character position inside a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub block: usize,
    pub offset: usize,
}

impl Position {
    pub fn new(block: usize, offset: usize) -> Self {
        Self { block, offset }
    }
}

/// A structured edit emitted by an editing surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EditOp {
    /// Insert text; without explicit marks it inherits the marks of the
    /// character before the caret.
    InsertText {
        at: Position,
        text: String,
        #[serde(default)]
        marks: Option<Marks>,
    },
    /// Delete `[from, to)`, joining blocks when the range spans several.
    DeleteRange { from: Position, to: Position },
    /// Turn `mark` on over `[from, to)`, or off when the whole range already
    /// has it.
    ToggleMark {
        from: Position,
        to: Position,
        mark: Mark,
    },
    /// Break a block in two at a position.
    SplitBlock { at: Position },
}

/// An ordered sequence of blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RichText {
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl RichText {
    /// One unmarked block per line.
    pub fn from_plain(text: &str) -> Self {
        let blocks = text
            .split('\n')
            .map(|line| {
                let mut block = Block {
                    runs: vec![TextRun::plain(line)],
                };
                block.normalize();
                block
            })
            .collect();
        Self { blocks }
    }

    pub fn plain_text(&self) -> String {
        self.blocks
            .iter()
            .map(Block::plain_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_html(&self) -> String {
        self.blocks.iter().map(Block::to_html).collect()
    }

    fn check(&self, at: Position) -> Result<(), RichTextError> {
        let block = self
            .blocks
            .get(at.block)
            .ok_or(RichTextError::BlockOutOfRange {
                block: at.block,
                len: self.blocks.len(),
            })?;
        let len = block.char_len();
        if at.offset > len {
            return Err(RichTextError::OffsetOutOfRange {
                block: at.block,
                offset: at.offset,
                len,
            });
        }
        Ok(())
    }

    /// Apply one edit, returning the new document.
    pub fn apply(&self, op: &EditOp) -> Result<RichText, RichTextError> {
        let mut doc = self.clone();
        if doc.blocks.is_empty() {
            doc.blocks.push(Block::default());
        }
        match op {
            EditOp::InsertText { at, text, marks } => {
                doc.check(*at)?;
                let block = &mut doc.blocks[at.block];
                let marks = marks.clone().unwrap_or_else(|| block.marks_at(at.offset));
                let (mut before, after) = block.split_at(at.offset);
                before.push(TextRun {
                    text: text.clone(),
                    marks,
                });
                before.extend(after);
                block.runs = before;
                block.normalize();
            }
            EditOp::DeleteRange { from, to } => {
                let (from, to) = ordered(*from, *to);
                doc.check(from)?;
                doc.check(to)?;
                let (mut head, _) = doc.blocks[from.block].split_at(from.offset);
                let (_, tail) = doc.blocks[to.block].split_at(to.offset);
                head.extend(tail);
                let mut joined = Block { runs: head };
                joined.normalize();
                doc.blocks.splice(from.block..=to.block, [joined]);
            }
            EditOp::ToggleMark { from, to, mark } => {
                let (from, to) = ordered(*from, *to);
                doc.check(from)?;
                doc.check(to)?;
                let ranges = spans(&doc, from, to);
                let all_on = ranges.iter().all(|&(b, start, end)| {
                    let (_, rest) = doc.blocks[b].split_at(start);
                    let middle = Block { runs: rest }.split_at(end - start).0;
                    middle.iter().all(|r| r.marks.has(mark))
                });
                for (b, start, end) in ranges {
                    let block = &mut doc.blocks[b];
                    let (before, rest) = block.split_at(start);
                    let rest = Block { runs: rest };
                    let (mut middle, after) = rest.split_at(end - start);
                    for run in &mut middle {
                        run.marks.set(mark, !all_on);
                    }
                    block.runs = before.into_iter().chain(middle).chain(after).collect();
                    block.normalize();
                }
            }
            EditOp::SplitBlock { at } => {
                doc.check(*at)?;
                let (before, after) = doc.blocks[at.block].split_at(at.offset);
                doc.blocks[at.block].runs = before;
                doc.blocks.insert(at.block + 1, Block { runs: after });
            }
        }
        Ok(doc)
    }
}

fn ordered(a: Position, b: Position) -> (Position, Position) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Per-block `(block, start, end)` character spans covered by `[from, to)`.
fn spans(doc: &RichText, from: Position, to: Position) -> Vec<(usize, usize, usize)> {
    (from.block..=to.block)
        .map(|b| {
            let start = if b == from.block { from.offset } else { 0 };
            let end = if b == to.block {
                to.offset
            } else {
                doc.blocks[b].char_len()
            };
            (b, start, end)
        })
        .filter(|(_, start, end)| end > start)
        .collect()
}
