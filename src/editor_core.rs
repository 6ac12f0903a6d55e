use regex::Regex;
use std::sync::OnceLock;

use crate::fuzzy::LinkSuggestion;
use crate::syntax::CalloutKind;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

impl Selection {
    pub fn new(start: usize, end: usize) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    pub fn cursor(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    pub fn clamp(self, len: usize) -> Self {
        Self::new(self.start.min(len), self.end.min(len))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextChange {
    pub start: usize,
    pub end: usize,
    pub insert: String,
}

impl TextChange {
    pub fn new(start: usize, end: usize, insert: impl Into<String>) -> Self {
        Self {
            start,
            end,
            insert: insert.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ChangeOrigin {
    Completion,
    #[default]
    System,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub changes: Vec<TextChange>,
    pub selection_after: Option<Selection>,
    pub origin: ChangeOrigin,
    pub label: &'static str,
}

impl Transaction {
    pub fn single(
        change: TextChange,
        selection_after: Option<Selection>,
        origin: ChangeOrigin,
        label: &'static str,
    ) -> Self {
        Self {
            changes: vec![change],
            selection_after,
            origin,
            label,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub text_changed: bool,
    pub selection_changed: bool,
    pub revision: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoreError {
    InvalidRange {
        start: usize,
        end: usize,
        len: usize,
    },
    OverlappingChanges {
        first_start: usize,
        first_end: usize,
        next_start: usize,
        next_end: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditorSnapshot {
    pub text: String,
    pub selection: Selection,
    pub revision: u64,
}

impl EditorSnapshot {
    pub fn new(text: String) -> Self {
        let len = text.len();
        Self {
            text,
            selection: Selection::cursor(len),
            revision: 0,
        }
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection.clamp(self.text.len());
    }

    pub fn replace_from_input(&mut self, new_text: String, selection: Selection) -> ApplyOutcome {
        let next_selection = selection.clamp(new_text.len());
        let text_changed = self.text != new_text;
        let selection_changed = self.selection != next_selection;

        self.text = new_text;
        self.selection = next_selection;
        if text_changed {
            self.revision += 1;
        }

        ApplyOutcome {
            text_changed,
            selection_changed,
            revision: self.revision,
        }
    }

    pub fn apply_transaction(
        &mut self,
        transaction: Transaction,
    ) -> Result<ApplyOutcome, CoreError> {
        let normalized = normalize_changes(&transaction.changes, self.text.len())?;
        let next_text = if normalized.is_empty() {
            self.text.clone()
        } else {
            apply_changes_to_text(&self.text, &normalized)
        };

        let next_selection = transaction
            .selection_after
            .map(|selection| selection.clamp(next_text.len()))
            .unwrap_or_else(|| {
                Selection::new(
                    map_position_through_changes(self.selection.start, &normalized),
                    map_position_through_changes(self.selection.end, &normalized),
                )
                .clamp(next_text.len())
            });

        let text_changed = self.text != next_text;
        let selection_changed = self.selection != next_selection;

        self.text = next_text;
        self.selection = next_selection;
        if text_changed {
            self.revision += 1;
        }

        Ok(ApplyOutcome {
            text_changed,
            selection_changed,
            revision: self.revision,
        })
    }
}

fn normalize_changes(changes: &[TextChange], len: usize) -> Result<Vec<TextChange>, CoreError> {
    let mut sorted = changes.to_vec();
    sorted.sort_by_key(|change| (change.start, change.end));

    for change in &sorted {
        if change.start > change.end || change.end > len {
            return Err(CoreError::InvalidRange {
                start: change.start,
                end: change.end,
                len,
            });
        }
    }

    for pair in sorted.windows(2) {
        let first = &pair[0];
        let next = &pair[1];
        if next.start < first.end {
            return Err(CoreError::OverlappingChanges {
                first_start: first.start,
                first_end: first.end,
                next_start: next.start,
                next_end: next.end,
            });
        }
    }

    Ok(sorted)
}

fn apply_changes_to_text(text: &str, changes: &[TextChange]) -> String {
    let mut out = String::new();
    let mut cursor = 0usize;
    for change in changes {
        out.push_str(&text[cursor..change.start]);
        out.push_str(&change.insert);
        cursor = change.end;
    }
    out.push_str(&text[cursor..]);
    out
}

fn map_position_through_changes(mut pos: usize, changes: &[TextChange]) -> usize {
    for change in changes {
        if pos < change.start {
            continue;
        }
        if pos <= change.end {
            pos = change.start + change.insert.len();
            continue;
        }
        let removed = change.end - change.start;
        if change.insert.len() >= removed {
            pos += change.insert.len() - removed;
        } else {
            pos = pos.saturating_sub(removed - change.insert.len());
        }
    }
    pos
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionKind {
    WikiLink,
    Callout,
}

/// An active completion trigger on the cursor's line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionContext {
    pub kind: CompletionKind,
    pub query: String,
    /// Byte offset just past the `[[` or `::` trigger. Applying a completion
    /// replaces `replace_from..cursor`.
    pub replace_from: usize,
}

/// Scans backwards from the cursor for a `[[query` or `::query` trigger on
/// the current line. A `]]` after the last `[[` means the link is already
/// closed and yields no context.
pub fn completion_context(text: &str, cursor: usize) -> Option<CompletionContext> {
    static RE_CALLOUT_TOKEN: OnceLock<Regex> = OnceLock::new();

    let cursor = clamp_to_char_boundary(text, cursor);
    let line_from = line_start(text, cursor);
    let line = &text[line_from..cursor];

    if let Some(idx) = line.rfind("[[") {
        let query = &line[idx + 2..];
        if !query.contains("]]") {
            return Some(CompletionContext {
                kind: CompletionKind::WikiLink,
                query: query.to_string(),
                replace_from: line_from + idx + 2,
            });
        }
    }

    let re = RE_CALLOUT_TOKEN.get_or_init(|| Regex::new(r"::(\w*)$").unwrap());
    if let Some(cap) = re.captures(line) {
        let token = cap.get(1)?;
        return Some(CompletionContext {
            kind: CompletionKind::Callout,
            query: token.as_str().to_string(),
            replace_from: line_from + token.start(),
        });
    }

    None
}

/// Builds the transaction that splices a completion over the active query and
/// parks the caret right after the insertion.
pub fn completion_transaction(
    snapshot: &EditorSnapshot,
    replace_from: usize,
    insert: &str,
) -> Transaction {
    let cursor = snapshot.selection.clamp(snapshot.text.len()).start;
    let from = replace_from.min(cursor);
    Transaction::single(
        TextChange::new(from, cursor, insert),
        Some(Selection::cursor(from + insert.len())),
        ChangeOrigin::Completion,
        "completion",
    )
}

/// Text spliced in when a wiki-link suggestion is accepted: the query sits
/// after a `[[`, so the insertion closes the brackets and appends the target.
pub fn wiki_link_insertion(link: &LinkSuggestion) -> String {
    format!("{}]]({})", link.title, link.url)
}

/// Text spliced in when a callout type is accepted after `::`.
pub fn callout_insertion(kind: CalloutKind) -> String {
    format!("{} ", kind.as_str())
}

fn line_start(text: &str, pos: usize) -> usize {
    let clamped = pos.min(text.len());
    text[..clamped].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

fn clamp_to_char_boundary(text: &str, pos: usize) -> usize {
    let mut pos = pos.min(text.len());
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Translates a textarea `selectionStart` (UTF-16 code units) into a byte
/// offset into the same string.
pub fn byte_offset_from_utf16(text: &str, utf16: usize) -> usize {
    let mut units = 0usize;
    for (byte_idx, ch) in text.char_indices() {
        if units >= utf16 {
            return byte_idx;
        }
        units += ch.len_utf16();
    }
    text.len()
}

/// Inverse of [`byte_offset_from_utf16`], for repositioning the caret.
pub fn utf16_offset_from_byte(text: &str, byte: usize) -> usize {
    let end = clamp_to_char_boundary(text, byte);
    text[..end].chars().map(char::len_utf16).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_multi_change_transaction() {
        let mut snapshot = EditorSnapshot::new("hello world".to_string());
        snapshot.set_selection(Selection::cursor(0));
        let transaction = Transaction {
            changes: vec![TextChange::new(0, 0, ">>"), TextChange::new(11, 11, "<<")],
            selection_after: Some(Selection::cursor(13)),
            origin: ChangeOrigin::System,
            label: "wrap",
        };

        let outcome = snapshot.apply_transaction(transaction).unwrap();
        assert!(outcome.text_changed);
        assert_eq!(snapshot.text, ">>hello world<<");
        assert_eq!(snapshot.selection, Selection::cursor(13));
        assert_eq!(snapshot.revision, 1);
    }

    #[test]
    fn maps_selection_through_changes_when_unspecified() {
        let mut snapshot = EditorSnapshot::new("abcdef".to_string());
        snapshot.set_selection(Selection::cursor(4));
        let transaction = Transaction::single(
            TextChange::new(1, 3, "XYZW"),
            None,
            ChangeOrigin::System,
            "swap",
        );

        snapshot.apply_transaction(transaction).unwrap();
        assert_eq!(snapshot.text, "aXYZWdef");
        // Cursor was past the replaced range and shifts by the growth.
        assert_eq!(snapshot.selection, Selection::cursor(6));
    }

    #[test]
    fn rejects_overlapping_changes() {
        let mut snapshot = EditorSnapshot::new("abcdef".to_string());
        let transaction = Transaction {
            changes: vec![TextChange::new(1, 4, "x"), TextChange::new(3, 5, "y")],
            selection_after: None,
            origin: ChangeOrigin::System,
            label: "bad",
        };
        assert!(matches!(
            snapshot.apply_transaction(transaction),
            Err(CoreError::OverlappingChanges { .. })
        ));
    }

    #[test]
    fn rejects_out_of_bounds_changes() {
        let mut snapshot = EditorSnapshot::new("ab".to_string());
        let transaction = Transaction::single(
            TextChange::new(1, 5, "x"),
            None,
            ChangeOrigin::System,
            "bad",
        );
        assert!(matches!(
            snapshot.apply_transaction(transaction),
            Err(CoreError::InvalidRange { .. })
        ));
    }

    #[test]
    fn input_replacement_bumps_revision_only_on_change() {
        let mut snapshot = EditorSnapshot::new("same".to_string());
        let outcome = snapshot.replace_from_input("same".to_string(), Selection::cursor(2));
        assert!(!outcome.text_changed);
        assert_eq!(snapshot.revision, 0);

        let outcome = snapshot.replace_from_input("changed".to_string(), Selection::cursor(7));
        assert!(outcome.text_changed);
        assert_eq!(snapshot.revision, 1);
    }

    #[test]
    fn detects_wiki_link_context() {
        let text = "see [[ho";
        let ctx = completion_context(text, text.len()).unwrap();
        assert_eq!(ctx.kind, CompletionKind::WikiLink);
        assert_eq!(ctx.query, "ho");
        assert_eq!(ctx.replace_from, 6);
    }

    #[test]
    fn closed_wiki_link_yields_no_context() {
        let text = "see [[home]] done";
        assert_eq!(completion_context(text, text.len()), None);
    }

    #[test]
    fn detects_callout_context() {
        let text = "::wa";
        let ctx = completion_context(text, text.len()).unwrap();
        assert_eq!(ctx.kind, CompletionKind::Callout);
        assert_eq!(ctx.query, "wa");
        assert_eq!(ctx.replace_from, 2);
    }

    #[test]
    fn callout_context_ends_at_non_word_characters() {
        // Once a space follows the type token the callout is underway and
        // completion stays out of the way.
        assert_eq!(completion_context("::warning be", 12), None);
    }

    #[test]
    fn context_is_scoped_to_the_cursor_line() {
        let text = "[[open\nplain";
        assert_eq!(completion_context(text, text.len()), None);
    }

    #[test]
    fn wiki_link_takes_precedence_over_callout() {
        let text = "x ::note [[ho";
        let ctx = completion_context(text, text.len()).unwrap();
        assert_eq!(ctx.kind, CompletionKind::WikiLink);
    }

    #[test]
    fn applies_wiki_link_completion() {
        let mut snapshot = EditorSnapshot::new("see [[ho".to_string());
        snapshot.set_selection(Selection::cursor(snapshot.text.len()));
        let ctx = completion_context(&snapshot.text, snapshot.selection.start).unwrap();
        let insert = wiki_link_insertion(&LinkSuggestion::new("Home", "http://x/home"));
        let transaction = completion_transaction(&snapshot, ctx.replace_from, &insert);
        assert_eq!(transaction.origin, ChangeOrigin::Completion);
        assert_eq!(transaction.label, "completion");

        snapshot.apply_transaction(transaction).unwrap();
        assert_eq!(snapshot.text, "see [[Home]](http://x/home)");
        assert_eq!(snapshot.selection, Selection::cursor(snapshot.text.len()));
    }

    #[test]
    fn applies_callout_completion() {
        let mut snapshot = EditorSnapshot::new("::wa".to_string());
        snapshot.set_selection(Selection::cursor(4));
        let ctx = completion_context(&snapshot.text, 4).unwrap();
        let insert = callout_insertion(CalloutKind::Warning);
        let transaction = completion_transaction(&snapshot, ctx.replace_from, &insert);

        snapshot.apply_transaction(transaction).unwrap();
        assert_eq!(snapshot.text, "::warning ");
        assert_eq!(snapshot.selection, Selection::cursor(10));
    }

    #[test]
    fn utf16_offsets_round_trip_through_multibyte_text() {
        let text = "a💡b";
        // '💡' is one surrogate pair: 2 UTF-16 units, 4 bytes.
        assert_eq!(byte_offset_from_utf16(text, 0), 0);
        assert_eq!(byte_offset_from_utf16(text, 1), 1);
        assert_eq!(byte_offset_from_utf16(text, 3), 5);
        assert_eq!(byte_offset_from_utf16(text, 4), 6);
        assert_eq!(utf16_offset_from_byte(text, 5), 3);
        assert_eq!(utf16_offset_from_byte(text, text.len()), 4);
    }
}
