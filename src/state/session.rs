use super::versioned::VersionedBuffer;
use crate::config::Tunables;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Editing,
    Previewing,
}

/// Orchestrates the edit surface: a live (uncommitted) edit value, the
/// versioned buffer behind it, and the Editing/Previewing mode switch.
///
/// Preview is entered when a debounce commit lands on non-empty content,
/// on an explicit preview action, on a large paste, or a short beat after
/// an AI insertion. Activating the rendered content returns to editing,
/// reseeding the live value from the committed document.
pub struct EditSession {
    buffer: VersionedBuffer,
    mode: SessionMode,
    pending_edit: String,
    preview_due: Option<Instant>,
    tunables: Tunables,
}

impl EditSession {
    pub fn new(initial: &str, tunables: Tunables) -> Self {
        Self {
            buffer: VersionedBuffer::new(initial, &tunables),
            mode: SessionMode::Editing,
            pending_edit: initial.to_string(),
            preview_due: None,
            tunables,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn buffer(&self) -> &VersionedBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut VersionedBuffer {
        &mut self.buffer
    }

    /// What the surface currently shows: the committed document while
    /// previewing, the live edit value while editing.
    pub fn rendered(&self) -> &str {
        match self.mode {
            SessionMode::Previewing => self.buffer.read(),
            SessionMode::Editing => &self.pending_edit,
        }
    }

    /// One keystroke's worth of change: replaces the live edit value and
    /// restarts the debounced commit.
    pub fn edit(&mut self, value: impl Into<String>) {
        self.pending_edit = value.into();
        self.buffer.write(self.pending_edit.clone(), true);
    }

    /// Pasted text extends the live value and commits immediately, so the
    /// paste is individually undoable. Large pastes jump straight to
    /// preview.
    pub fn paste(&mut self, text: &str) {
        self.pending_edit.push_str(text);
        self.buffer.write(self.pending_edit.clone(), false);
        if text.chars().count() > self.tunables.paste_preview_chars {
            self.mode = SessionMode::Previewing;
        }
    }

    pub fn preview_now(&mut self) {
        self.buffer.flush_pending();
        self.mode = SessionMode::Previewing;
    }

    /// User activation on the rendered content: back to editing, live
    /// value reseeded from the committed document.
    pub fn begin_editing(&mut self) {
        if self.mode == SessionMode::Previewing {
            self.pending_edit = self.buffer.read().to_string();
            self.mode = SessionMode::Editing;
        }
    }

    /// Merges a finished generation into the document: appended after a
    /// blank line (the reply never restates existing content), committed
    /// synchronously, with preview forced after a short fixed delay so the
    /// user sees the insertion land before the surface flips.
    pub fn insert_generated(&mut self, text: &str, now: Instant) {
        self.buffer.flush_pending();
        let mut next = self.buffer.read().to_string();
        if !next.is_empty() {
            next.push_str("\n\n");
        }
        next.push_str(text);

        self.buffer.write(next.clone(), false);
        self.pending_edit = next;
        self.preview_due = Some(now + self.tunables.preview_after_insert);
    }

    /// Advances the session's timers: applies a due debounce commit (which
    /// flips to preview when content is non-empty) and a due post-insert
    /// preview.
    pub fn tick(&mut self, now: Instant) {
        if self.buffer.poll_commit(now) && !self.buffer.read().is_empty() {
            self.mode = SessionMode::Previewing;
        }

        if let Some(due) = self.preview_due {
            if due <= now {
                self.preview_due = None;
                self.mode = SessionMode::Previewing;
            }
        }
    }

    /// Earliest instant at which `tick` has work to do; the driver sleeps
    /// until then.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.buffer.commit_deadline(), self.preview_due) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, b) => b,
        }
    }

    pub fn reset(&mut self, initial: &str) {
        self.buffer.reset(initial);
        self.pending_edit = initial.to_string();
        self.preview_due = None;
        self.mode = SessionMode::Editing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_tunables() -> Tunables {
        Tunables {
            debounce: Duration::from_millis(0),
            history_cap: 10,
            paste_preview_chars: 20,
            preview_after_insert: Duration::from_millis(0),
        }
    }

    #[test]
    fn test_starts_editing_with_seeded_value() {
        let session = EditSession::new("doc", test_tunables());
        assert_eq!(session.mode(), SessionMode::Editing);
        assert_eq!(session.rendered(), "doc");
    }

    #[test]
    fn test_debounce_commit_flips_to_preview() {
        let mut session = EditSession::new("", test_tunables());
        session.edit("hello");
        assert_eq!(session.mode(), SessionMode::Editing);

        session.tick(Instant::now());
        assert_eq!(session.mode(), SessionMode::Previewing);
        assert_eq!(session.rendered(), "hello");
    }

    #[test]
    fn test_debounce_commit_of_empty_content_stays_editing() {
        let mut session = EditSession::new("x", test_tunables());
        session.edit("");
        session.tick(Instant::now());
        assert_eq!(session.mode(), SessionMode::Editing);
    }

    #[test]
    fn test_small_paste_stays_editing_large_paste_previews() {
        let mut session = EditSession::new("", test_tunables());
        session.paste("tiny");
        assert_eq!(session.mode(), SessionMode::Editing);
        assert_eq!(session.buffer().read(), "tiny");

        session.paste(&"x".repeat(30));
        assert_eq!(session.mode(), SessionMode::Previewing);
    }

    #[test]
    fn test_begin_editing_seeds_live_value_from_buffer() {
        let mut session = EditSession::new("", test_tunables());
        session.edit("typed");
        session.preview_now();
        assert_eq!(session.rendered(), "typed");

        session.begin_editing();
        assert_eq!(session.mode(), SessionMode::Editing);
        assert_eq!(session.rendered(), "typed");
    }

    #[test]
    fn test_insert_generated_appends_after_blank_line() {
        let mut session = EditSession::new("intro", test_tunables());
        let now = Instant::now();
        session.insert_generated("generated part", now);

        assert_eq!(session.buffer().read(), "intro\n\ngenerated part");
        assert_eq!(session.mode(), SessionMode::Editing);

        session.tick(now);
        assert_eq!(session.mode(), SessionMode::Previewing);
    }

    #[test]
    fn test_insert_generated_into_empty_document_has_no_separator() {
        let mut session = EditSession::new("", test_tunables());
        session.insert_generated("fresh", Instant::now());
        assert_eq!(session.buffer().read(), "fresh");
    }

    #[test]
    fn test_insert_generated_is_individually_undoable() {
        let mut session = EditSession::new("intro", test_tunables());
        session.edit("intro edited");
        session.insert_generated("tail", Instant::now());

        assert!(session.buffer_mut().undo());
        assert_eq!(session.buffer().read(), "intro edited");
        assert!(session.buffer_mut().undo());
        assert_eq!(session.buffer().read(), "intro");
    }

    #[test]
    fn test_next_deadline_prefers_earliest_timer() {
        let tunables = Tunables {
            debounce: Duration::from_secs(60),
            preview_after_insert: Duration::from_secs(1),
            ..test_tunables()
        };
        let mut session = EditSession::new("", tunables);
        assert!(session.next_deadline().is_none());

        let now = Instant::now();
        session.insert_generated("a", now);
        session.edit("ab");
        let deadline = session.next_deadline().unwrap();
        assert_eq!(deadline, now + Duration::from_secs(1));
    }

    #[test]
    fn test_reset_returns_to_editing_and_drops_timers() {
        let mut session = EditSession::new("a", test_tunables());
        session.edit("ab");
        session.insert_generated("tail", Instant::now());
        session.reset("clean");

        assert_eq!(session.mode(), SessionMode::Editing);
        assert_eq!(session.rendered(), "clean");
        assert!(session.next_deadline().is_none());
        assert_eq!(session.buffer().history().len(), 1);
    }
}
