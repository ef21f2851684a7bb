//! The editable surface: composition root for the annotation engine.
//!
//! Owns the persisted content and the view/edit mode, wires the selection
//! tracker, toggle engine, serializer, toolbar and overlay coordinator
//! together, and exposes the save/cancel contracts to the external
//! persistence collaborator. Observers register through an explicit
//! subscription interface owned by the surface instance and torn down
//! deterministically, never through a process-global listener set.

use uuid::Uuid;

use crate::Millis;
use crate::editing::{Cmd, EditPatch, SpanDoc};
use crate::geom::{Rect, Size};
use crate::overlay::{OverlayCoordinator, OverlayKind, SelectionOutcome};
use crate::registry::FormatId;
use crate::selection::{self, Selection, SurfaceLayout};
use crate::serialize;
use crate::toggle::{self, ToggleError};
use crate::toolbar::{Debouncer, ToolbarState, compute_position};

/// External persistence collaborator: receives the serialized content on
/// every save.
pub trait SaveSink {
    fn save(&mut self, content: &str) -> anyhow::Result<()>;
}

/// Host clipboard. May fail on hosts without clipboard permissions; the
/// surface degrades instead of propagating the failure.
pub trait Clipboard {
    fn set_text(&mut self, text: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Mode {
    Viewing,
    Editing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    ModeChanged(Mode),
    ContentChanged { version: u64 },
    Saved,
    /// User-visible, non-fatal notice ("select text first").
    Notice(String),
}

#[derive(Debug, Clone)]
pub struct SurfaceOptions {
    /// Stay in `Editing` after a save to support rapid successive edits.
    pub keep_editing_after_save: bool,
    /// Scheme prefixed onto bare-host URLs in the link dialog.
    pub default_link_scheme: String,
    pub toolbar_debounce_ms: u64,
    pub modal_guard_ms: u64,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            keep_editing_after_save: false,
            default_link_scheme: "https".to_string(),
            toolbar_debounce_ms: crate::toolbar::DEFAULT_DEBOUNCE_MS,
            modal_guard_ms: crate::overlay::DEFAULT_GUARD_MS,
        }
    }
}

/// Keyboard surface: Escape cancels, the chorded save shortcut commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKey {
    Escape,
    SaveChord,
}

/// What `apply_format` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatRequest {
    Applied,
    /// The format needs a dialog; the selection is snapshotted and the
    /// caller should show the modal for this kind.
    ModalOpened(OverlayKind),
    /// Nothing happened; a notice was emitted.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied,
    /// Clipboard unavailable: the caller should leave the text selected so
    /// the user can copy manually.
    ManualFallback,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ModalSubmitError {
    #[error("not a valid URL: {0}")]
    InvalidUrl(String),
    #[error("enter a value")]
    EmptyValue,
    #[error("no overlay is open")]
    NoOpenOverlay,
}

/// Handle for one registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

type Subscriber = Box<dyn FnMut(&SurfaceEvent)>;

/// One editable surface instance.
///
/// The surface exclusively owns its content and mode; the live form exists
/// only while editing, and only the toggle engine and the serializer ever
/// mutate it.
pub struct EditableSurface {
    persisted: String,
    doc: Option<SpanDoc>,
    mode: Mode,
    opts: SurfaceOptions,
    overlay: OverlayCoordinator,
    debounce: Debouncer,
    toolbar: Option<ToolbarState>,
    pending_format: Option<FormatId>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
}

impl EditableSurface {
    pub fn new(content: String, opts: SurfaceOptions) -> Self {
        let overlay = OverlayCoordinator::new(opts.modal_guard_ms);
        let debounce = Debouncer::new(opts.toolbar_debounce_ms);
        Self {
            persisted: content,
            doc: None,
            mode: Mode::Viewing,
            opts,
            overlay,
            debounce,
            toolbar: None,
            pending_format: None,
            subscribers: Vec::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The persisted string form (authoritative while viewing).
    pub fn content(&self) -> &str {
        &self.persisted
    }

    /// The live form, present while editing.
    pub fn doc(&self) -> Option<&SpanDoc> {
        self.doc.as_ref()
    }

    /// A live form for rendering the view mode. Built fresh on demand; the
    /// surface never holds both representations at once.
    pub fn display_doc(&self) -> SpanDoc {
        serialize::to_live(&self.persisted)
    }

    pub fn toolbar_state(&self) -> Option<&ToolbarState> {
        self.toolbar.as_ref()
    }

    pub fn is_modal_open(&self) -> bool {
        self.overlay.is_modal_open()
    }

    /// The format awaiting a modal value (distinguishes text color from
    /// background color while the color picker is open).
    pub fn pending_format(&self) -> Option<FormatId> {
        self.pending_format
    }

    // ---- mode transitions ----

    /// Enters edit mode, deserializing the persisted content. When entered
    /// via a pointer click, the caret is restored at the captured offset.
    pub fn enter_edit(&mut self, click_offset: Option<usize>) {
        if self.mode == Mode::Editing {
            return;
        }
        let mut doc = serialize::to_live(&self.persisted);
        if let Some(offset) = click_offset {
            selection::restore_cursor(&mut doc, offset);
        }
        self.doc = Some(doc);
        self.mode = Mode::Editing;
        self.emit(&SurfaceEvent::ModeChanged(Mode::Editing));
    }

    /// Discards pending edits and returns to view mode.
    pub fn cancel(&mut self) {
        if self.mode == Mode::Viewing {
            return;
        }
        self.teardown_edit_state();
        self.emit(&SurfaceEvent::ModeChanged(Mode::Viewing));
    }

    /// Serializes the live form and hands it to the save collaborator.
    /// Stays in edit mode when `keep_editing_after_save` is set.
    pub fn save(&mut self, sink: &mut dyn SaveSink) -> anyhow::Result<()> {
        let Some(doc) = &self.doc else {
            anyhow::bail!("no edit in progress");
        };
        let content = serialize::to_persisted(doc);
        sink.save(&content)?;
        self.persisted = content;
        self.emit(&SurfaceEvent::Saved);
        if !self.opts.keep_editing_after_save {
            self.teardown_edit_state();
            self.emit(&SurfaceEvent::ModeChanged(Mode::Viewing));
        }
        Ok(())
    }

    pub fn handle_key(&mut self, now: Millis, key: EditKey, sink: &mut dyn SaveSink) -> anyhow::Result<()> {
        match key {
            EditKey::Escape => {
                if self.overlay.is_modal_open() {
                    self.cancel_modal(now);
                } else {
                    self.cancel();
                }
                Ok(())
            }
            EditKey::SaveChord => self.save(sink),
        }
    }

    // ---- selection and toolbar ----

    /// Feeds a raw anchor/focus selection change (or a selection loss) into
    /// the engine. Events arriving inside the modal guard window are
    /// ignored wholesale.
    pub fn selection_changed(
        &mut self,
        now: Millis,
        raw: Option<(usize, usize)>,
    ) -> SelectionOutcome {
        let Some(doc) = &mut self.doc else {
            return SelectionOutcome::Ignored;
        };
        if self.overlay.is_guarded(now) {
            return SelectionOutcome::Ignored;
        }
        let sel = raw.and_then(|(anchor, focus)| {
            selection::normalize_selection(doc.len(), anchor, focus)
        });
        if let Some(sel) = sel {
            doc.set_selection(sel.as_range());
        }
        let outcome = self.overlay.selection_changed(now, sel);
        match &outcome {
            SelectionOutcome::ToolbarShown(_) => self.debounce.note_event(now),
            SelectionOutcome::ToolbarHidden => {
                self.toolbar = None;
                self.debounce.cancel();
            }
            SelectionOutcome::Ignored => {}
        }
        outcome
    }

    /// Drives the debounced toolbar positioning. Call once per frame (or on
    /// a timer); positioning is computed once per settled selection, not on
    /// every intermediate event of a drag.
    pub fn position_toolbar(
        &mut self,
        now: Millis,
        layout: &SurfaceLayout,
        toolbar_size: Size,
        viewport: Size,
    ) -> Option<&ToolbarState> {
        if self.debounce.poll(now)
            && let Some(sel) = self.overlay.toolbar_selection()
            && let Some(anchor) = selection_rect(layout, sel)
        {
            let position = compute_position(anchor, toolbar_size, viewport);
            self.toolbar = Some(ToolbarState {
                visible: true,
                anchor,
                position,
            });
        }
        self.toolbar.as_ref()
    }

    // ---- formatting ----

    /// The formatting callback shared by both toolbars:
    /// `applyFormat(formatId, value)`.
    ///
    /// Valued formats without a value open their modal; everything else
    /// toggles immediately. Failures surface as notices, never as panics or
    /// propagated errors.
    pub fn apply_format(&mut self, now: Millis, format_id: &str, value: Option<&str>) -> FormatRequest {
        let id = match format_id.parse::<FormatId>() {
            Ok(id) => id,
            Err(err) => {
                log::warn!("{err}");
                self.emit(&SurfaceEvent::Notice(format!(
                    "Unknown format: {format_id}"
                )));
                return FormatRequest::Rejected;
            }
        };

        if id.requires_value() && value.is_none() {
            let kind = match id {
                FormatId::Link => OverlayKind::Link,
                _ => OverlayKind::Color,
            };
            return match self.overlay.open_modal(now, kind) {
                Ok(_) => {
                    self.pending_format = Some(id);
                    FormatRequest::ModalOpened(kind)
                }
                Err(_) => {
                    self.notice_no_selection();
                    FormatRequest::Rejected
                }
            };
        }

        self.toggle_on_current_selection(id, value)
    }

    /// Submits the open modal with the user's value.
    ///
    /// Validation happens before the modal closes: an invalid URL or empty
    /// color leaves the dialog open and the live tree untouched.
    pub fn submit_modal(&mut self, now: Millis, value: &str) -> Result<(), ModalSubmitError> {
        if !self.overlay.is_modal_open() {
            return Err(ModalSubmitError::NoOpenOverlay);
        }
        match self.pending_format {
            Some(FormatId::Link) => {
                toggle::normalize_url(Some(value), &self.opts.default_link_scheme)
                    .map_err(|_| ModalSubmitError::InvalidUrl(value.to_string()))?;
            }
            _ => {
                if value.trim().is_empty() {
                    return Err(ModalSubmitError::EmptyValue);
                }
            }
        }

        let session = self
            .overlay
            .submit_modal(now)
            .map_err(|_| ModalSubmitError::NoOpenOverlay)?;
        if let Some(doc) = &mut self.doc {
            doc.set_selection(session.saved_selection.as_range());
        }
        if let Some(id) = self.pending_format.take() {
            self.toggle_on_current_selection(id, Some(value));
        }
        self.overlay.dismiss();
        self.toolbar = None;
        Ok(())
    }

    /// Closes the open modal without applying, restoring the saved
    /// selection.
    pub fn cancel_modal(&mut self, now: Millis) {
        if let Ok(session) = self.overlay.cancel_modal(now) {
            if let Some(doc) = &mut self.doc {
                doc.set_selection(session.saved_selection.as_range());
            }
        }
        self.pending_format = None;
        self.overlay.dismiss();
        self.toolbar = None;
    }

    // ---- plain text editing ----

    /// Applies a text edit command to the live form.
    pub fn edit(&mut self, cmd: Cmd) -> Option<EditPatch> {
        let doc = self.doc.as_mut()?;
        let patch = doc.apply(cmd);
        let version = patch.version;
        self.emit(&SurfaceEvent::ContentChanged { version });
        Some(patch)
    }

    // ---- clipboard ----

    /// Copies the selected text. Clipboard failures degrade to a manual
    /// text-selection fallback and never escape.
    pub fn copy_selection(&self, clipboard: &mut dyn Clipboard) -> CopyOutcome {
        let Some(doc) = &self.doc else {
            return CopyOutcome::ManualFallback;
        };
        let sel = doc.selection();
        if sel.is_empty() {
            return CopyOutcome::ManualFallback;
        }
        let text = doc.slice(sel).into_owned();
        match clipboard.set_text(&text) {
            Ok(()) => CopyOutcome::Copied,
            Err(err) => {
                log::warn!("clipboard copy failed, falling back to manual selection: {err}");
                CopyOutcome::ManualFallback
            }
        }
    }

    // ---- subscriptions ----

    /// Registers an observer for surface events.
    pub fn subscribe(&mut self, f: impl FnMut(&SurfaceEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(Uuid::new_v4());
        self.subscribers.push((id, Box::new(f)));
        id
    }

    /// Removes an observer. Returns false if the id was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    // ---- internals ----

    fn toggle_on_current_selection(&mut self, id: FormatId, value: Option<&str>) -> FormatRequest {
        let Some(doc) = &mut self.doc else {
            self.notice_no_selection();
            return FormatRequest::Rejected;
        };
        let selection = Selection::from(doc.selection());
        match toggle::toggle(doc, selection, id, value, &self.opts.default_link_scheme) {
            Ok(patch) => {
                let version = patch.version;
                self.emit(&SurfaceEvent::ContentChanged { version });
                FormatRequest::Applied
            }
            Err(ToggleError::NoSelection) => {
                self.notice_no_selection();
                FormatRequest::Rejected
            }
            Err(err) => {
                self.emit(&SurfaceEvent::Notice(err.to_string()));
                FormatRequest::Rejected
            }
        }
    }

    fn notice_no_selection(&mut self) {
        self.emit(&SurfaceEvent::Notice("Select text first".to_string()));
    }

    fn teardown_edit_state(&mut self) {
        self.doc = None;
        self.mode = Mode::Viewing;
        self.overlay = OverlayCoordinator::new(self.opts.modal_guard_ms);
        self.debounce.cancel();
        self.toolbar = None;
        self.pending_format = None;
    }

    fn emit(&mut self, event: &SurfaceEvent) {
        for (_, subscriber) in &mut self.subscribers {
            subscriber(event);
        }
    }
}

/// Bounding rect of a selection in the current layout: the union of the
/// caret slots at its two ends.
pub fn selection_rect(layout: &SurfaceLayout, sel: Selection) -> Option<Rect> {
    let a = layout.caret_rect(sel.start)?;
    let b = layout.caret_rect(sel.end)?;
    let x0 = a.x.min(b.x);
    let y0 = a.y.min(b.y);
    let x1 = a.right().max(b.right());
    let y1 = a.bottom().max(b.bottom());
    Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct MemorySink {
        saved: Vec<String>,
        fail: bool,
    }

    impl MemorySink {
        fn new() -> Self {
            Self {
                saved: Vec::new(),
                fail: false,
            }
        }
    }

    impl SaveSink for MemorySink {
        fn save(&mut self, content: &str) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("sink unavailable");
            }
            self.saved.push(content.to_string());
            Ok(())
        }
    }

    struct FailingClipboard;
    impl Clipboard for FailingClipboard {
        fn set_text(&mut self, _text: &str) -> anyhow::Result<()> {
            anyhow::bail!("no clipboard permission")
        }
    }

    struct WorkingClipboard(Option<String>);
    impl Clipboard for WorkingClipboard {
        fn set_text(&mut self, text: &str) -> anyhow::Result<()> {
            self.0 = Some(text.to_string());
            Ok(())
        }
    }

    fn surface(content: &str) -> EditableSurface {
        EditableSurface::new(content.to_string(), SurfaceOptions::default())
    }

    fn collect_events(s: &mut EditableSurface) -> Rc<RefCell<Vec<SurfaceEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        s.subscribe(move |e| sink.borrow_mut().push(e.clone()));
        events
    }

    #[test]
    fn enter_edit_restores_click_offset() {
        let mut s = surface("Hello");
        s.enter_edit(Some(3));
        assert_eq!(s.mode(), Mode::Editing);
        assert_eq!(s.doc().map(|d| d.selection()), Some(3..3));
    }

    #[test]
    fn escape_discards_pending_edits() {
        let mut s = surface("Hello");
        let mut sink = MemorySink::new();
        s.enter_edit(None);
        s.selection_changed(0, Some((0, 5)));
        s.apply_format(0, "bold", None);
        s.handle_key(10, EditKey::Escape, &mut sink).unwrap();
        assert_eq!(s.mode(), Mode::Viewing);
        assert_eq!(s.content(), "Hello");
        assert!(sink.saved.is_empty());
    }

    #[test]
    fn save_chord_commits_through_the_sink() {
        let mut s = surface("Hello world");
        let mut sink = MemorySink::new();
        s.enter_edit(None);
        s.selection_changed(0, Some((6, 11)));
        s.apply_format(0, "bold", None);
        s.handle_key(10, EditKey::SaveChord, &mut sink).unwrap();
        assert_eq!(sink.saved, vec!["Hello <strong>world</strong>".to_string()]);
        assert_eq!(s.content(), "Hello <strong>world</strong>");
        assert_eq!(s.mode(), Mode::Viewing);
    }

    #[test]
    fn keep_editing_after_save_stays_in_edit_mode() {
        let mut s = EditableSurface::new(
            "Hello".to_string(),
            SurfaceOptions {
                keep_editing_after_save: true,
                ..SurfaceOptions::default()
            },
        );
        let mut sink = MemorySink::new();
        s.enter_edit(None);
        s.save(&mut sink).unwrap();
        assert_eq!(s.mode(), Mode::Editing);
        assert!(s.doc().is_some());
    }

    #[test]
    fn failed_save_keeps_the_edit_session() {
        let mut s = surface("Hello");
        let mut sink = MemorySink::new();
        sink.fail = true;
        s.enter_edit(None);
        assert!(s.save(&mut sink).is_err());
        assert_eq!(s.mode(), Mode::Editing);
    }

    #[test]
    fn format_without_selection_emits_notice() {
        let mut s = surface("Hello");
        let events = collect_events(&mut s);
        s.enter_edit(None);
        let outcome = s.apply_format(0, "bold", None);
        assert_eq!(outcome, FormatRequest::Rejected);
        assert!(
            events
                .borrow()
                .iter()
                .any(|e| matches!(e, SurfaceEvent::Notice(n) if n == "Select text first"))
        );
    }

    #[test]
    fn unknown_format_id_is_a_notice_not_a_panic() {
        let mut s = surface("Hello");
        s.enter_edit(None);
        assert_eq!(s.apply_format(0, "blink", None), FormatRequest::Rejected);
    }

    #[test]
    fn modal_flow_applies_to_the_saved_selection() {
        let mut s = surface("Hello world");
        s.enter_edit(None);
        s.selection_changed(0, Some((6, 11)));
        let outcome = s.apply_format(10, "color", None);
        assert_eq!(outcome, FormatRequest::ModalOpened(OverlayKind::Color));

        // The spurious selection-loss event while the modal is open
        s.selection_changed(20, None);
        assert!(s.is_modal_open());

        s.submit_modal(30, "red").unwrap();
        let doc = s.doc().expect("still editing");
        assert_eq!(doc.spans().len(), 1);
        assert_eq!(doc.spans()[0].range, 6..11);
    }

    #[test]
    fn invalid_url_keeps_the_modal_open() {
        let mut s = surface("Hello world");
        s.enter_edit(None);
        s.selection_changed(0, Some((6, 11)));
        s.apply_format(10, "link", None);
        let err = s.submit_modal(20, "two words").unwrap_err();
        assert!(matches!(err, ModalSubmitError::InvalidUrl(_)));
        assert!(s.is_modal_open(), "dialog must stay open");
        assert!(s.doc().map(|d| d.spans().is_empty()).unwrap_or(false));
    }

    #[test]
    fn link_modal_inserts_markdown_literal() {
        let mut s = surface("Hello world");
        s.enter_edit(None);
        s.selection_changed(0, Some((6, 11)));
        s.apply_format(10, "link", None);
        s.submit_modal(20, "example.com").unwrap();
        assert_eq!(
            s.doc().map(|d| d.text()),
            Some("Hello [world](https://example.com)".to_string())
        );
    }

    #[test]
    fn cancel_modal_restores_selection_without_applying() {
        let mut s = surface("Hello world");
        s.enter_edit(None);
        s.selection_changed(0, Some((6, 11)));
        s.apply_format(10, "color", None);
        s.cancel_modal(20);
        let doc = s.doc().expect("still editing");
        assert!(doc.spans().is_empty());
        assert_eq!(doc.selection(), 6..11);
    }

    #[test]
    fn typing_flows_through_edit_commands() {
        let mut s = surface("Hello");
        let events = collect_events(&mut s);
        s.enter_edit(Some(5));
        s.edit(Cmd::InsertText {
            at: 5,
            text: "!".to_string(),
        });
        assert_eq!(s.doc().map(|d| d.text()), Some("Hello!".to_string()));
        assert!(
            events
                .borrow()
                .iter()
                .any(|e| matches!(e, SurfaceEvent::ContentChanged { .. }))
        );
    }

    #[test]
    fn clipboard_failure_degrades_to_manual_fallback() {
        let mut s = surface("Hello world");
        s.enter_edit(None);
        s.selection_changed(0, Some((0, 5)));
        assert_eq!(
            s.copy_selection(&mut FailingClipboard),
            CopyOutcome::ManualFallback
        );
        let mut ok = WorkingClipboard(None);
        assert_eq!(s.copy_selection(&mut ok), CopyOutcome::Copied);
        assert_eq!(ok.0.as_deref(), Some("Hello"));
    }

    #[test]
    fn unsubscribe_tears_down_deterministically() {
        let mut s = surface("Hello");
        let events = collect_events(&mut s);
        let count = Rc::new(RefCell::new(0));
        let c = Rc::clone(&count);
        let id = s.subscribe(move |_| *c.borrow_mut() += 1);

        s.enter_edit(None);
        assert_eq!(*count.borrow(), 1);
        assert!(s.unsubscribe(id));
        s.cancel();
        assert_eq!(*count.borrow(), 1, "unsubscribed observer must not fire");
        assert!(!s.unsubscribe(id), "double unsubscribe reports false");
        assert!(events.borrow().len() >= 2, "remaining observer still fires");
    }

    #[test]
    fn toolbar_positions_after_debounce_settles() {
        let mut s = surface("Hello world");
        s.enter_edit(None);
        let layout = SurfaceLayout {
            runs: vec![crate::selection::TextRun {
                start: 0,
                rect: Rect::new(0.0, 100.0, 11.0, 1.0),
                glyphs: "Hello world"
                    .chars()
                    .map(|c| crate::selection::Glyph {
                        byte_len: c.len_utf8(),
                        advance: 1.0,
                    })
                    .collect(),
            }],
        };
        let toolbar = Size::new(4.0, 1.0);
        let viewport = Size::new(80.0, 200.0);

        s.selection_changed(0, Some((6, 11)));
        // Mid-drag: debounce hasn't settled yet
        assert!(s.position_toolbar(10, &layout, toolbar, viewport).is_none());
        // Settled
        let state = s
            .position_toolbar(100, &layout, toolbar, viewport)
            .expect("toolbar positioned");
        assert!(state.visible);
        assert_eq!(state.anchor.y, 100.0);
    }
}
