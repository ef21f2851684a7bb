//! Modal overlay coordination.
//!
//! Opening a dialog always moves focus and destroys the live selection, so
//! the coordinator snapshots the selection *before* the dialog shows and
//! restores it on submit or cancel. The browser also fires a spurious
//! empty-selection event as focus moves into a modal; the guard rule below
//! swallows it. The guard is modeled as an explicit state + timestamp
//! check, not as framework re-render timing, so it is unit-testable
//! independent of the wall clock.

use serde::Serialize;
use thiserror::Error;

use crate::Millis;
use crate::selection::Selection;

/// Default grace window after a modal closes during which selection events
/// are still ignored.
pub const DEFAULT_GUARD_MS: u64 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OverlayKind {
    Color,
    Link,
}

/// Exists only while an overlay is open; destroyed when it closes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModalSession {
    pub kind: OverlayKind,
    pub opened_at: Millis,
    pub saved_selection: Selection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OverlayState {
    Idle,
    ToolbarVisible { selection: Selection },
    ModalOpen { session: ModalSession },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OverlayError {
    #[error("no active selection to open an overlay for")]
    NoActiveSelection,
    #[error("no overlay is open")]
    NoOpenOverlay,
}

/// What a selection-change event did to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    ToolbarShown(Selection),
    ToolbarHidden,
    /// Swallowed by the modal guard; nothing may react to it.
    Ignored,
}

/// State machine `Idle -> ToolbarVisible -> ModalOpen` and back.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayCoordinator {
    state: OverlayState,
    guard_ms: u64,
    guard_until: Option<Millis>,
}

impl OverlayCoordinator {
    pub fn new(guard_ms: u64) -> Self {
        Self {
            state: OverlayState::Idle,
            guard_ms,
            guard_until: None,
        }
    }

    pub fn state(&self) -> &OverlayState {
        &self.state
    }

    pub fn is_modal_open(&self) -> bool {
        matches!(self.state, OverlayState::ModalOpen { .. })
    }

    pub fn modal_session(&self) -> Option<&ModalSession> {
        match &self.state {
            OverlayState::ModalOpen { session } => Some(session),
            _ => None,
        }
    }

    /// The selection the toolbar is associated with, if it is visible.
    pub fn toolbar_selection(&self) -> Option<Selection> {
        match &self.state {
            OverlayState::ToolbarVisible { selection } => Some(*selection),
            _ => None,
        }
    }

    /// The critical section: while a modal is open, or within the grace
    /// window after it closed, selection-driven side effects are suppressed.
    pub fn is_guarded(&self, now: Millis) -> bool {
        self.is_modal_open() || self.guard_until.is_some_and(|until| now < until)
    }

    /// Feeds a (possibly empty) selection change into the machine.
    ///
    /// Guarded events are ignored wholesale; a non-empty selection shows
    /// the toolbar, anything else hides it.
    pub fn selection_changed(
        &mut self,
        now: Millis,
        selection: Option<Selection>,
    ) -> SelectionOutcome {
        if self.is_guarded(now) {
            log::debug!("selection change at {now}ms ignored by modal guard");
            return SelectionOutcome::Ignored;
        }
        match selection {
            Some(sel) if !sel.is_empty() => {
                self.state = OverlayState::ToolbarVisible { selection: sel };
                SelectionOutcome::ToolbarShown(sel)
            }
            _ => {
                self.state = OverlayState::Idle;
                SelectionOutcome::ToolbarHidden
            }
        }
    }

    /// Opens a modal for the toolbar's selection, snapshotting the
    /// selection before any focus change can destroy it.
    pub fn open_modal(
        &mut self,
        now: Millis,
        kind: OverlayKind,
    ) -> Result<ModalSession, OverlayError> {
        let OverlayState::ToolbarVisible { selection } = self.state else {
            return Err(OverlayError::NoActiveSelection);
        };
        let session = ModalSession {
            kind,
            opened_at: now,
            saved_selection: selection,
        };
        self.state = OverlayState::ModalOpen {
            session: session.clone(),
        };
        log::debug!("modal {kind:?} opened at {now}ms");
        Ok(session)
    }

    /// Closes the modal on submit. Returns the session so the caller can
    /// restore the saved selection and apply the pending format to it.
    pub fn submit_modal(&mut self, now: Millis) -> Result<ModalSession, OverlayError> {
        self.close_modal(now)
    }

    /// Closes the modal without applying anything. The saved selection is
    /// still returned so the caller can restore it.
    pub fn cancel_modal(&mut self, now: Millis) -> Result<ModalSession, OverlayError> {
        self.close_modal(now)
    }

    /// Hides the toolbar (`ToolbarVisible -> Idle`), e.g. after a pending
    /// format has been applied.
    pub fn dismiss(&mut self) {
        self.state = OverlayState::Idle;
    }

    fn close_modal(&mut self, now: Millis) -> Result<ModalSession, OverlayError> {
        let OverlayState::ModalOpen { session } = std::mem::replace(&mut self.state, OverlayState::Idle)
        else {
            return Err(OverlayError::NoOpenOverlay);
        };
        // Back to ToolbarVisible on the saved selection, with the grace
        // window armed against the focus-return selection events
        self.state = OverlayState::ToolbarVisible {
            selection: session.saved_selection,
        };
        self.guard_until = Some(now + self.guard_ms);
        log::debug!("modal closed at {now}ms, guard until {:?}", self.guard_until);
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shown(c: &mut OverlayCoordinator, now: Millis, range: (usize, usize)) {
        let sel = Selection::new(range.0, range.1);
        assert_eq!(
            c.selection_changed(now, Some(sel)),
            SelectionOutcome::ToolbarShown(sel)
        );
    }

    #[test]
    fn non_empty_selection_shows_toolbar() {
        let mut c = OverlayCoordinator::new(DEFAULT_GUARD_MS);
        shown(&mut c, 0, (2, 7));
        assert_eq!(c.toolbar_selection(), Some(Selection::new(2, 7)));
    }

    #[test]
    fn collapsed_selection_never_shows_toolbar() {
        let mut c = OverlayCoordinator::new(DEFAULT_GUARD_MS);
        assert_eq!(
            c.selection_changed(0, Some(Selection::caret(4))),
            SelectionOutcome::ToolbarHidden
        );
        assert_eq!(c.toolbar_selection(), None);
    }

    #[test]
    fn open_modal_requires_a_toolbar_selection() {
        let mut c = OverlayCoordinator::new(DEFAULT_GUARD_MS);
        assert_eq!(
            c.open_modal(0, OverlayKind::Link).unwrap_err(),
            OverlayError::NoActiveSelection
        );
    }

    #[test]
    fn open_modal_snapshots_the_selection() {
        let mut c = OverlayCoordinator::new(DEFAULT_GUARD_MS);
        shown(&mut c, 0, (2, 7));
        let session = c.open_modal(10, OverlayKind::Color).unwrap();
        assert_eq!(session.saved_selection, Selection::new(2, 7));
        assert_eq!(session.opened_at, 10);
    }

    #[test]
    fn selection_events_during_modal_are_ignored() {
        let mut c = OverlayCoordinator::new(DEFAULT_GUARD_MS);
        shown(&mut c, 0, (2, 7));
        c.open_modal(10, OverlayKind::Color).unwrap();

        // The spurious empty-selection event as focus moves into the modal
        assert_eq!(c.selection_changed(11, None), SelectionOutcome::Ignored);
        assert!(c.is_modal_open(), "guard race: modal must stay open");

        let session = c.submit_modal(20).unwrap();
        assert_eq!(session.saved_selection, Selection::new(2, 7));
        assert_eq!(c.toolbar_selection(), Some(Selection::new(2, 7)));
    }

    #[test]
    fn grace_window_swallows_events_after_close() {
        let mut c = OverlayCoordinator::new(400);
        shown(&mut c, 0, (2, 7));
        c.open_modal(10, OverlayKind::Link).unwrap();
        c.cancel_modal(100).unwrap();

        assert_eq!(c.selection_changed(150, None), SelectionOutcome::Ignored);
        assert_eq!(c.selection_changed(499, None), SelectionOutcome::Ignored);
        assert_eq!(c.toolbar_selection(), Some(Selection::new(2, 7)));

        // Window over: events flow again
        assert_eq!(c.selection_changed(500, None), SelectionOutcome::ToolbarHidden);
        assert_eq!(c.toolbar_selection(), None);
    }

    #[test]
    fn dismiss_returns_to_idle() {
        let mut c = OverlayCoordinator::new(DEFAULT_GUARD_MS);
        shown(&mut c, 0, (1, 3));
        c.dismiss();
        assert_eq!(*c.state(), OverlayState::Idle);
    }

    #[test]
    fn closing_without_a_modal_is_an_error() {
        let mut c = OverlayCoordinator::new(DEFAULT_GUARD_MS);
        assert_eq!(c.submit_modal(0).unwrap_err(), OverlayError::NoOpenOverlay);
    }
}
