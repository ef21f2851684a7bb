//! Floating toolbar placement and event coalescing.
//!
//! `compute_position` is a pure function of the selection rect, the toolbar
//! size and the viewport — no hidden global state — so it is independently
//! testable. The debouncer is the system's only scheduled unit of work; it
//! runs on explicit caller-supplied timestamps, is rescheduled on every new
//! qualifying event (last-write-wins), and is cancelled on teardown.

use serde::{Deserialize, Serialize};

use crate::Millis;
use crate::geom::{Rect, Size};

/// Gap between the selection rect and the toolbar.
pub const TOOLBAR_MARGIN: f32 = 8.0;

/// Default coalescing delay for selection-change and key-up events.
pub const DEFAULT_DEBOUNCE_MS: u64 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolbarPosition {
    pub x: f32,
    pub y: f32,
    pub placement: Placement,
}

/// Derived toolbar state; recomputed on every qualifying selection change,
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolbarState {
    pub visible: bool,
    pub anchor: Rect,
    pub position: ToolbarPosition,
}

/// Computes the on-screen placement for the floating toolbar.
///
/// Preference order: centered above the selection with a fixed margin,
/// clamped horizontally into the viewport; below the selection when there
/// is not enough room above; clamped into the nearest valid bound when
/// neither placement fits. The returned rect never extends beyond
/// `[0, viewport]` on either axis.
pub fn compute_position(selection_rect: Rect, toolbar: Size, viewport: Size) -> ToolbarPosition {
    let max_x = (viewport.width - toolbar.width).max(0.0);
    let max_y = (viewport.height - toolbar.height).max(0.0);

    let centered_x = selection_rect.x + selection_rect.width / 2.0 - toolbar.width / 2.0;
    let x = centered_x.clamp(0.0, max_x);

    let above_y = selection_rect.y - TOOLBAR_MARGIN - toolbar.height;
    if above_y >= 0.0 {
        return ToolbarPosition {
            x,
            y: above_y.min(max_y),
            placement: Placement::Above,
        };
    }

    let below_y = selection_rect.bottom() + TOOLBAR_MARGIN;
    ToolbarPosition {
        x,
        y: below_y.clamp(0.0, max_y),
        placement: Placement::Below,
    }
}

/// Coalesces bursts of events into one deadline.
///
/// Every `note_event` pushes the deadline out; `poll` fires at most once
/// per settled burst. Timestamps are caller-supplied milliseconds, so tests
/// drive this without a wall clock.
#[derive(Debug, Clone, PartialEq)]
pub struct Debouncer {
    delay_ms: u64,
    deadline: Option<Millis>,
}

impl Debouncer {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            deadline: None,
        }
    }

    /// Schedules (or reschedules) the deadline `delay_ms` after `now`.
    pub fn note_event(&mut self, now: Millis) {
        self.deadline = Some(now + self.delay_ms);
    }

    /// True once the deadline has passed; clears it so the burst fires once.
    pub fn poll(&mut self, now: Millis) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Cancels any scheduled work. Called on surface teardown so a late
    /// poll cannot act on a destroyed surface.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn toolbar() -> Size {
        Size::new(120.0, 24.0)
    }

    fn viewport() -> Size {
        Size::new(800.0, 600.0)
    }

    #[test]
    fn prefers_centered_above_the_selection() {
        let sel = Rect::new(300.0, 200.0, 100.0, 16.0);
        let pos = compute_position(sel, toolbar(), viewport());
        assert_eq!(pos.placement, Placement::Above);
        assert_eq!(pos.x, 290.0);
        assert_eq!(pos.y, 200.0 - TOOLBAR_MARGIN - 24.0);
    }

    #[test]
    fn clamps_horizontally_at_the_left_edge() {
        let sel = Rect::new(2.0, 200.0, 10.0, 16.0);
        let pos = compute_position(sel, toolbar(), viewport());
        assert_eq!(pos.x, 0.0);
    }

    #[test]
    fn clamps_horizontally_at_the_right_edge() {
        let sel = Rect::new(780.0, 200.0, 18.0, 16.0);
        let pos = compute_position(sel, toolbar(), viewport());
        assert_eq!(pos.x, 800.0 - 120.0);
    }

    #[test]
    fn falls_below_when_no_room_above() {
        let sel = Rect::new(300.0, 10.0, 100.0, 16.0);
        let pos = compute_position(sel, toolbar(), viewport());
        assert_eq!(pos.placement, Placement::Below);
        assert_eq!(pos.y, 26.0 + TOOLBAR_MARGIN);
    }

    #[test]
    fn clamps_vertically_when_neither_placement_fits() {
        let tiny = Size::new(200.0, 30.0);
        let sel = Rect::new(0.0, 5.0, 200.0, 20.0);
        let pos = compute_position(sel, toolbar(), tiny);
        assert_eq!(pos.y, 30.0 - 24.0);
    }

    #[rstest]
    #[case(Rect::new(0.0, 0.0, 0.0, 0.0))]
    #[case(Rect::new(-50.0, -50.0, 10.0, 10.0))]
    #[case(Rect::new(790.0, 590.0, 100.0, 100.0))]
    #[case(Rect::new(400.0, 300.0, 1.0, 1.0))]
    #[case(Rect::new(0.0, 599.0, 800.0, 1.0))]
    fn toolbar_never_escapes_the_viewport(#[case] sel: Rect) {
        let (tb, vp) = (toolbar(), viewport());
        let pos = compute_position(sel, tb, vp);
        assert!(pos.x >= 0.0 && pos.x + tb.width <= vp.width);
        assert!(pos.y >= 0.0 && pos.y + tb.height <= vp.height);
    }

    #[rstest]
    #[case(Size::new(10.0, 10.0))]
    #[case(Size::new(100.0, 20.0))]
    fn toolbar_clamps_even_in_a_tiny_viewport(#[case] vp: Size) {
        let sel = Rect::new(50.0, 50.0, 200.0, 40.0);
        let tb = toolbar();
        let pos = compute_position(sel, tb, vp);
        assert!(pos.x >= 0.0 && pos.y >= 0.0);
        assert!(pos.x <= (vp.width - tb.width).max(0.0));
        assert!(pos.y <= (vp.height - tb.height).max(0.0));
    }

    #[test]
    fn debouncer_fires_once_after_a_burst() {
        let mut d = Debouncer::new(40);
        d.note_event(0);
        d.note_event(20);
        d.note_event(35);
        assert!(!d.poll(50)); // last event at 35, deadline 75
        assert!(!d.poll(74));
        assert!(d.poll(75));
        assert!(!d.poll(76)); // already fired
    }

    #[test]
    fn debouncer_cancel_discards_pending_work() {
        let mut d = Debouncer::new(40);
        d.note_event(0);
        assert!(d.pending());
        d.cancel();
        assert!(!d.pending());
        assert!(!d.poll(1000));
    }
}
