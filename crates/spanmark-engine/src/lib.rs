pub mod editing;
pub mod geom;
pub mod overlay;
pub mod registry;
pub mod selection;
pub mod serialize;
pub mod surface;
pub mod toggle;
pub mod toolbar;

/// Milliseconds timestamp supplied by the caller for every time-sensitive
/// operation. The engine never reads a wall clock; debounce and guard-window
/// logic is driven entirely by these explicit values.
pub type Millis = u64;

// Re-export key types for easier usage
pub use editing::{Cmd, EditPatch, FormatSpan, SpanDoc};
pub use geom::{Point, Rect, Size};
pub use overlay::{ModalSession, OverlayCoordinator, OverlayKind, OverlayState};
pub use registry::{FormatId, SpanStyle};
pub use selection::{Glyph, Selection, SurfaceLayout, TextRun};
pub use surface::{EditableSurface, Mode, SaveSink, SurfaceEvent, SurfaceOptions};
pub use toolbar::{Debouncer, Placement, ToolbarPosition, ToolbarState, compute_position};
