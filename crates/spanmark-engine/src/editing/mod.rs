/*!
 * # Editing Core Module
 *
 * The live form of a document is not a DOM-like tree: selection state and
 * formatting only survive re-rendering if they are expressed in a coordinate
 * space that re-rendering cannot invalidate. This module keeps everything
 * keyed on byte offsets into the plain-text projection.
 *
 * ## Architecture
 *
 * ### 1. Single Source of Truth: xi-rope Buffer
 * - The visible text is stored in a single `xi_rope::Rope` buffer
 * - The rope IS the logical-offset coordinate space; markup never appears
 *   in it, so offsets count only visible characters
 *
 * ### 2. Formatting as Spans
 * - Character-level formatting is a sorted list of [`FormatSpan`]s over the
 *   buffer, normalized so identical styles never overlap
 * - The serializer walks the spans to produce persisted markup; the toggle
 *   engine adds and removes them
 *
 * ### 3. Command-Based Editing
 * - All text edits are [`Cmd`]s that compile to xi-rope `Delta`s
 * - Spans and the selection are transformed through each delta in the same
 *   pass, so formatting survives ordinary typing
 *
 * ## Module Structure
 *
 * - **`document`**: [`SpanDoc`] with the rope buffer and span list
 * - **`commands`**: [`Cmd`] enum and delta compilation
 * - **`patch`**: edit result metadata (changed ranges, new selection)
 */

pub mod commands;
pub mod document;
pub mod patch;

pub use commands::Cmd;
pub use document::{FormatSpan, SpanDoc};
pub use patch::EditPatch;
