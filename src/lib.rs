//! Editor and renderer components for markdown notes with wiki-style links,
//! callouts, spoilers and hover previews.
//!
//! [`NoteEditor`] is a textarea with fuzzy autocompletion for `[[` wiki links
//! and `::` callout tags. [`NoteRenderer`] renders the note text as markdown
//! extended with the custom inline syntax and mounts preview popups for
//! `wiki:` and `doi:` targets. Host behavior (suggestion lookup, internal
//! previews, clipboard, link clicks) plugs in through provider callbacks.

pub mod app;
pub mod editor;
pub mod editor_core;
pub mod fuzzy;
pub mod popup;
pub mod preview;
pub mod renderer;
pub mod syntax;

pub use editor::{EditorTheme, LinkSuggestionProvider, NoteEditor};
pub use fuzzy::{LinkSuggestion, rank_callouts, rank_links};
pub use renderer::{CopyHandler, NoteRenderer, PreviewContentProvider, RenderHooks};
pub use syntax::{preprocess, CalloutKind};
