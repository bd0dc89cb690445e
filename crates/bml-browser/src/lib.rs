//! BML Browser
//!
//! Console receiver: serves modules from a directory carousel, parses
//! documents with html5ever and drives the document runtime from
//! keyboard commands and a periodic tick.

pub mod app;
pub mod carousel;
pub mod html_renderer;
pub mod store;

pub use app::{parse_command, run, AppOptions, Command, ConsoleStatus};
pub use carousel::{Announcement, Carousel};
pub use html_renderer::HtmlRenderer;
pub use store::JsonFileStore;
