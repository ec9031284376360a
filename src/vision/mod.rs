//! Visual perception of the game client
//!
//! Frames come from a [`CaptureProvider`], reference images from a
//! [`TemplateStore`]; the [`Matcher`] combines both and answers
//! [`Detector`] queries with confidence-scored [`MatchResult`]s.
//!
//! # Example
//!
//! ```ignore
//! use nox_autopilot::vision::{DirectoryStore, Matcher, MatchOptions, Template, TemplateCatalog};
//!
//! let matcher = Matcher::new(capture, TemplateCatalog::new(DirectoryStore::new("image_search")));
//! let result = matcher.detect(Template::MainScreen, MatchOptions::new());
//! if let Some(center) = result.location {
//!     actions.click(center);
//! }
//! ```

pub mod capture;
pub mod catalog;
pub mod matcher;
pub mod templates;

pub use capture::{CaptureMode, CaptureProvider, MockCaptureProvider};
pub use catalog::{DirectoryStore, MemoryStore, ScaledTemplate, TemplateCatalog, TemplateStore};
pub use matcher::{Detector, History, MatchOptions, MatchResult, Matcher, ScriptedDetector};
pub use templates::Template;
