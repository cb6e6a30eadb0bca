//! # Live Preview
//!
//! Edit HTML, CSS and JavaScript separately; see them combined in an isolated
//! preview whose console output and errors are forwarded back to the host.
//!
//! ## Pipeline
//!
//! - **Markers**: the CSS and JS fragments are only used when the HTML
//!   contains `<link rel="stylesheet" href="styles.css">` /
//!   `<script src="script.js"></script>` verbatim
//! - **Composition**: CSS becomes a `<style>` block before `</head>`, JS an
//!   instrumented script block before `</body>`
//! - **Isolation**: the document runs in a fresh V8 isolate per render; it can
//!   only talk to the host through `parent.postMessage`
//! - **Relay**: `{type, msg}` messages are validated and logged as
//!   `[kind] text`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use live_preview::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PreviewConfig::default();
//!     let status = StatusLine::default();
//!     let store = SourceStore::restore(
//!         Arc::new(MemoryStorage::new()),
//!         config.save_debounce(),
//!         status.clone(),
//!     );
//!     let (port, inbox) = message_channel();
//!     let surface = HeadlessSurface::new(RuntimeLimits::from(&config), port);
//!     let host = PreviewHost::new(surface, inbox, Box::new(MemoryLog::default()));
//!     let mut workbench = Workbench::new(store, host, Chrome::new(status));
//!
//!     workbench.set_auto_render(true).await?;
//!     workbench.edit(FragmentKind::Js, r#"console.log("hi")"#).await?;
//!     Ok(())
//! }
//! ```

mod chrome;
mod compose;
mod config;
mod error;
mod fetch;
mod host;
mod instrument;
mod markers;
mod message;
mod runtime;
mod storage;
mod store;
mod url_bootstrap;
mod workbench;

pub use chrome::{Chrome, StatusLine};
pub use compose::{compose, compose_sources, FALLBACK_DOCUMENT};
pub use config::PreviewConfig;
pub use error::{FetchError, StorageError};
pub use fetch::{FetchConfig, HttpFetcher, SourceFetcher};
pub use host::{LogSink, MemoryLog, PreviewHost, PreviewSurface};
pub use instrument::{instrument, strip_source_maps, SHIM};
pub use markers::{has_script_marker, has_style_marker, LinkMarkers, SCRIPT_MARKER, STYLE_MARKER};
pub use message::{message_channel, DiagnosticKind, DiagnosticMessage, MessageInbox, MessagePort};
pub use runtime::{
    create_runtime, extract_inline_scripts, ConsoleOutput, HeadlessSurface, InlineScript,
    RuntimeLimits,
};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
pub use store::{FragmentKind, SourceStore, DEFAULT_HTML};
pub use url_bootstrap::{run as run_bootstrap, BootstrapOutcome, BootstrapParams};
pub use workbench::Workbench;
