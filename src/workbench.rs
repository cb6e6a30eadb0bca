//! The editor-facing façade: edits in, rendered previews out.

use crate::chrome::Chrome;
use crate::compose::compose_sources;
use crate::error::FetchError;
use crate::fetch::SourceFetcher;
use crate::host::{PreviewHost, PreviewSurface};
use crate::store::{FragmentKind, SourceStore};
use anyhow::Result;
use tracing::{info, warn};

/// Ties the source store, the preview host and the chrome together.
///
/// Persistence is debounced by the store; rendering is not - with
/// auto-render on, every edit recomposes and reloads the preview at once.
pub struct Workbench<S> {
    store: SourceStore,
    host: PreviewHost<S>,
    chrome: Chrome,
}

impl<S: PreviewSurface> Workbench<S> {
    pub fn new(store: SourceStore, host: PreviewHost<S>, mut chrome: Chrome) -> Self {
        chrome.refresh_panes(store.html());
        Self {
            store,
            host,
            chrome,
        }
    }

    /// An editor changed. Returns the composed document when it rendered.
    pub async fn edit(
        &mut self,
        kind: FragmentKind,
        text: impl Into<String>,
    ) -> Result<Option<String>> {
        self.store.set(kind, text);
        if kind == FragmentKind::Html {
            self.chrome.refresh_panes(self.store.html());
        }
        if !self.store.auto_render() {
            return Ok(None);
        }
        self.render().await.map(Some)
    }

    /// Compose the current fragments and load them into the preview.
    pub async fn render(&mut self) -> Result<String> {
        let document = compose_sources(self.store.html(), self.store.css(), self.store.js());
        self.host.load(&document).await?;
        self.chrome.status.set("Rendered");
        self.chrome.refresh_panes(self.store.html());
        Ok(document)
    }

    /// Toggle auto-render; turning it on renders immediately.
    pub async fn set_auto_render(&mut self, enabled: bool) -> Result<Option<String>> {
        self.store.set_auto_render(enabled);
        self.chrome.status.set(if enabled {
            "Auto-render enabled"
        } else {
            "Auto-render disabled"
        });
        if enabled {
            return self.render().await.map(Some);
        }
        Ok(None)
    }

    /// Load a fragment from a URL, then render.
    ///
    /// On failure the fragment is left untouched and the status line says
    /// why; the error is also returned for the caller's bookkeeping.
    pub async fn load_remote(
        &mut self,
        kind: FragmentKind,
        url: &str,
        fetcher: &dyn SourceFetcher,
    ) -> Result<std::result::Result<String, FetchError>> {
        match fetcher.fetch_text(url).await {
            Ok(text) => {
                info!(%kind, url, bytes = text.len(), "loaded remote source");
                self.store.set(kind, text);
                let document = self.render().await?;
                self.chrome.status.set(format!("Loaded {kind} from {url}"));
                Ok(Ok(document))
            }
            Err(e) => {
                warn!(%kind, url, error = %e, "failed to load remote source");
                self.chrome
                    .status
                    .set(format!("Failed to load {kind} from {url}: {e}"));
                Ok(Err(e))
            }
        }
    }

    /// Focus an editor tab; hidden tabs are refused.
    pub fn select_tab(&mut self, kind: FragmentKind) -> bool {
        self.chrome.select_tab(kind)
    }

    /// Relay diagnostics that arrived after the last load.
    pub fn relay(&mut self) -> usize {
        self.host.relay()
    }

    /// Write pending saves now.
    pub fn flush(&mut self) {
        self.store.flush();
    }

    pub fn store(&self) -> &SourceStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SourceStore {
        &mut self.store
    }

    pub fn chrome(&self) -> &Chrome {
        &self.chrome
    }

    pub fn chrome_mut(&mut self) -> &mut Chrome {
        &mut self.chrome
    }

    pub fn host(&self) -> &PreviewHost<S> {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut PreviewHost<S> {
        &mut self.host
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::chrome::StatusLine;
    use crate::host::tests::{FakeSurface, SharedLog};
    use crate::markers::{SCRIPT_MARKER, STYLE_MARKER};
    use crate::message::message_channel;
    use crate::storage::{KeyValueStorage, MemoryStorage};
    use crate::store::AUTORENDER_KEY;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    /// Serves canned responses by URL; unknown URLs are a transport error.
    #[derive(Default)]
    pub(crate) struct FakeFetcher {
        pub responses: HashMap<String, std::result::Result<String, u16>>,
        pub requested: std::sync::Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        pub(crate) fn with(mut self, url: &str, response: std::result::Result<&str, u16>) -> Self {
            self.responses
                .insert(url.to_string(), response.map(str::to_string));
            self
        }

        pub(crate) fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SourceFetcher for FakeFetcher {
        async fn fetch_text(&self, url: &str) -> std::result::Result<String, FetchError> {
            self.requested.lock().unwrap().push(url.to_string());
            match self.responses.get(url) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(FetchError::Status { status: *status }),
                None => Err(FetchError::Transport("connection refused".into())),
            }
        }
    }

    pub(crate) fn workbench_with(
        storage: Arc<dyn KeyValueStorage>,
    ) -> (Workbench<FakeSurface>, SharedLog) {
        let (port, inbox) = message_channel();
        let log = SharedLog::default();
        let status = StatusLine::default();
        let store = SourceStore::restore(storage, Duration::from_millis(300), status.clone());
        let host = PreviewHost::new(FakeSurface::new(port), inbox, Box::new(log.clone()));
        (Workbench::new(store, host, Chrome::new(status)), log)
    }

    pub(crate) fn workbench() -> (Workbench<FakeSurface>, SharedLog) {
        workbench_with(Arc::new(MemoryStorage::new()))
    }

    fn loads(workbench: &Workbench<FakeSurface>) -> Vec<String> {
        workbench.host().surface().loaded.borrow().clone()
    }

    #[tokio::test]
    async fn test_edit_without_auto_render_does_not_render() {
        let (mut workbench, _log) = workbench();
        let rendered = workbench.edit(FragmentKind::Html, "<p>x</p>").await.unwrap();

        assert_eq!(rendered, None);
        assert!(loads(&workbench).is_empty());
        assert_eq!(workbench.store().html(), "<p>x</p>");
    }

    #[tokio::test]
    async fn test_every_edit_renders_with_auto_render() {
        let (mut workbench, _log) = workbench();
        workbench.set_auto_render(true).await.unwrap();
        let html = format!("<head>{STYLE_MARKER}</head><body></body>");

        workbench.edit(FragmentKind::Html, html.clone()).await.unwrap();
        let doc = workbench
            .edit(FragmentKind::Css, "body{margin:0}")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            doc,
            format!("<head>{STYLE_MARKER}<style>body{{margin:0}}</style></head><body></body>")
        );
        // Toggle render + two edits.
        assert_eq!(loads(&workbench).len(), 3);
        assert_eq!(workbench.chrome().status.get(), "Rendered");
    }

    #[tokio::test]
    async fn test_auto_render_toggle_persists_and_reports() {
        let storage = Arc::new(MemoryStorage::new());
        let (mut workbench, _log) = workbench_with(storage.clone());

        let rendered = workbench.set_auto_render(false).await.unwrap();
        assert_eq!(rendered, None);
        assert_eq!(workbench.chrome().status.get(), "Auto-render disabled");
        assert_eq!(storage.get(AUTORENDER_KEY).unwrap().as_deref(), Some("false"));

        workbench.set_auto_render(true).await.unwrap();
        assert_eq!(storage.get(AUTORENDER_KEY).unwrap().as_deref(), Some("true"));
        assert_eq!(loads(&workbench).len(), 1);
    }

    #[tokio::test]
    async fn test_panes_follow_html_edits() {
        let (mut workbench, _log) = workbench();
        workbench.edit(FragmentKind::Html, "<p>plain</p>").await.unwrap();
        assert!(!workbench.chrome().is_tab_visible(FragmentKind::Css));
        assert!(!workbench.select_tab(FragmentKind::Js));

        workbench
            .edit(FragmentKind::Html, format!("{STYLE_MARKER}{SCRIPT_MARKER}"))
            .await
            .unwrap();
        assert!(workbench.select_tab(FragmentKind::Js));

        workbench.edit(FragmentKind::Html, "<p>gone</p>").await.unwrap();
        assert_eq!(workbench.chrome().active_tab(), FragmentKind::Html);
    }

    #[tokio::test]
    async fn test_render_relays_diagnostics() {
        let (mut workbench, log) = workbench();
        workbench.host_mut().surface_mut().on_load = vec![
            json!({"type": "log", "msg": "ready"}),
            json!({"type": "error", "msg": "boom"}),
        ];

        workbench.render().await.unwrap();
        assert_eq!(log.lines(), vec!["[log] ready", "[error] boom"]);
    }

    #[tokio::test]
    async fn test_failed_remote_load_leaves_fragment() {
        let (mut workbench, _log) = workbench();
        workbench.edit(FragmentKind::Css, "p{}").await.unwrap();
        let fetcher = FakeFetcher::default().with("http://x/a.css", Err(500));

        let outcome = workbench
            .load_remote(FragmentKind::Css, "http://x/a.css", &fetcher)
            .await
            .unwrap();

        assert!(matches!(outcome, Err(FetchError::Status { status: 500 })));
        assert_eq!(workbench.store().css(), "p{}");
        assert_eq!(
            workbench.chrome().status.get(),
            "Failed to load CSS from http://x/a.css: HTTP 500"
        );
        assert!(loads(&workbench).is_empty());
    }

    #[tokio::test]
    async fn test_remote_load_sets_fragment_and_renders() {
        let (mut workbench, _log) = workbench();
        let fetcher = FakeFetcher::default().with("http://x/page.html", Ok("<p>remote</p>"));

        let outcome = workbench
            .load_remote(FragmentKind::Html, "http://x/page.html", &fetcher)
            .await
            .unwrap();

        assert_eq!(outcome.unwrap(), "<p>remote</p>");
        assert_eq!(workbench.store().html(), "<p>remote</p>");
        assert_eq!(loads(&workbench), vec!["<p>remote</p>"]);
        assert_eq!(
            workbench.chrome().status.get(),
            "Loaded HTML from http://x/page.html"
        );
    }
}
