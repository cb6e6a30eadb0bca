//! Source fragments and render preferences, with best-effort persistence.
//!
//! Saves are debounced per fragment: every edit cancels the pending save for
//! that fragment and schedules a new one, so a burst of keystrokes turns into
//! a single write once the editor has been quiet for the debounce period.

use crate::chrome::StatusLine;
use crate::storage::KeyValueStorage;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

pub const HTML_KEY: &str = "html_viewer_source_v1";
pub const CSS_KEY: &str = "html_viewer_css_v1";
pub const JS_KEY: &str = "html_viewer_js_v1";
pub const AUTORENDER_KEY: &str = "html_viewer_autorender";

/// Starter document used when nothing has been saved yet.
pub const DEFAULT_HTML: &str = r#"<!doctype html>
<html>
<head>
  <meta charset="utf-8">
  <title>Preview</title>
  <link rel="stylesheet" href="styles.css">
</head>
<body>
  <h1>Hello</h1>
  <script src="script.js"></script>
</body>
</html>
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    Html,
    Css,
    Js,
}

impl FragmentKind {
    pub const ALL: [FragmentKind; 3] = [FragmentKind::Html, FragmentKind::Css, FragmentKind::Js];

    pub fn storage_key(self) -> &'static str {
        match self {
            FragmentKind::Html => HTML_KEY,
            FragmentKind::Css => CSS_KEY,
            FragmentKind::Js => JS_KEY,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FragmentKind::Html => "HTML",
            FragmentKind::Css => "CSS",
            FragmentKind::Js => "JS",
        }
    }

    fn index(self) -> usize {
        match self {
            FragmentKind::Html => 0,
            FragmentKind::Css => 1,
            FragmentKind::Js => 2,
        }
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderPreferences {
    pub auto_render: bool,
}

pub struct SourceStore {
    fragments: [String; 3],
    prefs: RenderPreferences,
    storage: Arc<dyn KeyValueStorage>,
    debounce: Duration,
    pending: [Option<JoinHandle<()>>; 3],
    status: StatusLine,
}

impl SourceStore {
    /// Load saved fragments and preferences, falling back to defaults for
    /// anything missing, empty or unreadable.
    pub fn restore(
        storage: Arc<dyn KeyValueStorage>,
        debounce: Duration,
        status: StatusLine,
    ) -> Self {
        let load = |key: &str| match storage.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                debug!(key, error = %e, "ignoring storage read failure");
                None
            }
        };

        let saved_html = load(HTML_KEY);
        if saved_html.is_some() {
            status.set("Loaded content from local storage");
        }
        let fragments = [
            saved_html.unwrap_or_else(|| DEFAULT_HTML.to_string()),
            load(CSS_KEY).unwrap_or_default(),
            load(JS_KEY).unwrap_or_default(),
        ];
        let prefs = RenderPreferences {
            auto_render: load(AUTORENDER_KEY).as_deref() == Some("true"),
        };

        Self {
            fragments,
            prefs,
            storage,
            debounce,
            pending: [None, None, None],
            status,
        }
    }

    pub fn get(&self, kind: FragmentKind) -> &str {
        &self.fragments[kind.index()]
    }

    pub fn html(&self) -> &str {
        self.get(FragmentKind::Html)
    }

    pub fn css(&self) -> &str {
        self.get(FragmentKind::Css)
    }

    pub fn js(&self) -> &str {
        self.get(FragmentKind::Js)
    }

    pub fn auto_render(&self) -> bool {
        self.prefs.auto_render
    }

    /// Replace a fragment and schedule its (debounced) save.
    pub fn set(&mut self, kind: FragmentKind, text: impl Into<String>) {
        let text = text.into();
        self.fragments[kind.index()] = text.clone();
        self.schedule_save(kind, text);
    }

    /// Update the auto-render preference and persist it right away.
    pub fn set_auto_render(&mut self, enabled: bool) {
        self.prefs.auto_render = enabled;
        persist(
            self.storage.as_ref(),
            AUTORENDER_KEY,
            if enabled { "true" } else { "false" },
        );
    }

    /// Write every fragment with a save still pending.
    pub fn flush(&mut self) {
        for kind in FragmentKind::ALL {
            let Some(handle) = self.pending[kind.index()].take() else {
                continue;
            };
            if handle.is_finished() {
                continue;
            }
            handle.abort();
            persist(self.storage.as_ref(), kind.storage_key(), self.get(kind));
        }
    }

    fn schedule_save(&mut self, kind: FragmentKind, text: String) {
        if let Some(previous) = self.pending[kind.index()].take() {
            previous.abort();
        }

        // Outside a tokio runtime there is nothing to debounce on.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            persist(self.storage.as_ref(), kind.storage_key(), &text);
            return;
        };

        let storage = Arc::clone(&self.storage);
        let status = self.status.clone();
        let delay = self.debounce;
        self.pending[kind.index()] = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            persist(storage.as_ref(), kind.storage_key(), &text);
            status.set("Draft saved");
        }));
    }
}

impl Drop for SourceStore {
    fn drop(&mut self) {
        self.flush();
    }
}

fn persist(storage: &dyn KeyValueStorage, key: &str, value: &str) {
    if let Err(e) = storage.set(key, value) {
        debug!(key, error = %e, "ignoring storage write failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::storage::MemoryStorage;
    use std::sync::Mutex;

    /// Counts writes per key.
    #[derive(Default)]
    struct CountingStorage {
        inner: MemoryStorage,
        writes: Mutex<Vec<String>>,
    }

    impl KeyValueStorage for CountingStorage {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.writes.lock().unwrap().push(key.to_string());
            self.inner.set(key, value)
        }
    }

    impl CountingStorage {
        fn writes_for(&self, key: &str) -> usize {
            self.writes.lock().unwrap().iter().filter(|k| *k == key).count()
        }
    }

    /// Fails every call, like storage in a locked-down browser profile.
    struct FailingStorage;

    impl KeyValueStorage for FailingStorage {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("quota exceeded".into()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("quota exceeded".into()))
        }
    }

    const DEBOUNCE: Duration = Duration::from_millis(300);

    #[test]
    fn test_defaults_when_nothing_saved() {
        let status = StatusLine::default();
        let store = SourceStore::restore(Arc::new(MemoryStorage::new()), DEBOUNCE, status.clone());

        assert_eq!(store.html(), DEFAULT_HTML);
        assert_eq!(store.css(), "");
        assert_eq!(store.js(), "");
        assert!(!store.auto_render());
        assert_eq!(status.get(), "");
    }

    #[test]
    fn test_restores_saved_values() {
        let storage = MemoryStorage::new();
        storage.set(HTML_KEY, "<p>saved</p>").unwrap();
        storage.set(CSS_KEY, "p{}").unwrap();
        storage.set(JS_KEY, "go()").unwrap();
        storage.set(AUTORENDER_KEY, "true").unwrap();
        let status = StatusLine::default();

        let store = SourceStore::restore(Arc::new(storage), DEBOUNCE, status.clone());

        assert_eq!(store.html(), "<p>saved</p>");
        assert_eq!(store.css(), "p{}");
        assert_eq!(store.js(), "go()");
        assert!(store.auto_render());
        assert_eq!(status.get(), "Loaded content from local storage");
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_edits_saves_once() {
        let storage = Arc::new(CountingStorage::default());
        let status = StatusLine::default();
        let mut store = SourceStore::restore(storage.clone(), DEBOUNCE, status.clone());

        for text in ["<p>a", "<p>ab", "<p>abc"] {
            store.set(FragmentKind::Html, text);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(storage.writes_for(HTML_KEY), 0);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(storage.writes_for(HTML_KEY), 1);
        assert_eq!(storage.inner.get(HTML_KEY).unwrap().as_deref(), Some("<p>abc"));
        assert_eq!(status.get(), "Draft saved");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fragments_debounce_independently() {
        let storage = Arc::new(CountingStorage::default());
        let mut store = SourceStore::restore(storage.clone(), DEBOUNCE, StatusLine::default());

        store.set(FragmentKind::Html, "<p>x</p>");
        store.set(FragmentKind::Css, "p{}");
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(storage.writes_for(HTML_KEY), 1);
        assert_eq!(storage.writes_for(CSS_KEY), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_writes_pending_saves() {
        let storage = Arc::new(CountingStorage::default());
        let mut store = SourceStore::restore(storage.clone(), DEBOUNCE, StatusLine::default());

        store.set(FragmentKind::Js, "go()");
        store.flush();
        assert_eq!(storage.inner.get(JS_KEY).unwrap().as_deref(), Some("go()"));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(storage.writes_for(JS_KEY), 1);
    }

    #[test]
    fn test_auto_render_persisted_immediately() {
        let storage = Arc::new(MemoryStorage::new());
        let mut store = SourceStore::restore(storage.clone(), DEBOUNCE, StatusLine::default());

        store.set_auto_render(true);
        assert_eq!(storage.get(AUTORENDER_KEY).unwrap().as_deref(), Some("true"));
        store.set_auto_render(false);
        assert_eq!(storage.get(AUTORENDER_KEY).unwrap().as_deref(), Some("false"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_failures_are_swallowed() {
        let mut store =
            SourceStore::restore(Arc::new(FailingStorage), DEBOUNCE, StatusLine::default());
        assert_eq!(store.html(), DEFAULT_HTML);

        store.set(FragmentKind::Html, "<p>still editable</p>");
        store.set_auto_render(true);
        tokio::time::sleep(Duration::from_millis(400)).await;
        store.flush();

        assert_eq!(store.html(), "<p>still editable</p>");
        assert!(store.auto_render());
    }
}
