//! Pane and status chrome state.
//!
//! The actual widgets are out of scope; this is the state they render.

use crate::markers::LinkMarkers;
use crate::store::FragmentKind;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Shared, cloneable status line. Debounced saves update it from a
/// background task, so it lives behind a mutex.
#[derive(Debug, Clone, Default)]
pub struct StatusLine {
    text: Arc<Mutex<String>>,
}

impl StatusLine {
    pub fn set(&self, text: impl Into<String>) {
        let text = text.into();
        info!(status = %text);
        if let Ok(mut current) = self.text.lock() {
            *current = text;
        }
    }

    pub fn get(&self) -> String {
        self.text.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

/// Tab visibility, active tab, menu flag and status line.
#[derive(Debug, Clone)]
pub struct Chrome {
    pub status: StatusLine,
    menu_visible: bool,
    css_tab_visible: bool,
    js_tab_visible: bool,
    active_tab: FragmentKind,
}

impl Default for Chrome {
    fn default() -> Self {
        Self::new(StatusLine::default())
    }
}

impl Chrome {
    /// CSS and JS tabs start hidden until a marker shows up.
    pub fn new(status: StatusLine) -> Self {
        Self {
            status,
            menu_visible: true,
            css_tab_visible: false,
            js_tab_visible: false,
            active_tab: FragmentKind::Html,
        }
    }

    pub fn menu_visible(&self) -> bool {
        self.menu_visible
    }

    pub fn set_menu_visible(&mut self, visible: bool) {
        self.menu_visible = visible;
    }

    pub fn is_tab_visible(&self, kind: FragmentKind) -> bool {
        match kind {
            FragmentKind::Html => true,
            FragmentKind::Css => self.css_tab_visible,
            FragmentKind::Js => self.js_tab_visible,
        }
    }

    pub fn active_tab(&self) -> FragmentKind {
        self.active_tab
    }

    /// Focus a tab. Hidden tabs cannot be focused; returns whether it worked.
    pub fn select_tab(&mut self, kind: FragmentKind) -> bool {
        if !self.is_tab_visible(kind) {
            return false;
        }
        self.active_tab = kind;
        true
    }

    /// Show the CSS/JS tabs according to the markers in `html`. If the
    /// focused tab disappears, focus returns to HTML.
    pub fn refresh_panes(&mut self, html: &str) {
        let markers = LinkMarkers::detect(html);
        self.css_tab_visible = markers.style;
        self.js_tab_visible = markers.script;
        if !self.is_tab_visible(self.active_tab) {
            self.active_tab = FragmentKind::Html;
        }
    }
}
