//! Startup configuration from query parameters.
//!
//! Recognized parameters: `html` and `css` (source URLs), `menu` and
//! `autorender` (`"0"`/`"1"`).

use crate::error::FetchError;
use crate::fetch::SourceFetcher;
use crate::host::PreviewSurface;
use crate::store::FragmentKind;
use crate::workbench::Workbench;
use anyhow::Result;
use tracing::{info, warn};
use url::Url;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapParams {
    pub html_url: Option<String>,
    pub css_url: Option<String>,
    pub menu: Option<bool>,
    pub auto_render: Option<bool>,
}

impl BootstrapParams {
    /// Parse a query string, with or without the leading `?`. The first
    /// occurrence of a repeated key wins; an empty value counts as absent.
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        let first = |name: &str| {
            pairs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
                .filter(|value| !value.is_empty())
        };

        Self {
            html_url: first("html").map(str::to_string),
            css_url: first("css").map(str::to_string),
            menu: first("menu").and_then(|value| parse_flag("menu", value)),
            auto_render: first("autorender").and_then(|value| parse_flag("autorender", value)),
        }
    }

    /// Parameters from a page URL's query.
    pub fn from_url(url: &Url) -> Self {
        Self::from_query(url.query().unwrap_or(""))
    }

    pub fn has_remote_sources(&self) -> bool {
        self.html_url.is_some() || self.css_url.is_some()
    }
}

fn parse_flag(name: &str, value: &str) -> Option<bool> {
    match value {
        "1" => Some(true),
        "0" => Some(false),
        other => {
            warn!(param = name, value = other, "ignoring flag that is neither \"0\" nor \"1\"");
            None
        }
    }
}

/// What happened during startup.
#[derive(Debug, Default)]
pub struct BootstrapOutcome {
    /// Remote loads that failed, in attempt order.
    pub failures: Vec<(FragmentKind, FetchError)>,
    /// Whether the fallback render ran because no URLs were given.
    pub rendered_without_sources: bool,
    /// The last document rendered during startup, if any.
    pub document: Option<String>,
}

/// Apply startup parameters.
///
/// Loads HTML then CSS (each load renders on success; a failure only
/// reports), then applies the menu and auto-render flags. With no source
/// URLs at all, renders once so the preview is never blank.
pub async fn run<S: PreviewSurface>(
    params: &BootstrapParams,
    workbench: &mut Workbench<S>,
    fetcher: &dyn SourceFetcher,
) -> Result<BootstrapOutcome> {
    let mut outcome = BootstrapOutcome::default();

    let remote = [
        (FragmentKind::Html, params.html_url.as_deref()),
        (FragmentKind::Css, params.css_url.as_deref()),
    ];
    for (kind, url) in remote {
        let Some(url) = url else { continue };
        match workbench.load_remote(kind, url, fetcher).await? {
            Ok(document) => outcome.document = Some(document),
            Err(e) => outcome.failures.push((kind, e)),
        }
    }

    if let Some(visible) = params.menu {
        workbench.chrome_mut().set_menu_visible(visible);
    }
    if let Some(enabled) = params.auto_render {
        workbench.store_mut().set_auto_render(enabled);
    }

    if !params.has_remote_sources() {
        outcome.document = Some(workbench.render().await?);
        outcome.rendered_without_sources = true;
    }

    info!(
        failures = outcome.failures.len(),
        rendered_without_sources = outcome.rendered_without_sources,
        "startup complete"
    );
    Ok(outcome)
}
