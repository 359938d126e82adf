//! Page Title Plugin
//!
//! Reference plugin for Trawl. Extracts the `<title>` of an HTML document.
//! Packaged as `lib/trawl0.1/libpage_title.so` (or the platform equivalent)
//! inside a `page-title.<version>.zip` archive.

use sdk::{DeclaredPlugin, Plugin, PluginDeclaration, PluginError};

/// Extracts page titles from HTML
#[derive(Debug, Default)]
pub struct PageTitle;

impl PageTitle {
    /// Text of the first `<title>` element, whitespace collapsed
    pub fn extract_title(&self, html: &str) -> Option<String> {
        let lower = html.to_ascii_lowercase();
        let open = lower.find("<title")?;
        let content_start = open + lower[open..].find('>')? + 1;
        let content_len = lower[content_start..].find("</title")?;

        let title = html[content_start..content_start + content_len]
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        (!title.is_empty()).then_some(title)
    }
}

impl Plugin for PageTitle {
    fn id(&self) -> &str {
        "page-title"
    }

    fn name(&self) -> &str {
        "Page Title Extractor"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Extracts the title of an HTML page"
    }
}

impl DeclaredPlugin for PageTitle {
    const DECLARATION: Option<PluginDeclaration> = Some(PluginDeclaration {
        id: "page-title",
        name: "Page Title Extractor",
        min_host_version: "0.1.0",
    });

    fn create() -> Result<Self, PluginError> {
        Ok(PageTitle)
    }
}

sdk::export_plugins!(PageTitle);
