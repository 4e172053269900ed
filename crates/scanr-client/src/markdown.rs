use std::sync::Arc;

use htmd::HtmlToMarkdown;
use scanr_core::AppError;

/// HTML-to-Markdown conversion for mod descriptions, using htmd.
///
/// Non-content elements (script, style, nav, etc.) are dropped.
pub struct MarkdownConverter {
    converter: Arc<HtmlToMarkdown>,
}

impl Clone for MarkdownConverter {
    fn clone(&self) -> Self {
        Self {
            converter: Arc::clone(&self.converter),
        }
    }
}

impl MarkdownConverter {
    pub fn new() -> Self {
        let converter = HtmlToMarkdown::builder()
            .skip_tags(vec![
                "script", "style", "nav", "footer", "header", "aside", "noscript", "iframe", "svg",
            ])
            .build();

        Self {
            converter: Arc::new(converter),
        }
    }

    pub fn convert(&self, html: &str) -> Result<String, AppError> {
        self.converter
            .convert(html)
            .map(|md| md.trim().to_string())
            .map_err(|e| AppError::Generic(format!("Markdown conversion failed: {e}")))
    }
}

impl Default for MarkdownConverter {
    fn default() -> Self {
        Self::new()
    }
}
