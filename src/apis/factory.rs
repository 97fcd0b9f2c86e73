use super::sitemap::SitemapAdapter;
use super::SourceAdapter;
use crate::config::SourceConfig;
use crate::constants::SITEMAP_ADAPTER;
use crate::error::{Result, ScraperError};

/// Build the adapter registered for a source's `kind`.
pub fn create_adapter(source: &SourceConfig) -> Result<Box<dyn SourceAdapter>> {
    match source.kind.as_str() {
        SITEMAP_ADAPTER => Ok(Box::new(SitemapAdapter::new(source.clone())?)),
        other => Err(ScraperError::Config(format!(
            "Unknown adapter kind '{}' for source '{}'",
            other, source.id
        ))),
    }
}

pub fn supported_kinds() -> &'static [&'static str] {
    &[SITEMAP_ADAPTER]
}
