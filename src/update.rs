use crate::config::SiteConfig;
use crate::page::Page;
use crate::{Error, Result};

pub fn placeholder_id(config: &SiteConfig, output: &str) -> String {
    format!("{}{output}", config.placeholder_prefix)
}

/// Replaces the placeholder of `output`, tags included, with `html`.
///
/// The old element is gone afterwards, so the fragment should carry the
/// placeholder id itself if later updates must find it again.
pub fn replace_variable<P: Page + ?Sized>(
    page: &P,
    config: &SiteConfig,
    output: &str,
    html: &str,
) -> Result<()> {
    let id = placeholder_id(config, output);
    if page.replace_outer_html(&id, html)? {
        Ok(())
    } else {
        Err(Error::PlaceholderNotFound(id))
    }
}
