use crate::Result;
use crate::config::SiteConfig;

/// One bind container on the page, e.g. `<bond def="a"><input value="1"></bond>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindControl {
    /// Declared variable name; `None` when the container lacks the attribute.
    pub name: Option<String>,
    /// Current value of the first child element, when that child is an input control.
    pub value: Option<String>,
}

impl BindControl {
    /// A change handler is only attached to named containers with an input control.
    pub fn is_attachable(&self) -> bool {
        self.name.is_some() && self.value.is_some()
    }
}

/// The document a runtime reads binds from and writes outputs into.
///
/// Methods take `&self`: change handlers run concurrently and each of them
/// touches the page between suspension points.
pub trait Page {
    /// All bind containers in document order.
    fn bind_controls(&self, config: &SiteConfig) -> Vec<BindControl>;

    /// Replaces the element with id `element_id`, tags included, by `html`.
    ///
    /// Returns `Ok(false)` when no element has that id.
    fn replace_outer_html(&self, element_id: &str, html: &str) -> Result<bool>;
}
