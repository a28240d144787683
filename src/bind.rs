use crate::config::SiteConfig;
use crate::page::Page;

/// Current value of the bind control declared as `name`.
///
/// The first container in document order with a matching name wins. `None`
/// means there is no such container, or it has no input control to read.
pub fn read_bind_value<P: Page + ?Sized>(page: &P, config: &SiteConfig, name: &str) -> Option<String> {
    page.bind_controls(config)
        .into_iter()
        .find(|control| control.name.as_deref() == Some(name))
        .and_then(|control| control.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::StaticPage;
    use crate::Result;

    #[test]
    fn reads_value_of_named_control() -> Result<()> {
        let page = StaticPage::from_html(
            r#"<bond def="a"><input value="1"></bond><bond def="b"><input value="2"></bond>"#,
        )?;
        let config = SiteConfig::default();
        assert_eq!(read_bind_value(&page, &config, "b").as_deref(), Some("2"));
        assert_eq!(read_bind_value(&page, &config, "a").as_deref(), Some("1"));
        Ok(())
    }

    #[test]
    fn missing_control_is_none_not_a_sentinel() -> Result<()> {
        let page = StaticPage::from_html(r#"<bond def="a"><input value="-1"></bond>"#)?;
        let config = SiteConfig::default();
        assert_eq!(read_bind_value(&page, &config, "a").as_deref(), Some("-1"));
        assert_eq!(read_bind_value(&page, &config, "z"), None);
        Ok(())
    }

    #[test]
    fn first_matching_container_wins() -> Result<()> {
        let page = StaticPage::from_html(
            r#"<bond def="a"><span>label</span></bond><bond def="a"><input value="9"></bond>"#,
        )?;
        assert_eq!(read_bind_value(&page, &SiteConfig::default(), "a"), None);
        Ok(())
    }

    #[test]
    fn honors_custom_markup() -> Result<()> {
        let page = StaticPage::from_html(r#"<span data-bind="n"><input value="4"></span>"#)?;
        let config = SiteConfig::default().with_bind_markup("span", "data-bind");
        assert_eq!(read_bind_value(&page, &config, "n").as_deref(), Some("4"));
        Ok(())
    }
}
