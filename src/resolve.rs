use crate::bind::read_bind_value;
use crate::config::SiteConfig;
use crate::fetch::{FragmentSource, fetch_traced};
use crate::location::PageLocation;
use crate::page::Page;
use crate::trace::TraceLog;
use crate::{Error, Result};

/// Locates and fetches the fragment of an output for a tuple of upstream values.
pub struct OutputResolver<'a, S, P> {
    source: &'a S,
    page: &'a P,
    location: &'a PageLocation,
    config: &'a SiteConfig,
    trace: &'a TraceLog,
}

impl<'a, S: FragmentSource, P: Page> OutputResolver<'a, S, P> {
    pub fn new(
        source: &'a S,
        page: &'a P,
        location: &'a PageLocation,
        config: &'a SiteConfig,
        trace: &'a TraceLog,
    ) -> Self {
        Self {
            source,
            page,
            location,
            config,
            trace,
        }
    }

    pub(crate) fn page(&self) -> &'a P {
        self.page
    }

    pub(crate) fn config(&self) -> &'a SiteConfig {
        self.config
    }

    pub(crate) fn trace(&self) -> &'a TraceLog {
        self.trace
    }

    /// `<base>/<name>/<v1>/.../<vn>.<ext>`, or `<base>/<name>.<ext>` without values.
    ///
    /// Values are used literally and in the given order.
    pub fn fragment_url<V: AsRef<str>>(&self, name: &str, values: &[V]) -> String {
        let mut path = name.to_string();
        for value in values {
            path.push('/');
            path.push_str(value.as_ref());
        }
        path.push('.');
        path.push_str(&self.config.fragment_extension);
        self.location.relative(&path)
    }

    pub async fn read_output_from_values<V: AsRef<str>>(
        &self,
        name: &str,
        values: &[V],
    ) -> Result<String> {
        let url = self.fragment_url(name, values);
        fetch_traced(self.source, self.trace, &url).await
    }

    /// Current values of `binds`, in the same order.
    pub fn resolve_values(&self, output: &str, binds: &[String]) -> Result<Vec<String>> {
        binds
            .iter()
            .map(|bind| {
                read_bind_value(self.page, self.config, bind).ok_or_else(|| {
                    Error::UnboundVariable {
                        output: output.to_string(),
                        bind: bind.clone(),
                    }
                })
            })
            .collect()
    }

    /// Reads every bind in `binds`, then fetches the matching fragment.
    ///
    /// Nothing is fetched when a bind has no control.
    pub async fn read_output_from_variables(&self, name: &str, binds: &[String]) -> Result<String> {
        let values = self.resolve_values(name, binds)?;
        self.read_output_from_values(name, &values).await
    }
}
