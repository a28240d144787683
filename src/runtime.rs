use std::rc::Rc;

use futures_util::future::{join, join_all};

use crate::Result;
use crate::config::SiteConfig;
use crate::dom::StaticPage;
use crate::fetch::{FragmentSource, fetch_traced};
use crate::index::{DependencyIndex, load_index};
use crate::location::PageLocation;
use crate::page::Page;
use crate::propagate::{ChangePropagator, OutputUpdate};
use crate::resolve::OutputResolver;
use crate::trace::TraceLog;

/// Everything one page needs after load: where it lives, how it is marked up,
/// how to fetch, the page itself and its parsed dependency index.
///
/// All methods take `&self`, so several change handlers can be pending at once.
pub struct Runtime<S, P> {
    location: PageLocation,
    config: SiteConfig,
    source: S,
    page: P,
    propagator: ChangePropagator,
    attached: Vec<String>,
    trace: TraceLog,
}

impl<S: FragmentSource, P: Page> Runtime<S, P> {
    /// Fetches the index (concurrently with the configured prefetches) and
    /// prepares change handling for every bind control on the page.
    ///
    /// Fails when the index cannot be fetched or parsed; prefetch failures are
    /// only traced.
    pub async fn load(location: PageLocation, config: SiteConfig, source: S, page: P) -> Result<Self> {
        config.validate()?;
        let trace = TraceLog::new(&config.trace);

        let index = {
            let resolver = OutputResolver::new(&source, &page, &location, &config, &trace);
            let prefetches = config.prefetch.iter().map(|(output, values)| {
                let url = resolver.fragment_url(output, values);
                let (source, trace) = (&source, &trace);
                async move {
                    // Warm-up only; the body is dropped.
                    let _ = fetch_traced(source, trace, &url).await;
                }
            });
            let (index, _) = join(
                load_index(&source, &location, &config, &trace),
                join_all(prefetches),
            )
            .await;
            index?
        };

        Ok(Self::assemble(location, config, source, page, index, trace))
    }

    /// Builds a runtime around an index that was parsed elsewhere.
    pub fn with_index(
        location: PageLocation,
        config: SiteConfig,
        source: S,
        page: P,
        index: DependencyIndex,
    ) -> Result<Self> {
        config.validate()?;
        let trace = TraceLog::new(&config.trace);
        Ok(Self::assemble(location, config, source, page, index, trace))
    }

    fn assemble(
        location: PageLocation,
        config: SiteConfig,
        source: S,
        page: P,
        index: DependencyIndex,
        trace: TraceLog,
    ) -> Self {
        let attached: Vec<String> = page
            .bind_controls(&config)
            .into_iter()
            .filter(|control| control.is_attachable())
            .filter_map(|control| control.name)
            .collect();
        trace.change_line(|| format!("[change] handlers attached for [{}]", attached.join(",")));

        Self {
            location,
            config,
            source,
            page,
            propagator: ChangePropagator::new(Rc::new(index)),
            attached,
            trace,
        }
    }

    fn resolver(&self) -> OutputResolver<'_, S, P> {
        OutputResolver::new(
            &self.source,
            &self.page,
            &self.location,
            &self.config,
            &self.trace,
        )
    }

    /// Change handler body for the bind control declared as `bind`.
    pub async fn on_bind_change(&self, bind: &str) -> Vec<OutputUpdate> {
        self.trace.change_line(|| format!("[change] received {bind}"));
        let resolver = self.resolver();
        self.propagator.propagate(&resolver, bind).await
    }

    /// Refreshes every output of the index from the current bind values.
    pub async fn refresh_all(&self) -> Vec<OutputUpdate> {
        let resolver = self.resolver();
        join_all(
            self.index()
                .outputs()
                .map(|output| self.propagator.refresh(&resolver, output)),
        )
        .await
    }

    pub fn fragment_url<V: AsRef<str>>(&self, output: &str, values: &[V]) -> String {
        self.resolver().fragment_url(output, values)
    }

    pub async fn read_output_from_values<V: AsRef<str>>(
        &self,
        output: &str,
        values: &[V],
    ) -> Result<String> {
        self.resolver().read_output_from_values(output, values).await
    }

    pub async fn read_output_from_variables(&self, output: &str, binds: &[String]) -> Result<String> {
        self.resolver().read_output_from_variables(output, binds).await
    }

    pub fn index(&self) -> &DependencyIndex {
        self.propagator.index()
    }

    /// Declared names of the bind controls that received a change handler.
    pub fn attached_binds(&self) -> &[String] {
        &self.attached
    }

    pub fn location(&self) -> &PageLocation {
        &self.location
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn enable_trace(&self, enabled: bool) {
        self.trace.enable(enabled);
    }

    pub fn set_trace_stderr(&self, enabled: bool) {
        self.trace.set_stderr(enabled);
    }

    pub fn set_trace_fetches(&self, enabled: bool) {
        self.trace.set_fetches(enabled);
    }

    pub fn set_trace_changes(&self, enabled: bool) {
        self.trace.set_changes(enabled);
    }

    pub fn set_trace_log_limit(&self, max_entries: usize) -> Result<()> {
        self.trace.set_log_limit(max_entries)
    }

    pub fn take_trace_logs(&self) -> Vec<String> {
        self.trace.take()
    }
}

impl<S: FragmentSource> Runtime<S, StaticPage> {
    /// Edits the input of bind `bind` and runs its change handler, like a user would.
    pub async fn change_bind_value(&self, bind: &str, value: &str) -> Result<Vec<OutputUpdate>> {
        self.page.set_control_value(&self.config, bind, value)?;
        Ok(self.on_bind_change(bind).await)
    }
}
