use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use futures_util::future::join_all;

use crate::Error;
use crate::fetch::FragmentSource;
use crate::index::DependencyIndex;
use crate::page::Page;
use crate::resolve::OutputResolver;
use crate::update::replace_variable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The fragment replaced the placeholder.
    Applied,
    /// A newer refresh of the same output started before this one finished.
    Superseded,
    /// Nothing was written; the placeholder keeps its previous content.
    Failed(Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputUpdate {
    pub output: String,
    pub outcome: UpdateOutcome,
}

/// Maps a changed bind to the outputs depending on it and refreshes them.
///
/// Every refresh takes a new generation number for its output; a response is
/// written only if its generation is still the latest one when it arrives.
#[derive(Debug)]
pub struct ChangePropagator {
    index: Rc<DependencyIndex>,
    generations: RefCell<HashMap<String, u64>>,
}

impl ChangePropagator {
    pub fn new(index: Rc<DependencyIndex>) -> Self {
        Self {
            index,
            generations: RefCell::new(HashMap::new()),
        }
    }

    pub fn index(&self) -> &DependencyIndex {
        &self.index
    }

    pub fn affected_outputs(&self, bind: &str) -> Vec<&str> {
        self.index.dependents_of(bind)
    }

    /// Refreshes every output depending on `bind`, concurrently.
    ///
    /// Values are re-read from the page here, not taken from the event.
    pub async fn propagate<S: FragmentSource, P: Page>(
        &self,
        resolver: &OutputResolver<'_, S, P>,
        bind: &str,
    ) -> Vec<OutputUpdate> {
        let affected = self.affected_outputs(bind);
        resolver
            .trace()
            .change_line(|| format!("[change] {bind} affects [{}]", affected.join(",")));
        join_all(
            affected
                .into_iter()
                .map(|output| self.refresh(resolver, output)),
        )
        .await
    }

    /// Refetches `output` with the current values of its upstream binds.
    pub async fn refresh<S: FragmentSource, P: Page>(
        &self,
        resolver: &OutputResolver<'_, S, P>,
        output: &str,
    ) -> OutputUpdate {
        let binds = self.index.get(output).unwrap_or_default();
        let generation = self.begin(output);

        let outcome = match resolver.read_output_from_variables(output, binds).await {
            Err(err) => UpdateOutcome::Failed(err),
            Ok(_) if !self.is_latest(output, generation) => UpdateOutcome::Superseded,
            Ok(html) => match replace_variable(resolver.page(), resolver.config(), output, &html) {
                Ok(()) => UpdateOutcome::Applied,
                Err(err) => UpdateOutcome::Failed(err),
            },
        };

        resolver.trace().change_line(|| match &outcome {
            UpdateOutcome::Applied => format!("[change] {output} applied generation={generation}"),
            UpdateOutcome::Superseded => {
                format!("[change] {output} superseded generation={generation}")
            }
            UpdateOutcome::Failed(err) => format!("[change] {output} failed: {err}"),
        });

        OutputUpdate {
            output: output.to_string(),
            outcome,
        }
    }

    fn begin(&self, output: &str) -> u64 {
        let mut generations = self.generations.borrow_mut();
        let generation = generations.entry(output.to_string()).or_insert(0);
        *generation += 1;
        *generation
    }

    fn is_latest(&self, output: &str, generation: u64) -> bool {
        self.generations.borrow().get(output).copied() == Some(generation)
    }
}
