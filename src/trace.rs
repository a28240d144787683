use std::cell::RefCell;
use std::collections::VecDeque;

use crate::config::TraceConfig;
use crate::{Error, Result};

/// Bounded in-memory trace, optionally mirrored to stderr.
///
/// Lines start with their category: `[fetch]`, `[index]` or `[change]`.
#[derive(Debug)]
pub struct TraceLog {
    state: RefCell<TraceState>,
}

#[derive(Debug)]
struct TraceState {
    enabled: bool,
    fetches: bool,
    changes: bool,
    logs: VecDeque<String>,
    log_limit: usize,
    to_stderr: bool,
}

impl TraceLog {
    pub fn new(config: &TraceConfig) -> Self {
        Self {
            state: RefCell::new(TraceState {
                enabled: config.enabled,
                fetches: config.fetches,
                changes: config.changes,
                logs: VecDeque::new(),
                log_limit: config.log_limit.max(1),
                to_stderr: config.to_stderr,
            }),
        }
    }

    pub fn enable(&self, enabled: bool) {
        self.state.borrow_mut().enabled = enabled;
    }

    pub fn set_stderr(&self, enabled: bool) {
        self.state.borrow_mut().to_stderr = enabled;
    }

    pub fn set_fetches(&self, enabled: bool) {
        self.state.borrow_mut().fetches = enabled;
    }

    pub fn set_changes(&self, enabled: bool) {
        self.state.borrow_mut().changes = enabled;
    }

    pub fn set_log_limit(&self, max_entries: usize) -> Result<()> {
        if max_entries == 0 {
            return Err(Error::InvalidConfig(
                "set_trace_log_limit requires at least 1 entry".into(),
            ));
        }
        let mut state = self.state.borrow_mut();
        state.log_limit = max_entries;
        while state.logs.len() > state.log_limit {
            state.logs.pop_front();
        }
        Ok(())
    }

    pub fn take(&self) -> Vec<String> {
        self.state.borrow_mut().logs.drain(..).collect()
    }

    pub(crate) fn fetch_line(&self, line: impl FnOnce() -> String) {
        let wanted = {
            let state = self.state.borrow();
            state.enabled && state.fetches
        };
        if wanted {
            self.push(line());
        }
    }

    pub(crate) fn change_line(&self, line: impl FnOnce() -> String) {
        let wanted = {
            let state = self.state.borrow();
            state.enabled && state.changes
        };
        if wanted {
            self.push(line());
        }
    }

    pub(crate) fn index_line(&self, line: impl FnOnce() -> String) {
        if self.state.borrow().enabled {
            self.push(line());
        }
    }

    fn push(&self, line: String) {
        let mut state = self.state.borrow_mut();
        if state.to_stderr {
            eprintln!("{line}");
        }
        if state.logs.len() >= state.log_limit {
            state.logs.pop_front();
        }
        state.logs.push_back(line);
    }
}
