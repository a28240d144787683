use std::cell::RefCell;
use std::collections::HashMap;

use crate::trace::TraceLog;
use crate::{Error, Result};

/// Network access: fetch a URL, return the decoded body.
///
/// Implementations report transport failures as [`Error::Fetch`] and non-success
/// responses as [`Error::HttpStatus`]. Nothing is retried.
#[allow(async_fn_in_trait)]
pub trait FragmentSource {
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

pub(crate) async fn fetch_traced<S: FragmentSource>(
    source: &S,
    trace: &TraceLog,
    url: &str,
) -> Result<String> {
    trace.fetch_line(|| format!("[fetch] GET {url}"));
    match source.fetch_text(url).await {
        Ok(text) => {
            trace.fetch_line(|| format!("[fetch] ok {url} bytes={}", text.len()));
            Ok(text)
        }
        Err(err) => {
            trace.fetch_line(|| format!("[fetch] failed {url}: {err}"));
            Err(err)
        }
    }
}

/// In-memory static host.
///
/// Serves registered files, answers 404 for anything else, and records every
/// requested URL in order.
#[derive(Debug, Default)]
pub struct StaticSite {
    files: HashMap<String, String>,
    statuses: HashMap<String, u16>,
    unreachable: HashMap<String, String>,
    fetch_calls: RefCell<Vec<String>>,
}

impl StaticSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_file(&mut self, url: &str, body: &str) {
        self.files.insert(url.to_string(), body.to_string());
    }

    pub fn with_file(mut self, url: &str, body: &str) -> Self {
        self.set_file(url, body);
        self
    }

    pub fn remove_file(&mut self, url: &str) {
        self.files.remove(url);
    }

    /// Forces a status for `url`; anything outside 200..=299 fails the fetch.
    pub fn set_status(&mut self, url: &str, status: u16) {
        self.statuses.insert(url.to_string(), status);
    }

    /// Makes `url` fail at the transport level (DNS, CORS, connection reset).
    pub fn set_unreachable(&mut self, url: &str, reason: &str) {
        self.unreachable.insert(url.to_string(), reason.to_string());
    }

    pub fn take_fetch_calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.fetch_calls.borrow_mut())
    }

    fn respond(&self, url: &str) -> Result<String> {
        if let Some(reason) = self.unreachable.get(url) {
            return Err(Error::Fetch {
                url: url.to_string(),
                reason: reason.clone(),
            });
        }

        let body = self.files.get(url);
        let status = self
            .statuses
            .get(url)
            .copied()
            .unwrap_or(if body.is_some() { 200 } else { 404 });
        if !(200..=299).contains(&status) {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status,
            });
        }
        Ok(body.cloned().unwrap_or_default())
    }
}

impl FragmentSource for StaticSite {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.fetch_calls.borrow_mut().push(url.to_string());
        self.respond(url)
    }
}
