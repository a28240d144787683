//! Client-side substitution of precomputed output fragments on static pages.
//!
//! A statically generated page carries bind controls (`<bond def="a"><input ...></bond>`)
//! and output placeholders (`<div id="var-c">`). For every output the generator wrote
//! one HTML fragment per combination of upstream bind values, laid out as
//! `<page-base>/<output>/<v1>/<v2>.html`, plus an `outputs_index.txt` listing each
//! output's upstream binds (`c/$a/$b`). When a bind control changes, every output that
//! depends on it is refetched with the current values and spliced into the page.
//!
//! The page and the network are reached through two traits, [`Page`] and
//! [`FragmentSource`]. [`StaticPage`] and [`StaticSite`] are in-memory implementations;
//! the `web` feature adds browser implementations on top of `web-sys`.

use std::error::Error as StdError;
use std::fmt;

mod bind;
mod config;
mod dom;
mod fetch;
mod index;
mod location;
mod page;
mod propagate;
mod resolve;
mod runtime;
mod text_regex;
mod trace;
mod update;
#[cfg(feature = "web")]
mod web;

pub use bind::read_bind_value;
pub use config::{SiteConfig, TraceConfig};
pub use dom::StaticPage;
pub use fetch::{FragmentSource, StaticSite};
pub use index::{DependencyIndex, load_index, parse_index_line, strip_comments};
pub use location::PageLocation;
pub use page::{BindControl, Page};
pub use propagate::{ChangePropagator, OutputUpdate, UpdateOutcome};
pub use resolve::OutputResolver;
pub use runtime::Runtime;
pub use trace::TraceLog;
pub use update::{placeholder_id, replace_variable};
#[cfg(feature = "web")]
pub use web::{WebFetch, WebPage, mount};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    HtmlParse(String),
    Fetch {
        url: String,
        reason: String,
    },
    HttpStatus {
        url: String,
        status: u16,
    },
    UnboundVariable {
        output: String,
        bind: String,
    },
    BindNotFound(String),
    PlaceholderNotFound(String),
    InvalidConfig(String),
    Regex(String),
    Dom(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HtmlParse(msg) => write!(f, "html parse error: {msg}"),
            Self::Fetch { url, reason } => write!(f, "fetch failed for {url}: {reason}"),
            Self::HttpStatus { url, status } => {
                write!(f, "fetch for {url} returned status {status}")
            }
            Self::UnboundVariable { output, bind } => write!(
                f,
                "output {output} depends on {bind}, which has no bind control"
            ),
            Self::BindNotFound(bind) => write!(f, "bind control not found: {bind}"),
            Self::PlaceholderNotFound(id) => write!(f, "placeholder not found: #{id}"),
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Regex(msg) => write!(f, "regex error: {msg}"),
            Self::Dom(msg) => write!(f, "dom error: {msg}"),
        }
    }
}

impl StdError for Error {}

impl From<text_regex::RegexError> for Error {
    fn from(value: text_regex::RegexError) -> Self {
        Self::Regex(value.to_string())
    }
}
