use std::borrow::Cow;
use std::sync::LazyLock;

use indexmap::IndexMap;

use crate::config::SiteConfig;
use crate::fetch::{FragmentSource, fetch_traced};
use crate::location::PageLocation;
use crate::text_regex::{Regex, RegexBuilder, RegexError};
use crate::trace::TraceLog;
use crate::Result;

const COMMENT_PATTERN: &str = "<!--.*?-->";

static COMMENT_RE: LazyLock<std::result::Result<Regex, RegexError>> = LazyLock::new(|| {
    RegexBuilder::new(COMMENT_PATTERN)
        .dot_matches_new_line(true)
        .build()
});

fn comment_regex() -> Result<&'static Regex> {
    Ok(COMMENT_RE.as_ref().map_err(Clone::clone)?)
}

/// Output name -> ordered upstream bind names, as declared by the index file.
///
/// Iteration follows declaration order. The bind order is the order of the path
/// segments in fragment URLs and must not be rearranged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyIndex {
    outputs: IndexMap<String, Vec<String>>,
    duplicates: Vec<String>,
}

impl DependencyIndex {
    /// Parses index text such as:
    ///
    /// ```text
    /// <!-- generated -->
    /// c/$a/$b
    /// d/$b
    /// ```
    ///
    /// A repeated output replaces the earlier bind list but keeps its position.
    pub fn parse(text: &str, sigil: &str) -> Result<Self> {
        let without_comments = strip_comments(text)?;
        let mut index = Self::default();
        for line in without_comments.split('\n') {
            if line.trim().is_empty() {
                continue;
            }
            let (name, binds) = parse_index_line(line, sigil);
            if index.outputs.insert(name.clone(), binds).is_some() {
                index.duplicates.push(name);
            }
        }
        Ok(index)
    }

    pub fn get(&self, output: &str) -> Option<&[String]> {
        self.outputs.get(output).map(Vec::as_slice)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.outputs
            .iter()
            .map(|(name, binds)| (name.as_str(), binds.as_slice()))
    }

    /// Outputs whose bind list mentions `bind`, in index order.
    pub fn dependents_of(&self, bind: &str) -> Vec<&str> {
        self.iter()
            .filter(|(_, binds)| binds.iter().any(|upstream| upstream == bind))
            .map(|(name, _)| name)
            .collect()
    }

    /// Output names declared more than once, one entry per overriding line.
    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// Removes every `<!-- ... -->` region, across lines.
///
/// Removal can join the halves of a new comment (`<!<!---->-- x -->`), so passes
/// repeat until none is left; the result never contains a complete comment.
pub fn strip_comments(text: &str) -> Result<String> {
    let re = comment_regex()?;
    let mut current = text.to_string();
    loop {
        match re.replace_all(&current, "")? {
            Cow::Borrowed(_) => return Ok(current),
            Cow::Owned(next) => current = next,
        }
    }
}

/// Splits `c/$a/$b` into `("c", ["a", "b"])`.
///
/// Empty segments are skipped; segments without the sigil are taken verbatim.
pub fn parse_index_line(line: &str, sigil: &str) -> (String, Vec<String>) {
    let mut segments = line.trim().split('/');
    let name = segments.next().unwrap_or_default().to_string();
    let binds = segments
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.strip_prefix(sigil).unwrap_or(segment).to_string())
        .collect();
    (name, binds)
}

/// Fetches `<page-base>/<index_path>` and parses it.
pub async fn load_index<S: FragmentSource>(
    source: &S,
    location: &PageLocation,
    config: &SiteConfig,
    trace: &TraceLog,
) -> Result<DependencyIndex> {
    let url = location.relative(&config.index_path);
    let text = fetch_traced(source, trace, &url).await?;
    let index = DependencyIndex::parse(&text, &config.variable_sigil)?;
    trace.index_line(|| format!("[index] loaded outputs={} from {url}", index.len()));
    for name in index.duplicates() {
        trace.index_line(|| format!("[index] duplicate output {name} replaces earlier declaration"));
    }
    Ok(index)
}
