use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone)]
pub(crate) struct Regex {
    backend: fancy_regex::Regex,
}

impl Regex {
    pub(crate) fn find_all(&self, input: &str) -> Result<Vec<Match>, RegexError> {
        let mut out = Vec::new();
        for matched in self.backend.find_iter(input) {
            let matched = matched.map_err(RegexError::from)?;
            out.push(Match::from_backend(matched));
        }
        Ok(out)
    }

    /// Replaces every non-overlapping match with `replacement`, taken literally.
    pub(crate) fn replace_all<'t>(
        &self,
        input: &'t str,
        replacement: &str,
    ) -> Result<Cow<'t, str>, RegexError> {
        let matches = self.find_all(input)?;
        if matches.is_empty() {
            return Ok(Cow::Borrowed(input));
        }

        let mut out = String::with_capacity(input.len());
        let mut last = 0usize;
        for matched in matches {
            out.push_str(&input[last..matched.start()]);
            out.push_str(replacement);
            last = matched.end();
        }
        out.push_str(&input[last..]);
        Ok(Cow::Owned(out))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RegexBuilder {
    pattern: String,
    dot_matches_new_line: bool,
}

impl RegexBuilder {
    pub(crate) fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            dot_matches_new_line: false,
        }
    }

    pub(crate) fn dot_matches_new_line(&mut self, enabled: bool) -> &mut Self {
        self.dot_matches_new_line = enabled;
        self
    }

    pub(crate) fn build(&self) -> Result<Regex, RegexError> {
        let mut builder = fancy_regex::RegexBuilder::new(&self.pattern);
        builder.dot_matches_new_line(self.dot_matches_new_line);
        let backend = builder.build().map_err(RegexError::from)?;
        Ok(Regex { backend })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Match {
    start: usize,
    end: usize,
}

impl Match {
    fn from_backend(matched: fancy_regex::Match<'_>) -> Self {
        Self {
            start: matched.start(),
            end: matched.end(),
        }
    }

    pub(crate) fn start(&self) -> usize {
        self.start
    }

    pub(crate) fn end(&self) -> usize {
        self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RegexError {
    message: String,
}

impl fmt::Display for RegexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RegexError {}

impl From<fancy_regex::Error> for RegexError {
    fn from(value: fancy_regex::Error) -> Self {
        Self {
            message: value.to_string(),
        }
    }
}
