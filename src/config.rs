use crate::{Error, Result};

/// Naming convention shared by the page generator and this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    pub index_path: String,
    pub placeholder_prefix: String,
    pub bind_tag: String,
    pub bind_name_attr: String,
    pub variable_sigil: String,
    pub fragment_extension: String,
    /// Fragments fetched alongside the index at load time, bodies discarded.
    pub prefetch: Vec<(String, Vec<String>)>,
    pub trace: TraceConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            index_path: "outputs_index.txt".into(),
            placeholder_prefix: "var-".into(),
            bind_tag: "bond".into(),
            bind_name_attr: "def".into(),
            variable_sigil: "$".into(),
            fragment_extension: "html".into(),
            prefetch: Vec::new(),
            trace: TraceConfig::default(),
        }
    }
}

impl SiteConfig {
    pub fn with_index_path(mut self, path: &str) -> Self {
        self.index_path = path.to_string();
        self
    }

    pub fn with_placeholder_prefix(mut self, prefix: &str) -> Self {
        self.placeholder_prefix = prefix.to_string();
        self
    }

    pub fn with_bind_markup(mut self, tag: &str, name_attr: &str) -> Self {
        self.bind_tag = tag.to_ascii_lowercase();
        self.bind_name_attr = name_attr.to_ascii_lowercase();
        self
    }

    pub fn with_variable_sigil(mut self, sigil: &str) -> Self {
        self.variable_sigil = sigil.to_string();
        self
    }

    pub fn with_fragment_extension(mut self, extension: &str) -> Self {
        self.fragment_extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn with_prefetch(mut self, output: &str, values: &[&str]) -> Self {
        self.prefetch.push((
            output.to_string(),
            values.iter().map(|value| value.to_string()).collect(),
        ));
        self
    }

    pub fn with_trace(mut self, trace: TraceConfig) -> Self {
        self.trace = trace;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("index_path", &self.index_path),
            ("bind_tag", &self.bind_tag),
            ("bind_name_attr", &self.bind_name_attr),
            ("fragment_extension", &self.fragment_extension),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("{field} must not be empty")));
            }
        }
        // Bind markup is looked up with `querySelectorAll(bind_tag)` in the browser.
        for (field, value) in [("bind_tag", &self.bind_tag), ("bind_name_attr", &self.bind_name_attr)] {
            if !is_markup_name(value) {
                return Err(Error::InvalidConfig(format!(
                    "{field} must be a plain markup name, got {value:?}"
                )));
            }
        }
        if self.trace.log_limit == 0 {
            return Err(Error::InvalidConfig(
                "trace log limit requires at least 1 entry".into(),
            ));
        }
        Ok(())
    }
}

/// `[A-Za-z][A-Za-z0-9_-]*`
fn is_markup_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    bytes.next().is_some_and(|first| first.is_ascii_alphabetic())
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceConfig {
    pub enabled: bool,
    pub to_stderr: bool,
    pub fetches: bool,
    pub changes: bool,
    pub log_limit: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            to_stderr: true,
            fetches: true,
            changes: true,
            log_limit: 10_000,
        }
    }
}

impl TraceConfig {
    /// Collects every category in memory without echoing to stderr.
    pub fn quiet() -> Self {
        Self {
            enabled: true,
            to_stderr: false,
            ..Self::default()
        }
    }
}
