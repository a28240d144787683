/// URL of the page that hosts the bind controls.
///
/// Fragments and the index live next to the page, in a directory named after the
/// page file without its extension: `https://docs.example/guide/intro.html` looks
/// up `https://docs.example/guide/intro/outputs_index.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    href: String,
}

impl PageLocation {
    pub fn new(href: impl Into<String>) -> Self {
        Self { href: href.into() }
    }

    pub fn href(&self) -> &str {
        &self.href
    }

    /// The page URL without query, fragment and trailing file extension.
    pub fn base(&self) -> String {
        let end = self.href.find(['?', '#']).unwrap_or(self.href.len());
        let without_query = &self.href[..end];
        let path_start = path_start(without_query);
        let path = &without_query[path_start..];
        let kept = path_start + strip_extension(path).len();
        without_query[..kept].to_string()
    }

    /// `base()` joined with `suffix` by exactly one `/`.
    pub fn relative(&self, suffix: &str) -> String {
        let mut out = self.base();
        match (out.ends_with('/'), suffix.strip_prefix('/')) {
            (true, Some(rest)) => out.push_str(rest),
            (false, None) => {
                out.push('/');
                out.push_str(suffix);
            }
            _ => out.push_str(suffix),
        }
        out
    }
}

fn path_start(url: &str) -> usize {
    let Some(scheme_end) = url.find("://") else {
        return 0;
    };
    let authority_start = scheme_end + 3;
    url[authority_start..]
        .find('/')
        .map(|offset| authority_start + offset)
        .unwrap_or(url.len())
}

// Same effect as removing a `\.[^/.]+$` match: the last dot of the final segment
// goes, together with what follows it, as long as something follows it.
fn strip_extension(path: &str) -> &str {
    let segment_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[segment_start..].rfind('.') {
        Some(dot) if segment_start + dot + 1 < path.len() => &path[..segment_start + dot],
        _ => path,
    }
}
