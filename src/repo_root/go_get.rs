use std::{sync::OnceLock, time::Duration};

use log::{debug, trace};
use regex_lite::Regex;
use reqwest::blocking::Client;

use super::{RepoRoot, RepoRootError};

/// A `<meta name="go-import" content="prefix vcs repo">` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaImport {
    pub prefix: String,
    pub vcs: String,
    pub repo: String,
}

impl MetaImport {
    fn matches(&self, import_path: &str) -> bool {
        import_path
            .strip_prefix(&self.prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}

impl From<MetaImport> for RepoRoot {
    fn from(import: MetaImport) -> Self {
        RepoRoot {
            root: import.prefix,
            vcs: import.vcs,
            repo: import.repo,
        }
    }
}

fn meta_regex() -> &'static Regex {
    static META: OnceLock<Regex> = OnceLock::new();
    META.get_or_init(|| Regex::new(r"(?is)<meta\s[^>]*>").unwrap())
}

fn attribute_regex() -> &'static Regex {
    static ATTRIBUTE: OnceLock<Regex> = OnceLock::new();
    ATTRIBUTE.get_or_init(|| {
        Regex::new(r#"(?is)(?P<name>[a-z\-]+)\s*=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)')"#)
            .unwrap()
    })
}

/// Extracts the `go-import` meta tags of an HTML page.
pub fn parse_meta_imports(html: &str) -> Vec<MetaImport> {
    meta_regex()
        .find_iter(html)
        .filter_map(|tag| {
            let mut name = None;
            let mut content = None;
            for attribute in attribute_regex().captures_iter(tag.as_str()) {
                let value = attribute
                    .name("dq")
                    .or_else(|| attribute.name("sq"))
                    .map(|m| m.as_str());
                match attribute.name("name").map(|m| m.as_str().to_ascii_lowercase()) {
                    Some(key) if key == "name" => name = value,
                    Some(key) if key == "content" => content = value,
                    _ => {}
                }
            }
            if name? != "go-import" {
                return None;
            }
            match content?.split_whitespace().collect::<Vec<_>>().as_slice() {
                [prefix, vcs, repo] => Some(MetaImport {
                    prefix: prefix.to_string(),
                    vcs: vcs.to_string(),
                    repo: repo.to_string(),
                }),
                _ => None,
            }
        })
        .collect()
}

/// Picks the single meta import that covers `import_path`.
///
/// Module proxy entries (`mod`) are not repositories and are ignored.
pub fn select_meta_import(
    import_path: &str,
    imports: Vec<MetaImport>,
) -> Result<MetaImport, RepoRootError> {
    let mut matching = imports
        .into_iter()
        .filter(|import| import.vcs != "mod" && import.matches(import_path));
    match (matching.next(), matching.next()) {
        (Some(import), None) => Ok(import),
        (Some(first), Some(second)) => Err(RepoRootError::AmbiguousGoImport {
            import_path: import_path.to_owned(),
            first: first.prefix,
            second: second.prefix,
        }),
        (None, _) => Err(RepoRootError::NoGoImport {
            import_path: import_path.to_owned(),
        }),
    }
}

/// Discovers repositories through the `?go-get=1` protocol of custom import paths.
pub struct GoGetDiscovery {
    client: Client,
}

impl GoGetDiscovery {
    pub fn new(timeout: Duration) -> Result<Self, RepoRootError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gomodfetch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(RepoRootError::Client)?;
        Ok(GoGetDiscovery { client })
    }

    pub fn discover(&self, import_path: &str) -> Result<RepoRoot, RepoRootError> {
        let url = format!("https://{import_path}?go-get=1");
        debug!("Discovering repository of {} via {}", import_path, url);

        let http_error = |source| RepoRootError::Http {
            url: url.clone(),
            source,
        };
        let response = self.client.get(&url).send().map_err(http_error)?;
        let status = response.status();
        let body = response.text().map_err(http_error)?;
        trace!("{} answered {} with {} bytes", url, status, body.len());

        let import = select_meta_import(import_path, parse_meta_imports(&body))?;
        Ok(import.into())
    }
}
