use std::{collections::HashMap, fmt::Write, path::Path, sync::OnceLock};

use log::debug;
use regex_lite::Regex;

use super::{FetchDescriptor, ParseError};

const HEADER: &str = "# file generated from go.mod using gomodfetch";
const FETCH_TYPE: &str = "git";

/// The persisted list of fetch descriptors, one Nix attribute set per module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub dependencies: Vec<FetchDescriptor>,
}

impl Manifest {
    pub fn new(dependencies: Vec<FetchDescriptor>) -> Self {
        Manifest { dependencies }
    }

    pub fn from_file(path: &Path) -> Result<Manifest, ParseError> {
        debug!("Reading manifest from {}", path.display());
        Manifest::from_str(&std::fs::read_to_string(path)?)
    }

    /// Parses a manifest previously produced by [`Manifest::to_string`].
    ///
    /// Whitespace, comments and the order of keys inside an entry are not
    /// significant, but every entry must carry all of its keys.
    pub fn from_str(s: &str) -> Result<Manifest, ParseError> {
        let mut entries: Vec<HashMap<&str, String>> = Vec::new();

        for line in s.lines().filter(|line| !line.trim_start().starts_with('#')) {
            for captures in attribute_regex().captures_iter(line) {
                let (Some(key), Some(value)) = (captures.name("key"), captures.name("value"))
                else {
                    continue;
                };
                let key = key.as_str();
                if key == "goPackagePath" {
                    entries.push(HashMap::new());
                }
                match entries.last_mut() {
                    Some(entry) => {
                        entry.insert(key, unescape(value.as_str()));
                    }
                    None => return Err(ParseError::Unexpected(line.trim().to_owned())),
                }
            }
        }

        let dependencies = entries
            .into_iter()
            .enumerate()
            .map(|(index, mut entry)| {
                let mut take = |key: &str| {
                    entry.remove(key).ok_or_else(|| ParseError::MissingKey {
                        key: key.to_owned(),
                        entry: index,
                    })
                };
                let import_path = take("goPackagePath")?;
                let kind = take("type")?;
                if kind != FETCH_TYPE {
                    return Err(ParseError::UnsupportedFetchType { kind, import_path });
                }
                Ok(FetchDescriptor {
                    import_path,
                    url: take("url")?,
                    rev: take("rev")?,
                    sha256: take("sha256")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Manifest { dependencies })
    }

    pub fn to_string(&self) -> String {
        let mut out = String::new();
        out.push_str(HEADER);
        out.push('\n');
        out.push_str("[\n");
        for dependency in &self.dependencies {
            // Writing into a String cannot fail.
            let _ = write!(
                out,
                r#"  {{
    goPackagePath = "{}";
    fetch = {{
      type = "{}";
      url = "{}";
      rev = "{}";
      sha256 = "{}";
    }};
  }}
"#,
                escape(&dependency.import_path),
                FETCH_TYPE,
                escape(&dependency.url),
                escape(&dependency.rev),
                escape(&dependency.sha256),
            );
        }
        out.push_str("]\n");
        out
    }
}

fn attribute_regex() -> &'static Regex {
    static ATTRIBUTE: OnceLock<Regex> = OnceLock::new();
    ATTRIBUTE.get_or_init(|| {
        Regex::new(r#"(?P<key>[A-Za-z_][A-Za-z0-9_]*)\s*=\s*"(?P<value>(?:[^"\\]|\\.)*)"\s*;"#)
            .unwrap()
    })
}

fn escape(s: &str) -> String {
    s.replace('\\', r"\\")
        .replace('"', "\\\"")
        .replace("${", "\\${")
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
