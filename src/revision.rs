//! Turns Go module versions into revisions that a git fetcher understands.
//!
//! Go encodes untagged commits as pseudo-versions
//! (`v0.0.0-20181204163529-d75b2dcb6bc8`) and pre-module major versions with an
//! `+incompatible` marker. Neither is a ref that exists in the source repository,
//! so both are mapped back to the commit or tag they stand for.

use std::sync::OnceLock;

use regex_lite::Regex;

const INCOMPATIBLE: &str = "+incompatible";

struct Matchers {
    /// Ordered, first match wins. Each captures the revision in group 1.
    rules: [Regex; 3],
    major_version_segment: Regex,
    semver: Regex,
}

fn matchers() -> &'static Matchers {
    static MATCHERS: OnceLock<Matchers> = OnceLock::new();
    MATCHERS.get_or_init(|| Matchers {
        rules: [
            // v1.2.3-20190517191504-abcdef, v1.2.3-0.20190517191504-abcdef
            Regex::new(r"^v\d+\.\d+\.\d+-(?:\d+\.)?[0-9]{14}-(.*?)$").unwrap(),
            Regex::new(r"^v.*-(.{12})\+incompatible$").unwrap(),
            Regex::new(r"^(v\d+\.\d+\.\d+)\+incompatible$").unwrap(),
        ],
        major_version_segment: Regex::new(r"^v\d+$").unwrap(),
        semver: Regex::new(r"^v\d+\.\d+\.\d+$").unwrap(),
    })
}

/// Maps a module version to the canonical revision to fetch.
///
/// Never fails: a version that matches no known encoding (a branch name, a short
/// hash) is returned as is, minus any `+incompatible` marker.
pub fn normalize(import_path: &str, version: &str) -> String {
    let matchers = matchers();

    let revision = matchers
        .rules
        .iter()
        .find_map(|rule| rule.captures(version))
        .and_then(|captures| captures.get(1))
        .map_or(version, |revision| revision.as_str());
    let revision = revision.strip_suffix(INCOMPATIBLE).unwrap_or(revision);

    tag_for_module(matchers, import_path, revision)
}

/// Modules living in a subdirectory of their repository are tagged
/// `<subdirectory>/<version>`, unless the last path segment is a major version
/// suffix such as `v2`.
fn tag_for_module(matchers: &Matchers, import_path: &str, revision: &str) -> String {
    let segments: Vec<&str> = import_path.split('/').collect();
    match segments.as_slice() {
        [_, _, _, .., last]
            if !matchers.major_version_segment.is_match(last)
                && matchers.semver.is_match(revision) =>
        {
            format!("{last}/{revision}")
        }
        _ => revision.to_owned(),
    }
}
