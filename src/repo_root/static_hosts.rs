use std::sync::OnceLock;

use regex_lite::Regex;

use super::{RepoRoot, RepoRootError};

/// A code hosting site whose repository layout can be derived from the import
/// path alone.
struct HostRule {
    prefix: &'static str,
    pattern: Regex,
    /// Fixed VCS of the host, or `None` when the path itself names it.
    vcs: Option<&'static str>,
}

fn host_rules() -> &'static [HostRule] {
    static RULES: OnceLock<Vec<HostRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            HostRule {
                prefix: "github.com/",
                pattern: Regex::new(
                    r"^(?P<root>github\.com/[A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+)(/[A-Za-z0-9_.\-]+)*$",
                )
                .unwrap(),
                vcs: Some("git"),
            },
            // Mercurial hosting was retired on Bitbucket, every repository is git.
            HostRule {
                prefix: "bitbucket.org/",
                pattern: Regex::new(
                    r"^(?P<root>bitbucket\.org/[A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+)(/[A-Za-z0-9_.\-]+)*$",
                )
                .unwrap(),
                vcs: Some("git"),
            },
            HostRule {
                prefix: "hub.jazz.net/git/",
                pattern: Regex::new(
                    r"^(?P<root>hub\.jazz\.net/git/[a-z0-9]+/[A-Za-z0-9_.\-]+)(/[A-Za-z0-9_.\-]+)*$",
                )
                .unwrap(),
                vcs: Some("git"),
            },
            HostRule {
                prefix: "git.apache.org/",
                pattern: Regex::new(
                    r"^(?P<root>git\.apache\.org/[a-z0-9_.\-]+\.git)(/[A-Za-z0-9_.\-]+)*$",
                )
                .unwrap(),
                vcs: Some("git"),
            },
            HostRule {
                prefix: "git.openstack.org/",
                pattern: Regex::new(
                    r"^(?P<root>git\.openstack\.org/[A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+)(\.git)?(/[A-Za-z0-9_.\-]+)*$",
                )
                .unwrap(),
                vcs: Some("git"),
            },
            // Any host, with the VCS spelled out in the path: example.com/repo.git/pkg
            HostRule {
                prefix: "",
                pattern: Regex::new(
                    r"^(?P<root>([a-z0-9.\-]+\.)+[a-z0-9.\-]+(:[0-9]+)?/[A-Za-z0-9_.\-/]*?\.(?P<vcs>bzr|git|hg|svn))(/[A-Za-z0-9_.\-]+)*$",
                )
                .unwrap(),
                vcs: None,
            },
        ]
    })
}

/// Resolves import paths on well-known hosts without any network access.
///
/// Returns `None` when no rule applies, and an error when a host rule applies
/// but the path does not fit its layout.
pub fn resolve(import_path: &str) -> Option<Result<RepoRoot, RepoRootError>> {
    let rule = host_rules()
        .iter()
        .find(|rule| !rule.prefix.is_empty() && import_path.starts_with(rule.prefix))
        .or_else(|| {
            host_rules()
                .iter()
                .find(|rule| rule.prefix.is_empty() && rule.pattern.is_match(import_path))
        })?;

    let Some(captures) = rule.pattern.captures(import_path) else {
        return Some(Err(RepoRootError::InvalidImportPath {
            import_path: import_path.to_owned(),
            reason: format!("does not match the layout of {}", rule.prefix),
        }));
    };
    let root = captures.name("root").map(|m| m.as_str()).unwrap_or(import_path);
    let vcs = rule
        .vcs
        .or_else(|| captures.name("vcs").map(|m| m.as_str()))
        .unwrap_or("git");

    Some(Ok(RepoRoot {
        root: root.to_owned(),
        vcs: vcs.to_owned(),
        repo: format!("https://{root}"),
    }))
}
