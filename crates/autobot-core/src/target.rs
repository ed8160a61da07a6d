//! Commit page URL → REST "commit comments" endpoint.
//!
//! `<base>/<org>/<repo>/commit/<sha>` becomes
//! `<api_root>/<org>/<repo>/commits/<sha>/comments`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    /// The input is not an absolute URL.
    #[error("not a valid URL: {0:?}")]
    Malformed(String),

    /// The URL does not live under the configured hosting service.
    #[error("URL must start with {expected}")]
    ForeignHost { expected: String },

    /// The path is not `<org>/<repo>/commit/<sha>`.
    #[error("expected <org>/<repo>/commit/<sha>, got {0:?}")]
    NotACommit(String),
}

/// A single commit on the hosting service, identified from its web URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitTarget {
    pub org: String,
    pub repo: String,
    pub sha: String,
}

impl CommitTarget {
    /// Parse a commit page URL that must live under `base_url`.
    ///
    /// Query strings, fragments and a trailing slash are ignored.
    pub fn parse(input: &str, base_url: &str) -> Result<Self, TargetError> {
        let url = Url::parse(input.trim()).map_err(|_| TargetError::Malformed(input.to_string()))?;
        let base = Url::parse(base_url).map_err(|_| TargetError::Malformed(base_url.to_string()))?;

        let foreign = || TargetError::ForeignHost {
            expected: base_url.trim_end_matches('/').to_string(),
        };
        if url.scheme() != base.scheme()
            || url.host_str() != base.host_str()
            || url.port_or_known_default() != base.port_or_known_default()
        {
            return Err(foreign());
        }

        let base_segments = non_empty_segments(&base);
        let segments = non_empty_segments(&url);
        let rest = segments
            .strip_prefix(base_segments.as_slice())
            .ok_or_else(foreign)?;

        match rest {
            [org, repo, "commit", sha] => Ok(Self {
                org: (*org).to_string(),
                repo: (*repo).to_string(),
                sha: (*sha).to_string(),
            }),
            _ => Err(TargetError::NotACommit(url.path().to_string())),
        }
    }

    /// The endpoint that accepts `POST {"body": ...}` for this commit.
    pub fn comments_url(&self, api_root: &str) -> String {
        format!(
            "{}/{}/{}/commits/{}/comments",
            api_root.trim_end_matches('/'),
            self.org,
            self.repo,
            self.sha
        )
    }
}

/// Parse `input` under `base_url` and return the comments endpoint under `api_root`.
pub fn rewrite_commit_url(input: &str, base_url: &str, api_root: &str) -> Result<String, TargetError> {
    CommitTarget::parse(input, base_url).map(|target| target.comments_url(api_root))
}

fn non_empty_segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}
