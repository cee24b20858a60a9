//! Per-invocation scoping of git access material
//!
//! Tokens are spliced into the URL handed to one child process and
//! scrubbed from the clone's remote configuration afterwards. Deploy
//! keys are written to a 0600 temp file that is removed when the
//! scope drops, with `GIT_SSH_COMMAND` pointing at it for the one
//! invocation.

use std::io::Write;

use docharbor_core::GitAuth;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{GitError, Result};

/// Inject a bearer-like token into an HTTPS URL.
///
/// Non-HTTP URLs and URLs that already carry userinfo are returned
/// unchanged.
pub fn inject_token(url: &str, token: &str) -> String {
    if token.is_empty() || !url.starts_with("http") {
        return url.to_string();
    }
    let Some(idx) = url.find("://") else {
        return url.to_string();
    };
    let (scheme, rest) = url.split_at(idx + 3);
    let authority_end = rest.find('/').unwrap_or(rest.len());
    if rest[..authority_end].contains('@') {
        return url.to_string();
    }
    format!("{scheme}{token}@{rest}")
}

/// Replace any userinfo in a URL with a placeholder for logging
pub fn redact_url(url: &str) -> String {
    let Some(idx) = url.find("://") else {
        return url.to_string();
    };
    let (scheme, rest) = url.split_at(idx + 3);
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{scheme}<redacted>@{}", &rest[at + 1..]),
        None => url.to_string(),
    }
}

/// Access material prepared for exactly one git invocation
pub struct ScopedAuth {
    /// URL to hand to git (token embedded when applicable)
    pub url: String,
    /// URL safe to write into logs
    pub display_url: String,
    /// Environment overrides for the invocation
    pub envs: Vec<(String, String)>,
    /// Whether the real URL differs from the configured one and must
    /// not survive in `remote.origin.url`
    pub url_carries_secret: bool,
    // Held so the key file outlives the child process, deleted on drop.
    _key_file: Option<NamedTempFile>,
}

impl ScopedAuth {
    pub fn prepare(url: &str, auth: &GitAuth, verify_tls: bool) -> Result<Self> {
        let mut envs: Vec<(String, String)> = vec![
            // Never fall back to interactive credential prompts.
            ("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()),
        ];
        if !verify_tls {
            envs.push(("GIT_SSL_NO_VERIFY".to_string(), "true".to_string()));
        }

        let mut key_file = None;
        let mut effective_url = url.to_string();
        let mut url_carries_secret = false;

        match auth {
            GitAuth::Anonymous => {}
            GitAuth::Token(token) => {
                let injected = inject_token(url, token);
                url_carries_secret = injected != *url;
                effective_url = injected;
            }
            GitAuth::DeployKey(key) => {
                let mut file = NamedTempFile::new().map_err(GitError::Io)?;
                file.write_all(key.trim_end().as_bytes()).map_err(GitError::Io)?;
                file.write_all(b"\n").map_err(GitError::Io)?;
                debug!(path = %file.path().display(), "wrote ephemeral deploy key");
                envs.push((
                    "GIT_SSH_COMMAND".to_string(),
                    format!(
                        "ssh -i {} -o IdentitiesOnly=yes -o StrictHostKeyChecking=no",
                        file.path().display()
                    ),
                ));
                key_file = Some(file);
            }
        }

        Ok(Self {
            display_url: redact_url(&effective_url),
            url: effective_url,
            envs,
            url_carries_secret,
            _key_file: key_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_injected_before_the_host() {
        assert_eq!(
            inject_token("https://example.com/a/b.git", "tok"),
            "https://tok@example.com/a/b.git"
        );
    }

    #[test]
    fn existing_userinfo_is_preserved() {
        assert_eq!(
            inject_token("https://user@example.com/a.git", "tok"),
            "https://user@example.com/a.git"
        );
    }

    #[test]
    fn ssh_urls_are_unchanged() {
        assert_eq!(inject_token("git@example.com:a/b.git", "tok"), "git@example.com:a/b.git");
    }

    #[test]
    fn redaction_hides_userinfo_only() {
        assert_eq!(
            redact_url("https://tok@example.com/a.git"),
            "https://<redacted>@example.com/a.git"
        );
        assert_eq!(redact_url("https://example.com/a.git"), "https://example.com/a.git");
    }

    #[test]
    fn deploy_key_file_is_removed_on_drop() {
        let auth = GitAuth::DeployKey("-----KEY-----".to_string());
        let scoped = ScopedAuth::prepare("git@example.com:a/b.git", &auth, true).unwrap();
        let path = scoped._key_file.as_ref().unwrap().path().to_path_buf();
        assert!(path.exists());
        let ssh_cmd = scoped
            .envs
            .iter()
            .find(|(k, _)| k == "GIT_SSH_COMMAND")
            .map(|(_, v)| v.clone())
            .unwrap();
        assert!(ssh_cmd.contains(&path.display().to_string()));
        drop(scoped);
        assert!(!path.exists());
    }

    #[test]
    fn tls_verification_can_be_disabled_per_call() {
        let scoped =
            ScopedAuth::prepare("https://example.com/a.git", &GitAuth::Anonymous, false).unwrap();
        assert!(scoped.envs.iter().any(|(k, v)| k == "GIT_SSL_NO_VERIFY" && v == "true"));
        let scoped =
            ScopedAuth::prepare("https://example.com/a.git", &GitAuth::Anonymous, true).unwrap();
        assert!(!scoped.envs.iter().any(|(k, _)| k == "GIT_SSL_NO_VERIFY"));
    }
}
