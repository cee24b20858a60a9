//! Git CLI implementation of the driver trait

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use docharbor_core::process::{run_captured, run_logged};
use docharbor_core::{BuildLog, CommandSpec, GitAuth, RefKind};
use tracing::{debug, info};

use crate::auth::ScopedAuth;
use crate::driver::{CheckoutRequest, CloneRequest, GitClient, RemoteHeadRequest};
use crate::error::{GitError, Result};

/// How much of the log tail to inspect when classifying a failure
const CLASSIFY_TAIL_BYTES: usize = 4096;

/// Driver over the `git` command-line client discovered via PATH
pub struct GitCli {
    timeout: Duration,
}

impl GitCli {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn spec(&self, auth: &ScopedAuth) -> CommandSpec {
        let mut spec = CommandSpec::new("git").timeout(self.timeout);
        for (key, value) in &auth.envs {
            spec = spec.env(key.clone(), value.clone());
        }
        spec
    }

    async fn rev_parse_head(&self, dest: &Path) -> Result<String> {
        let spec = CommandSpec::new("git")
            .args(["rev-parse", "HEAD"])
            .cwd(dest)
            .timeout(self.timeout);
        let out = run_captured(&spec)
            .await
            .map_err(|e| GitError::from_process("rev-parse", e))?;
        if !out.success() {
            return Err(GitError::CommandFailed { operation: "rev-parse".into(), code: out.code });
        }
        Ok(out.stdout.trim().to_string())
    }

    /// Reclassify a non-zero exit using the captured output
    fn classify(err: GitError, output: &str, refspec: Option<&str>) -> GitError {
        if let GitError::CommandFailed { .. } = &err {
            if is_auth_failure(output) {
                return GitError::AuthRejected { detail: last_line(output) };
            }
            if let Some(refspec) = refspec {
                if is_missing_ref(output) {
                    return GitError::RefNotFound { refspec: refspec.to_string() };
                }
            }
        }
        err
    }
}

#[async_trait]
impl GitClient for GitCli {
    async fn clone_repo(&self, req: &CloneRequest, log: &mut BuildLog) -> Result<String> {
        let auth = ScopedAuth::prepare(&req.url, &req.auth, req.verify_tls)?;
        let dest = req.dest.display().to_string();

        debug!(url = %auth.display_url, dest = %dest, "cloning repository");
        let spec = self
            .spec(&auth)
            .args(["clone", "--", auth.url.as_str(), dest.as_str()])
            .display_args(["clone", "--", auth.display_url.as_str(), dest.as_str()]);
        if let Err(e) = run_logged(&spec, log).await {
            let err = GitError::from_process("clone", e);
            return Err(Self::classify(err, &log_tail(log), None));
        }

        // The clone persisted the invocation URL as remote.origin.url;
        // put the secretless one back before anything else runs.
        if auth.url_carries_secret {
            let scrub = self
                .spec(&auth)
                .args(["remote", "set-url", "origin", req.url.as_str()])
                .cwd(&req.dest);
            run_logged(&scrub, log)
                .await
                .map_err(|e| GitError::from_process("remote set-url", e))?;
        }

        let head = self.rev_parse_head(&req.dest).await?;
        log.append_line(&format!("cloned at {head}"))?;
        info!(url = %auth.display_url, %head, "clone complete");
        Ok(head)
    }

    async fn checkout(&self, req: &CheckoutRequest, log: &mut BuildLog) -> Result<String> {
        let auth = ScopedAuth::prepare(&req.url, &req.auth, req.verify_tls)?;
        let refspec = req.ref_kind.refspec(&req.ref_name);

        // Fetch through the explicit URL so the token never has to live
        // in the remote configuration.
        let fetch = self
            .spec(&auth)
            .args(["fetch", "--force", "--", auth.url.as_str(), refspec.as_str()])
            .display_args(["fetch", "--force", "--", auth.display_url.as_str(), refspec.as_str()])
            .cwd(&req.dest);
        if let Err(e) = run_logged(&fetch, log).await {
            let err = GitError::from_process("fetch", e);
            return Err(Self::classify(err, &log_tail(log), Some(&refspec)));
        }

        let checkout = self
            .spec(&auth)
            .args(["checkout", "--detach", "FETCH_HEAD"])
            .cwd(&req.dest);
        run_logged(&checkout, log)
            .await
            .map_err(|e| GitError::from_process("checkout", e))?;

        let head = self.rev_parse_head(&req.dest).await?;
        log.append_line(&format!("checked out {refspec} at {head}"))?;
        Ok(head)
    }

    async fn remote_head(&self, req: &RemoteHeadRequest) -> Result<Option<String>> {
        let auth = ScopedAuth::prepare(&req.url, &req.auth, req.verify_tls)?;
        let refspec = req.ref_kind.refspec(&req.ref_name);

        let spec = self
            .spec(&auth)
            .args(["ls-remote", "--", auth.url.as_str(), refspec.as_str()])
            .display_args(["ls-remote", "--", auth.display_url.as_str(), refspec.as_str()]);
        let out = run_captured(&spec)
            .await
            .map_err(|e| GitError::from_process("ls-remote", e))?;
        if !out.success() {
            let err = GitError::CommandFailed { operation: "ls-remote".into(), code: out.code };
            return Err(Self::classify(err, &out.stderr, None));
        }

        Ok(parse_ls_remote_head(&out.stdout, &refspec))
    }

    async fn list_remote_refs(
        &self,
        url: &str,
        ref_kind: RefKind,
        auth: &GitAuth,
        verify_tls: bool,
    ) -> Result<Vec<String>> {
        let auth = ScopedAuth::prepare(url, auth, verify_tls)?;
        let flag = match ref_kind {
            RefKind::Branch => "--heads",
            RefKind::Tag => "--tags",
        };

        let spec = self
            .spec(&auth)
            .args(["ls-remote", flag, "--", auth.url.as_str()])
            .display_args(["ls-remote", flag, "--", auth.display_url.as_str()]);
        let out = run_captured(&spec)
            .await
            .map_err(|e| GitError::from_process("ls-remote", e))?;
        if !out.success() {
            let err = GitError::CommandFailed { operation: "ls-remote".into(), code: out.code };
            return Err(Self::classify(err, &out.stderr, None));
        }

        Ok(parse_ls_remote_names(&out.stdout))
    }
}

fn log_tail(log: &BuildLog) -> String {
    let contents = std::fs::read_to_string(log.path()).unwrap_or_default();
    let mut start = contents.len().saturating_sub(CLASSIFY_TAIL_BYTES);
    while start < contents.len() && !contents.is_char_boundary(start) {
        start += 1;
    }
    contents[start..].to_string()
}

fn last_line(output: &str) -> String {
    output.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("").trim().to_string()
}

fn is_auth_failure(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower.contains("authentication failed")
        || lower.contains("could not read username")
        || lower.contains("could not read password")
        || lower.contains("permission denied (publickey")
        || lower.contains("invalid credentials")
        || lower.contains("access denied")
}

fn is_missing_ref(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower.contains("couldn't find remote ref") || lower.contains("could not find remote ref")
}

fn parse_ls_remote_head(stdout: &str, refspec: &str) -> Option<String> {
    for line in stdout.lines() {
        let mut parts = line.split_whitespace();
        if let (Some(sha), Some(name)) = (parts.next(), parts.next()) {
            if name == refspec {
                return Some(sha.to_string());
            }
        }
    }
    None
}

fn parse_ls_remote_names(stdout: &str) -> Vec<String> {
    let mut names: Vec<String> = stdout
        .lines()
        .filter_map(|line| line.split('\t').nth(1))
        .filter(|name| !name.ends_with("^{}"))
        .map(|name| {
            name.trim_start_matches("refs/heads/")
                .trim_start_matches("refs/tags/")
                .to_string()
        })
        .collect();
    names.sort();
    names.dedup();
    names
}
