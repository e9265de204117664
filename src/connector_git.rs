//! Git collaborator for webhook and pull modes.
//!
//! Runs the `git` CLI asynchronously in the working tree that holds the
//! document root. Paths reported by git (and by push webhooks) are
//! repository-relative; [`strip_docs_prefix`] turns them into
//! root-relative document paths.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

async fn git(repo_dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .await
        .with_context(|| format!("Failed to execute 'git {}'. Is git installed?", args[0]))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git {} failed: {}", args[0], stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Fast-forward the working tree to its upstream.
pub async fn git_pull(repo_dir: &Path) -> Result<()> {
    info!(repo = %repo_dir.display(), "running git pull");
    let output = git(repo_dir, &["pull", "--ff-only"]).await?;
    info!(output = %output, "git pull succeeded");
    Ok(())
}

pub async fn git_fetch(repo_dir: &Path, branch: &str) -> Result<()> {
    git(repo_dir, &["fetch", "origin", branch]).await?;
    Ok(())
}

/// Repository-relative paths of tracked documents that differ between
/// `HEAD` and `origin/<branch>`.
pub async fn remote_changes(
    repo_dir: &Path,
    branch: &str,
    docs_prefix: &str,
    extension: &str,
) -> Result<Vec<String>> {
    let remote_ref = format!("origin/{}", branch);
    let prefix = docs_prefix.trim_matches('/');
    let mut args = vec!["diff", "--name-only", "HEAD", remote_ref.as_str()];
    if !prefix.is_empty() {
        args.push("--");
        args.push(prefix);
    }
    let output = git(repo_dir, &args).await?;

    let changed: Vec<String> = output
        .lines()
        .map(str::trim)
        .filter(|line| has_extension(line, extension))
        .map(str::to_string)
        .collect();
    debug!(count = changed.len(), "remote document changes");
    Ok(changed)
}

/// Fetch, list changed documents, then pull. Returns root-relative paths
/// of the documents the pull changed.
pub async fn pull_changes(
    repo_dir: &Path,
    branch: &str,
    docs_prefix: &str,
    extension: &str,
) -> Result<Vec<PathBuf>> {
    git_fetch(repo_dir, branch).await?;
    let changed = remote_changes(repo_dir, branch, docs_prefix, extension).await?;
    git_pull(repo_dir).await?;

    Ok(changed
        .iter()
        .filter_map(|path| strip_docs_prefix(path, docs_prefix))
        .collect())
}

/// `docs/specs/api.md` with prefix `docs` → `specs/api.md`. `None` when
/// the path is not under the prefix.
pub fn strip_docs_prefix(repo_path: &str, docs_prefix: &str) -> Option<PathBuf> {
    let prefix = docs_prefix.trim_matches('/');
    let path = repo_path.trim_start_matches("./");
    let rest = if prefix.is_empty() {
        path
    } else {
        path.strip_prefix(prefix)?.strip_prefix('/')?
    };
    if rest.is_empty() {
        return None;
    }
    Some(PathBuf::from(rest))
}

pub fn has_extension(path: &str, extension: &str) -> bool {
    let extension = extension.trim_start_matches('.');
    Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}
