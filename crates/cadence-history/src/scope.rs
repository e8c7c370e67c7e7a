//! Default repository scope for a local checkout.

use std::path::Path;

use cadence_core::{CadenceError, RepoScope};
use git2::Repository;

/// Derive the `local:<name>` scope for the repository at `repo_path`.
///
/// The name is the last path segment of `remote.origin.url` without a
/// trailing `.git`; without a remote it falls back to the working directory
/// name, and finally to `repo`.
///
/// # Errors
///
/// Returns [`CadenceError::Git`] if `repo_path` is not inside a git repository.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use cadence_history::scope::local_scope;
///
/// let scope = local_scope(Path::new(".")).unwrap();
/// assert!(scope.as_str().starts_with("local:"));
/// ```
pub fn local_scope(repo_path: &Path) -> Result<RepoScope, CadenceError> {
    let repo = Repository::discover(repo_path)
        .map_err(|e| CadenceError::Git(format!("failed to open repository: {e}")))?;

    let from_remote = repo
        .config()
        .ok()
        .and_then(|c| c.get_string("remote.origin.url").ok())
        .and_then(|url| name_from_remote(&url));

    let name = from_remote
        .or_else(|| {
            repo.workdir()
                .and_then(|dir| dir.file_name())
                .map(|n| n.to_string_lossy().to_string())
        })
        .unwrap_or_else(|| "repo".to_string());

    RepoScope::new("local", &name)
}

/// Last path segment of a remote URL, without `.git`.
///
/// Handles both `https://host/owner/name.git` and `git@host:owner/name.git`.
pub fn name_from_remote(url: &str) -> Option<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let last = trimmed.rsplit(|c: char| c == '/' || c == ':').next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    (!name.is_empty()).then(|| name.to_string())
}
