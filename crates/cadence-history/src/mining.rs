//! Git history extraction via git2.
//!
//! Walks commit history from a repository and turns each commit into a
//! [`CommitRecord`], preserving history-traversal order (newest first).

use std::path::Path;

use cadence_core::{CadenceError, CommitRecord, HistoryConfig};
use git2::{ErrorCode, Repository, Sort};

/// Options for history mining.
///
/// # Examples
///
/// ```
/// use cadence_history::mining::MiningOptions;
///
/// let opts = MiningOptions::default();
/// assert_eq!(opts.since_days, 0);
/// assert!(opts.branch.is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MiningOptions {
    /// Only include commits from the last N days (default: 0, no cutoff).
    pub since_days: u64,
    /// Branch to walk (default: HEAD).
    pub branch: Option<String>,
}

impl From<&HistoryConfig> for MiningOptions {
    fn from(config: &HistoryConfig) -> Self {
        Self {
            since_days: config.since_days,
            branch: config.branch.clone(),
        }
    }
}

/// Mine commit records from a git repository.
///
/// Returns records in history-traversal order (newest first, by commit
/// time). Each record carries the full sha, the author email, the committer
/// timestamp in seconds, and the full trimmed message. A repository without
/// any commit yields an empty list.
///
/// # Errors
///
/// Returns [`CadenceError::Git`] if the repository cannot be opened or walked.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use cadence_history::mining::{mine_commits, MiningOptions};
///
/// let commits = mine_commits(Path::new("."), &MiningOptions::default()).unwrap();
/// for c in &commits {
///     println!("{} {} {:?}", &c.sha[..7], c.author_email, c.committed_date);
/// }
/// ```
pub fn mine_commits(
    repo_path: &Path,
    options: &MiningOptions,
) -> Result<Vec<CommitRecord>, CadenceError> {
    let repo = Repository::discover(repo_path)
        .map_err(|e| CadenceError::Git(format!("failed to open repository: {e}")))?;

    let mut revwalk = repo
        .revwalk()
        .map_err(|e| CadenceError::Git(format!("failed to create revwalk: {e}")))?;

    revwalk.set_sorting(Sort::TIME).ok();

    if let Some(ref branch) = options.branch {
        let reference = repo
            .resolve_reference_from_short_name(branch)
            .map_err(|e| CadenceError::Git(format!("failed to resolve branch '{branch}': {e}")))?;
        let oid = reference
            .target()
            .ok_or_else(|| CadenceError::Git("branch has no target".into()))?;
        revwalk
            .push(oid)
            .map_err(|e| CadenceError::Git(format!("failed to push oid: {e}")))?;
    } else {
        let unborn = repo.is_empty().unwrap_or(false)
            || matches!(repo.head(), Err(ref e) if e.code() == ErrorCode::UnbornBranch);
        if unborn {
            tracing::debug!(path = %repo_path.display(), "repository has no commits yet");
            return Ok(Vec::new());
        }
        revwalk
            .push_head()
            .map_err(|e| CadenceError::Git(format!("failed to push HEAD: {e}")))?;
    }

    let cutoff = compute_cutoff(options.since_days);
    let mut records = Vec::new();

    for oid_result in revwalk {
        let oid = oid_result.map_err(|e| CadenceError::Git(format!("revwalk error: {e}")))?;

        let commit = repo
            .find_commit(oid)
            .map_err(|e| CadenceError::Git(format!("failed to find commit: {e}")))?;

        let timestamp = commit.time().seconds();
        if cutoff.is_some_and(|c| timestamp < c) {
            break;
        }

        let author = commit.author();
        let message = String::from_utf8_lossy(commit.message_bytes())
            .trim()
            .to_string();

        records.push(CommitRecord {
            sha: oid.to_string(),
            author_email: author.email().unwrap_or("unknown").to_string(),
            committed_date: Some(timestamp),
            message: (!message.is_empty()).then_some(message),
        });
    }

    tracing::debug!(
        path = %repo_path.display(),
        commits = records.len(),
        "mined git history"
    );

    Ok(records)
}

fn compute_cutoff(since_days: u64) -> Option<i64> {
    if since_days == 0 {
        return None;
    }
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    Some(now - (since_days as i64 * 86400))
}
