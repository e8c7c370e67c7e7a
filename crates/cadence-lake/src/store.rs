//! SQLite storage for commit records, partitioned by repository scope.
//!
//! Rows carry no inherent order: [`CommitLake::load_scope`] hands back the
//! scope's records as the database returns them.

use std::path::Path;

use cadence_core::{check_records, CadenceError, CommitRecord, RepoScope};
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection};

/// Commit store backed by SQLite.
///
/// # Examples
///
/// ```
/// use cadence_core::{CommitRecord, RepoScope};
/// use cadence_lake::CommitLake;
///
/// let mut lake = CommitLake::in_memory().unwrap();
/// let scope: RepoScope = "local:demo".parse().unwrap();
/// lake.replace_scope(&scope, &[CommitRecord::new("a", "a@x.com", 0, "init")])
///     .unwrap();
/// assert_eq!(lake.count(&scope).unwrap(), 1);
/// ```
pub struct CommitLake {
    pub(crate) conn: Connection,
}

impl CommitLake {
    /// Open or create a store at `path`.
    ///
    /// Creates the parent directory and the schema if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Database`] if the database cannot be opened.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use cadence_lake::CommitLake;
    ///
    /// let lake = CommitLake::open(Path::new(".cadence/commits.db")).unwrap();
    /// ```
    pub fn open(path: &Path) -> Result<Self, CadenceError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CadenceError::Database(format!("failed to create database directory: {e}"))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| CadenceError::Database(format!("failed to open database: {e}")))?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Database`] if schema creation fails.
    pub fn in_memory() -> Result<Self, CadenceError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            CadenceError::Database(format!("failed to create in-memory database: {e}"))
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, CadenceError> {
        let lake = Self { conn };
        lake.register_functions()?;
        lake.init_schema()?;
        Ok(lake)
    }

    fn init_schema(&self) -> Result<(), CadenceError> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS commits (
                    scope TEXT NOT NULL,
                    sha TEXT NOT NULL,
                    author_email TEXT NOT NULL,
                    committed_date INTEGER,
                    message TEXT,
                    PRIMARY KEY (scope, sha)
                );

                CREATE INDEX IF NOT EXISTS commits_by_author
                    ON commits (scope, author_email, committed_date, sha);
                ",
            )
            .map_err(|e| CadenceError::Database(format!("failed to create schema: {e}")))?;
        Ok(())
    }

    /// SQLite builds differ in whether `sqrt()` exists, so the deviation
    /// query uses this one.
    fn register_functions(&self) -> Result<(), CadenceError> {
        self.conn
            .create_scalar_function(
                "cadence_sqrt",
                1,
                FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
                |ctx| {
                    let value: Option<f64> = ctx.get(0)?;
                    Ok(value.map(f64::sqrt))
                },
            )
            .map_err(|e| CadenceError::Database(format!("failed to register functions: {e}")))
    }

    /// Replace every record of `scope` with `records` in one transaction.
    ///
    /// Loading the same scope twice leaves one copy of each commit.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::InvalidInput`] if the batch breaks the record
    /// contract, or [`CadenceError::Database`] if the write fails. On error
    /// the previous contents of the scope are kept.
    pub fn replace_scope(
        &mut self,
        scope: &RepoScope,
        records: &[CommitRecord],
    ) -> Result<usize, CadenceError> {
        check_records(records)?;

        let tx = self
            .conn
            .transaction()
            .map_err(|e| CadenceError::Database(format!("failed to begin transaction: {e}")))?;

        tx.execute("DELETE FROM commits WHERE scope = ?1", params![scope.as_str()])
            .map_err(|e| CadenceError::Database(format!("failed to clear scope {scope}: {e}")))?;

        {
            let mut insert = tx
                .prepare(
                    "INSERT INTO commits (scope, sha, author_email, committed_date, message)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(|e| CadenceError::Database(format!("failed to prepare insert: {e}")))?;

            for record in records {
                insert
                    .execute(params![
                        scope.as_str(),
                        record.sha,
                        record.author_email,
                        record.committed_date,
                        record.message,
                    ])
                    .map_err(|e| {
                        CadenceError::Database(format!("failed to insert {}: {e}", record.sha))
                    })?;
            }
        }

        tx.commit()
            .map_err(|e| CadenceError::Database(format!("failed to commit transaction: {e}")))?;

        tracing::debug!(scope = %scope, records = records.len(), "stored commit records");
        Ok(records.len())
    }

    /// All records of `scope`, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Database`] on query failure.
    pub fn load_scope(&self, scope: &RepoScope) -> Result<Vec<CommitRecord>, CadenceError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT sha, author_email, committed_date, message
                 FROM commits WHERE scope = ?1",
            )
            .map_err(|e| CadenceError::Database(format!("failed to prepare load: {e}")))?;

        let rows = stmt
            .query_map(params![scope.as_str()], |row| {
                Ok(CommitRecord {
                    sha: row.get(0)?,
                    author_email: row.get(1)?,
                    committed_date: row.get(2)?,
                    message: row.get(3)?,
                })
            })
            .map_err(|e| CadenceError::Database(format!("failed to load scope {scope}: {e}")))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| CadenceError::Database(format!("failed to read commit row: {e}")))
    }

    /// Number of records stored for `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Database`] on query failure.
    pub fn count(&self, scope: &RepoScope) -> Result<usize, CadenceError> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM commits WHERE scope = ?1",
                params![scope.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as usize)
            .map_err(|e| CadenceError::Database(format!("failed to count scope {scope}: {e}")))
    }

    /// Every scope with at least one stored record, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Database`] on query failure, or
    /// [`CadenceError::InvalidInput`] if a stored scope is malformed.
    pub fn scopes(&self) -> Result<Vec<RepoScope>, CadenceError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT scope FROM commits ORDER BY scope")
            .map_err(|e| CadenceError::Database(format!("failed to prepare scope list: {e}")))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| CadenceError::Database(format!("failed to list scopes: {e}")))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CadenceError::Database(format!("failed to read scope row: {e}")))?;
        names.into_iter().map(|s| s.parse()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(name: &str) -> RepoScope {
        RepoScope::new("local", name).unwrap()
    }

    fn sorted(mut records: Vec<CommitRecord>) -> Vec<CommitRecord> {
        records.sort_by(|a, b| a.sha.cmp(&b.sha));
        records
    }

    #[test]
    fn in_memory_starts_empty() {
        let lake = CommitLake::in_memory().unwrap();
        assert_eq!(lake.count(&scope("x")).unwrap(), 0);
        assert!(lake.load_scope(&scope("x")).unwrap().is_empty());
        assert!(lake.scopes().unwrap().is_empty());
    }

    #[test]
    fn replace_scope_round_trips_records() {
        let mut lake = CommitLake::in_memory().unwrap();
        let records = vec![
            CommitRecord::new("b", "a@x.com", 20, "second"),
            CommitRecord::new("a", "a@x.com", 10, "first"),
            CommitRecord {
                sha: "c".into(),
                author_email: "b@x.com".into(),
                committed_date: None,
                message: None,
            },
        ];
        assert_eq!(lake.replace_scope(&scope("r"), &records).unwrap(), 3);
        assert_eq!(sorted(lake.load_scope(&scope("r")).unwrap()), sorted(records));
    }

    #[test]
    fn repopulating_a_scope_does_not_duplicate() {
        let mut lake = CommitLake::in_memory().unwrap();
        let records = vec![
            CommitRecord::new("a", "a@x.com", 10, "m"),
            CommitRecord::new("b", "a@x.com", 20, "m"),
        ];
        lake.replace_scope(&scope("r"), &records).unwrap();
        lake.replace_scope(&scope("r"), &records).unwrap();
        assert_eq!(lake.count(&scope("r")).unwrap(), 2);

        lake.replace_scope(&scope("r"), &records[..1]).unwrap();
        assert_eq!(lake.count(&scope("r")).unwrap(), 1);
    }

    #[test]
    fn scopes_are_independent() {
        let mut lake = CommitLake::in_memory().unwrap();
        let records = vec![CommitRecord::new("a", "a@x.com", 10, "m")];
        lake.replace_scope(&scope("one"), &records).unwrap();
        lake.replace_scope(&scope("two"), &records).unwrap();
        lake.replace_scope(&scope("one"), &[]).unwrap();

        assert_eq!(lake.count(&scope("one")).unwrap(), 0);
        assert_eq!(lake.count(&scope("two")).unwrap(), 1);
        assert_eq!(lake.scopes().unwrap(), vec![scope("two")]);
    }

    #[test]
    fn invalid_batch_keeps_previous_contents() {
        let mut lake = CommitLake::in_memory().unwrap();
        lake.replace_scope(&scope("r"), &[CommitRecord::new("a", "a@x.com", 10, "m")])
            .unwrap();

        let dup = vec![
            CommitRecord::new("z", "a@x.com", 10, "m"),
            CommitRecord::new("z", "a@x.com", 20, "m"),
        ];
        assert!(matches!(
            lake.replace_scope(&scope("r"), &dup),
            Err(CadenceError::InvalidInput(_))
        ));
        assert_eq!(lake.count(&scope("r")).unwrap(), 1);
    }

    #[test]
    fn open_creates_file_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("commits.db");
        {
            let mut lake = CommitLake::open(&path).unwrap();
            lake.replace_scope(&scope("r"), &[CommitRecord::new("a", "a@x.com", 1, "m")])
                .unwrap();
        }
        assert!(path.exists());
        let lake = CommitLake::open(&path).unwrap();
        assert_eq!(lake.count(&scope("r")).unwrap(), 1);
    }

    #[test]
    fn sqrt_function_is_available() {
        let lake = CommitLake::in_memory().unwrap();
        let v: f64 = lake
            .conn
            .query_row("SELECT cadence_sqrt(16)", [], |row| row.get(0))
            .unwrap();
        assert_eq!(v, 4.0);
        let null: Option<f64> = lake
            .conn
            .query_row("SELECT cadence_sqrt(NULL)", [], |row| row.get(0))
            .unwrap();
        assert!(null.is_none());
    }
}
