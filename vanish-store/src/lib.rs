//! Ephemeral envelope storage for Vanish.
//!
//! Envelopes are stored as opaque sealed bytes in DuckDB and are never
//! returned once their deadline has passed.
//!
//! # Expiry
//!
//! - Reads filter `expires_at > now`, so an expired envelope is invisible
//!   from the instant of its deadline.
//! - Physical deletion is done by [`ExpirySweeper`], which purges expired rows
//!   every sweep interval. Rows may linger on disk for at most one interval.
//! - Nothing ever un-expires a row: `put` refuses envelopes whose deadline has
//!   already passed.

mod ephemeral_store;
mod error;
mod sweeper;

pub use ephemeral_store::{EnvelopeStore, EphemeralStore, PutOutcome};
pub use error::{StoreError, StoreResult};
pub use sweeper::{create_expiry_sweeper, ExpirySweeper, SweeperHandle};

use std::fmt::Display;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Envelope rows are small and short-lived; one thread and a modest memory
/// cap are plenty.
const MEMORY_LIMIT: &str = "128MB";
const THREADS: u32 = 1;

/// Opens the envelope database at `path`.
///
/// An unclean shutdown can leave a `.wal` file behind that DuckDB refuses to
/// replay. Expiring envelopes are not worth keeping across such a crash, so
/// the WAL is discarded and the open retried once.
pub(crate) fn open_connection(path: &Path) -> StoreResult<duckdb::Connection> {
    let conn = open_discarding_stale_wal(path, |p| duckdb::Connection::open(p))?;
    conn.execute_batch(&format!(
        "PRAGMA memory_limit='{MEMORY_LIMIT}'; PRAGMA threads={THREADS};"
    ))?;
    Ok(conn)
}

/// `<path>.wal`, where DuckDB keeps the write-ahead log for `path`.
fn wal_path(path: &Path) -> PathBuf {
    let mut wal = path.as_os_str().to_owned();
    wal.push(".wal");
    PathBuf::from(wal)
}

fn open_discarding_stale_wal<T, E: Display>(
    path: &Path,
    mut open: impl FnMut(&Path) -> Result<T, E>,
) -> Result<T, E> {
    let first_err = match open(path) {
        Ok(opened) => return Ok(opened),
        Err(e) => e,
    };
    let wal = wal_path(path);
    if !wal.exists() {
        return Err(first_err);
    }
    warn!(wal = %wal.display(), error = %first_err, "open failed, discarding stale WAL");
    match std::fs::remove_file(&wal) {
        Ok(()) => open(path),
        Err(remove_err) => {
            warn!(wal = %wal.display(), error = %remove_err, "could not remove WAL");
            Err(first_err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wal_sits_next_to_database() {
        assert_eq!(
            wal_path(Path::new("/tmp/vanish/envelopes.duckdb")),
            PathBuf::from("/tmp/vanish/envelopes.duckdb.wal")
        );
        assert_eq!(wal_path(Path::new("db")), PathBuf::from("db.wal"));
    }

    #[test]
    fn stale_wal_is_removed_and_open_retried() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("envelopes.duckdb");
        let wal = wal_path(&db);
        std::fs::write(&wal, b"torn write").unwrap();

        let mut calls = 0;
        let opened = open_discarding_stale_wal(&db, |_| {
            calls += 1;
            if wal_path(&db).exists() {
                Err("wal replay failed")
            } else {
                Ok("connection")
            }
        });

        assert_eq!(opened, Ok("connection"));
        assert_eq!(calls, 2);
        assert!(!wal.exists());
    }

    #[test]
    fn failure_without_wal_is_returned_unretried() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("envelopes.duckdb");

        let mut calls = 0;
        let opened: Result<(), _> = open_discarding_stale_wal(&db, |_| {
            calls += 1;
            Err("permission denied")
        });

        assert_eq!(opened, Err("permission denied"));
        assert_eq!(calls, 1);
    }

    #[test]
    fn reopens_file_database_with_garbage_wal() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("envelopes.duckdb");
        drop(open_connection(&db).unwrap());
        std::fs::write(wal_path(&db), b"not a duckdb wal").unwrap();

        let conn = open_connection(&db).unwrap();
        conn.execute_batch("SELECT 1").unwrap();
    }
}
