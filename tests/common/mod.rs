#![allow(dead_code)]

use std::path::{Path, PathBuf};

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use tempfile::TempDir;

/// Creates `name.db` in `dir` with table `t(id INTEGER, label TEXT)` holding `ids`.
pub async fn seed_sqlite(dir: &Path, name: &str, ids: &[i64]) -> PathBuf {
    let path = dir.join(format!("{name}.db"));
    let mut conn = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .connect()
        .await
        .expect("create sqlite db");

    sqlx::query("CREATE TABLE t (id INTEGER PRIMARY KEY, label TEXT)")
        .execute(&mut conn)
        .await
        .expect("create table");
    for id in ids {
        sqlx::query("INSERT INTO t (id, label) VALUES (?, ?)")
            .bind(id)
            .bind(format!("{name}-{id}"))
            .execute(&mut conn)
            .await
            .expect("insert row");
    }
    conn.close().await.expect("close seed connection");
    path
}

pub fn sqlite_descriptor(path: &Path) -> String {
    format!("sqlite://{}", path.display())
}

/// Two seeded shards, `a` with ids 1..=3 and `b` with ids 10..=11.
pub async fn two_shards() -> (TempDir, String, String) {
    let dir = tempfile::tempdir().expect("tempdir");
    let a = seed_sqlite(dir.path(), "a", &[1, 2, 3]).await;
    let b = seed_sqlite(dir.path(), "b", &[10, 11]).await;
    (dir, sqlite_descriptor(&a), sqlite_descriptor(&b))
}

/// Rows of the data section tagged with `host`
pub fn rows_for<'a>(records: &'a [Vec<String>], host: &str) -> Vec<&'a Vec<String>> {
    records
        .iter()
        .skip(1)
        .take_while(|r| !(r.len() == 1 && r[0].is_empty()))
        .filter(|r| r[0] == host)
        .collect()
}

/// `[host, message]` rows of the trailing error section
pub fn error_rows(records: &[Vec<String>]) -> Vec<&Vec<String>> {
    match records
        .iter()
        .position(|r| r.len() == 2 && r[0].is_empty() && r[1] == "DATA ENDS! ERRORS FOLLOW:")
    {
        Some(idx) => records[idx + 1..].iter().collect(),
        None => Vec::new(),
    }
}
