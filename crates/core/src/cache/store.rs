//! Entry and alias operations.
//!
//! An entry is written once per `set` and addressed through any number of
//! keys. Retargeting a key never touches the entry it pointed at before.

use super::connection::CacheDb;
use crate::Error;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

/// A stored value together with its id and creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub id: i64,
    pub created: DateTime<Utc>,
    pub value: Vec<u8>,
}

impl CacheEntry {
    /// Time elapsed between creation and `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created
    }
}

fn parse_created(raw: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::CorruptEntry(format!("invalid creation timestamp {raw:?}: {e}")))
}

/// Quote a literal string for use inside a [`CacheDb::delete_by_key_pattern`] pattern.
pub fn glob_escape(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        match c {
            '*' => out.push_str("[*]"),
            '?' => out.push_str("[?]"),
            '[' => out.push_str("[[]"),
            c => out.push(c),
        }
    }
    out
}

impl CacheDb {
    /// Look up the entry aliased by `key`.
    ///
    /// An unknown key is `Ok(None)`, never an error.
    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        let key = key.to_string();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<(i64, String, Vec<u8>)>, Error> {
                let row = conn
                    .query_row(
                        "SELECT e.id, e.created, e.value
                         FROM cache_keys k JOIN cache_entries e ON e.id = k.id
                         WHERE k.key = ?1",
                        params![key],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(Error::from)?;

        match row {
            Some((id, created, value)) => Ok(Some(CacheEntry { id, created: parse_created(&created)?, value })),
            None => Ok(None),
        }
    }

    /// Store `value` and point every key in `keys` at it.
    ///
    /// With `id` the existing entry is overwritten in place (value and
    /// creation time), keeping all aliases that already reference it. Without
    /// `id` a new entry is created. Keys already aliasing another entry are
    /// retargeted. Returns the final entry id.
    pub async fn set<I, K>(&self, keys: I, value: Vec<u8>, id: Option<i64>) -> Result<i64, Error>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        let created = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        self.conn
            .call(move |conn| -> Result<i64, Error> {
                let tx = conn.transaction()?;
                let id = match id {
                    Some(id) => {
                        tx.execute(
                            "INSERT INTO cache_entries (id, created, value) VALUES (?1, ?2, ?3)
                             ON CONFLICT(id) DO UPDATE SET
                                created = excluded.created,
                                value = excluded.value",
                            params![id, created, value],
                        )?;
                        id
                    }
                    None => {
                        tx.execute(
                            "INSERT INTO cache_entries (created, value) VALUES (?1, ?2)",
                            params![created, value],
                        )?;
                        tx.last_insert_rowid()
                    }
                };

                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO cache_keys (key, id) VALUES (?1, ?2)
                         ON CONFLICT(key) DO UPDATE SET id = excluded.id",
                    )?;
                    for key in &keys {
                        stmt.execute(params![key, id])?;
                    }
                }

                tx.commit()?;
                Ok(id)
            })
            .await
            .map_err(Error::from)
    }

    /// All keys aliasing the same entry as `key`, sorted.
    ///
    /// Empty when `key` is unknown.
    pub async fn keys(&self, key: &str) -> Result<Vec<String>, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT key FROM cache_keys
                     WHERE id = (SELECT id FROM cache_keys WHERE key = ?1)
                     ORDER BY key",
                )?;
                let keys = stmt
                    .query_map(params![key], |row| row.get(0))?
                    .collect::<Result<Vec<String>, rusqlite::Error>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove every alias matching a case-sensitive glob `pattern`
    /// (`*`, `?`, `[...]`), then every entry left without an alias.
    ///
    /// Returns the number of aliases removed.
    pub async fn delete_by_key_pattern(&self, pattern: &str) -> Result<u64, Error> {
        let pattern = pattern.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let ids = {
                    let mut stmt = tx.prepare("SELECT DISTINCT id FROM cache_keys WHERE key GLOB ?1")?;
                    stmt.query_map(params![pattern], |row| row.get(0))?
                        .collect::<Result<Vec<i64>, rusqlite::Error>>()?
                };

                let removed = tx.execute("DELETE FROM cache_keys WHERE key GLOB ?1", params![pattern])?;

                for id in ids {
                    tx.execute(
                        "DELETE FROM cache_entries
                         WHERE id = ?1 AND NOT EXISTS (SELECT 1 FROM cache_keys WHERE id = ?1)",
                        params![id],
                    )?;
                }

                tx.commit()?;
                Ok(removed as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn entry_count(db: &CacheDb) -> i64 {
        db.conn
            .call(|conn| conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_set_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let id = db.set(["foo", "bar"], b"baz".to_vec(), None).await.unwrap();

        assert!(db.get("someKey").await.unwrap().is_none());
        assert!(db.get(&id.to_string()).await.unwrap().is_none());
        for key in ["foo", "bar"] {
            let entry = db.get(key).await.unwrap().unwrap();
            assert_eq!(entry.value, b"baz");
            assert_eq!(entry.id, id);
        }
    }

    #[tokio::test]
    async fn test_disjoint_sets_get_distinct_ids() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let id1 = db.set(["a", "b"], b"one".to_vec(), None).await.unwrap();
        let id2 = db.set(["c"], b"two".to_vec(), None).await.unwrap();

        assert_ne!(id1, id2);
        assert_eq!(db.get("a").await.unwrap().unwrap().value, b"one");
        assert_eq!(db.get("b").await.unwrap().unwrap().value, b"one");
        assert_eq!(db.get("c").await.unwrap().unwrap().value, b"two");
    }

    #[tokio::test]
    async fn test_add_key_to_existing_entry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let id = db.set(["foo"], b"baz".to_vec(), None).await.unwrap();
        let first = db.get("foo").await.unwrap().unwrap();
        assert!(db.get("bar").await.unwrap().is_none());

        let id2 = db.set(["bar"], b"baz".to_vec(), Some(id)).await.unwrap();
        assert_eq!(id, id2);

        let foo = db.get("foo").await.unwrap().unwrap();
        let bar = db.get("bar").await.unwrap().unwrap();
        assert_eq!(foo, bar);
        assert_eq!(foo.value, first.value);
        assert_eq!(db.keys("foo").await.unwrap(), vec!["bar".to_string(), "foo".to_string()]);
    }

    #[tokio::test]
    async fn test_take_over_key() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let id1 = db.set(["foo", "bar"], b"data1".to_vec(), None).await.unwrap();
        let id2 = db.set(["bar"], b"data2".to_vec(), None).await.unwrap();
        assert_ne!(id1, id2);

        let foo = db.get("foo").await.unwrap().unwrap();
        let bar = db.get("bar").await.unwrap().unwrap();
        assert_eq!((foo.id, foo.value), (id1, b"data1".to_vec()));
        assert_eq!((bar.id, bar.value), (id2, b"data2".to_vec()));
    }

    #[tokio::test]
    async fn test_update_in_place_advances_created() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let id = db.set(["foo"], b"data1".to_vec(), None).await.unwrap();
        let before = db.get("foo").await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        let id2 = db.set(Vec::<String>::new(), b"data2".to_vec(), Some(id)).await.unwrap();
        assert_eq!(id, id2);
        let after = db.get("foo").await.unwrap().unwrap();
        assert_eq!(after.value, b"data2");
        assert_eq!(after.id, id);
        assert!(after.created > before.created);
    }

    #[tokio::test]
    async fn test_set_with_id_merges_aliases() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let id = db.set(["k0", "k1"], b"v1".to_vec(), None).await.unwrap();
        db.set(["k2"], b"v2".to_vec(), Some(id)).await.unwrap();

        for key in ["k0", "k1", "k2"] {
            assert_eq!(db.get(key).await.unwrap().unwrap().value, b"v2");
        }
        assert_eq!(entry_count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_keys_unknown() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.keys("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_key_pattern() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.set(["res"], b"snapshot".to_vec(), None).await.unwrap();
        db.set(["aaa_res"], b"resp1".to_vec(), None).await.unwrap();
        db.set(["bbb_res"], b"resp2".to_vec(), None).await.unwrap();
        db.set(["ccc_other"], b"resp3".to_vec(), None).await.unwrap();

        let removed = db.delete_by_key_pattern("*_res").await.unwrap();
        assert_eq!(removed, 2);
        assert!(db.get("aaa_res").await.unwrap().is_none());
        assert!(db.get("bbb_res").await.unwrap().is_none());
        assert!(db.get("res").await.unwrap().is_some());
        assert!(db.get("ccc_other").await.unwrap().is_some());
        assert_eq!(entry_count(&db).await, 2);
    }

    #[tokio::test]
    async fn test_delete_keeps_entries_with_remaining_aliases() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.set(["x_1", "keep"], b"v".to_vec(), None).await.unwrap();

        db.delete_by_key_pattern("x_*").await.unwrap();
        assert_eq!(db.get("keep").await.unwrap().unwrap().value, b"v");
        assert_eq!(entry_count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_glob_escape_matches_literally() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.set(["h_https://r/?id=1"], b"a".to_vec(), None).await.unwrap();
        db.set(["h_https://r/Xid=1"], b"b".to_vec(), None).await.unwrap();

        let pattern = format!("*_{}", glob_escape("https://r/?id=1"));
        assert_eq!(db.delete_by_key_pattern(&pattern).await.unwrap(), 1);
        assert!(db.get("h_https://r/Xid=1").await.unwrap().is_some());
    }
}
