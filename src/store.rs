#![forbid(unsafe_code)]

//! Document persistence layer for tubesync.
//!
//! Every collection is a SQLite table holding its natural-key columns plus the
//! JSON document. A unique index over the key columns backs the upsert, so
//! repeated runs overwrite documents in place instead of duplicating them.

use std::fmt;
use std::path::{Path, PathBuf};

use libsql::params::Params;
use libsql::{Builder, Connection, Value, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Named collections written by the synchronizers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Channels,
    Videos,
    Comments,
    Transcriptions,
    LiveChats,
    SuperChats,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Channels,
        Collection::Videos,
        Collection::Comments,
        Collection::Transcriptions,
        Collection::LiveChats,
        Collection::SuperChats,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Collection::Channels => "channels",
            Collection::Videos => "videos",
            Collection::Comments => "comments",
            Collection::Transcriptions => "transcriptions",
            Collection::LiveChats => "live_chats",
            Collection::SuperChats => "super_chats",
        }
    }

    /// Fields forming the natural key, in the order `DocumentKey` values are
    /// expected.
    pub fn key_fields(self) -> &'static [&'static str] {
        match self {
            Collection::Channels => &["channel_id"],
            Collection::Comments => &["video_id", "comment_id"],
            Collection::Videos
            | Collection::Transcriptions
            | Collection::LiveChats
            | Collection::SuperChats => &["video_id"],
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Natural key values of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey(Vec<String>);

impl DocumentKey {
    pub fn single(value: impl Into<String>) -> Self {
        Self(vec![value.into()])
    }

    pub fn pair(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self(vec![first.into(), second.into()])
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("creating database directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("opening document store {}: {source}", path.display())]
    Open { path: PathBuf, source: libsql::Error },

    #[error("preparing collection {collection}: {source}")]
    Schema {
        collection: Collection,
        source: libsql::Error,
    },

    #[error("{collection} key expects {expected} field(s), got {actual}")]
    KeyArity {
        collection: Collection,
        expected: usize,
        actual: usize,
    },

    #[error("encoding {collection} document [{key}]: {source}")]
    Encode {
        collection: Collection,
        key: DocumentKey,
        source: serde_json::Error,
    },

    #[error("writing {collection} document [{key}]: {source}")]
    Write {
        collection: Collection,
        key: DocumentKey,
        source: libsql::Error,
    },

    #[error("reading {collection}: {source}")]
    Read {
        collection: Collection,
        source: libsql::Error,
    },

    #[error("decoding {collection} document: {source}")]
    Decode {
        collection: Collection,
        source: serde_json::Error,
    },
}

async fn configure_connection(conn: &Connection) -> Result<(), libsql::Error> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        "#,
    )
    .await?;
    Ok(())
}

fn create_collection_sql(collection: Collection) -> String {
    let name = collection.name();
    let fields = collection.key_fields();
    let columns: String = fields
        .iter()
        .map(|field| format!("{field} TEXT NOT NULL, "))
        .collect();
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {name} (
            {columns}document TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_{name}_key ON {name}({key});
        "#,
        key = fields.join(", "),
    )
}

async fn ensure_schema(conn: &Connection) -> Result<(), StoreError> {
    for collection in Collection::ALL {
        conn.execute_batch(&create_collection_sql(collection))
            .await
            .map_err(|source| StoreError::Schema { collection, source })?;
    }
    Ok(())
}

/// Handle over the document database shared by every synchronizer.
#[derive(Debug)]
pub struct DocumentStore {
    conn: Connection,
}

impl DocumentStore {
    /// Opens (and if necessary creates) the database and makes sure every
    /// collection and its unique key index exist.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let open_err = |source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        };
        let db = Builder::new_local(path).build().await.map_err(open_err)?;
        let conn = db.connect().map_err(open_err)?;
        configure_connection(&conn).await.map_err(open_err)?;

        ensure_schema(&conn).await?;
        tracing::debug!(path = %path.display(), "document store ready");
        Ok(Self { conn })
    }

    /// Replaces the document stored under `key`, inserting it when absent.
    pub async fn upsert<T: Serialize>(
        &self,
        collection: Collection,
        key: &DocumentKey,
        record: &T,
    ) -> Result<(), StoreError> {
        let fields = collection.key_fields();
        if fields.len() != key.values().len() {
            return Err(StoreError::KeyArity {
                collection,
                expected: fields.len(),
                actual: key.values().len(),
            });
        }

        let document = serde_json::to_string(record).map_err(|source| StoreError::Encode {
            collection,
            key: key.clone(),
            source,
        })?;

        let name = collection.name();
        let columns = fields.join(", ");
        let placeholders: Vec<String> = (1..=fields.len() + 1).map(|i| format!("?{i}")).collect();
        let sql = format!(
            r#"
            INSERT INTO {name} ({columns}, document)
            VALUES ({placeholders})
            ON CONFLICT({columns}) DO UPDATE SET
                document = excluded.document
            "#,
            placeholders = placeholders.join(", "),
        );

        let mut values: Vec<Value> = key.values().iter().cloned().map(Value::Text).collect();
        values.push(Value::Text(document));

        self.conn
            .execute(&sql, Params::Positional(values))
            .await
            .map_err(|source| StoreError::Write {
                collection,
                key: key.clone(),
                source,
            })?;
        Ok(())
    }

    /// Fetches the document stored under `key`, if any.
    pub async fn find_one<T: DeserializeOwned>(
        &self,
        collection: Collection,
        key: &DocumentKey,
    ) -> Result<Option<T>, StoreError> {
        let fields = collection.key_fields();
        if fields.len() != key.values().len() {
            return Err(StoreError::KeyArity {
                collection,
                expected: fields.len(),
                actual: key.values().len(),
            });
        }
        let filter: Vec<String> = fields
            .iter()
            .enumerate()
            .map(|(index, field)| format!("{field} = ?{}", index + 1))
            .collect();
        let sql = format!(
            "SELECT document FROM {} WHERE {}",
            collection.name(),
            filter.join(" AND ")
        );
        let values: Vec<Value> = key.values().iter().cloned().map(Value::Text).collect();

        let read_err = |source| StoreError::Read { collection, source };
        let mut rows = self
            .conn
            .query(&sql, Params::Positional(values))
            .await
            .map_err(read_err)?;
        let Some(row) = rows.next().await.map_err(read_err)? else {
            return Ok(None);
        };
        let raw: String = row.get(0).map_err(read_err)?;
        decode(collection, &raw).map(Some)
    }

    /// Returns every document of a collection in insertion order.
    pub async fn find_all<T: DeserializeOwned>(
        &self,
        collection: Collection,
    ) -> Result<Vec<T>, StoreError> {
        let read_err = |source| StoreError::Read { collection, source };
        let mut rows = self
            .conn
            .query(
                &format!("SELECT document FROM {} ORDER BY rowid", collection.name()),
                params![],
            )
            .await
            .map_err(read_err)?;

        let mut documents = Vec::new();
        while let Some(row) = rows.next().await.map_err(read_err)? {
            let raw: String = row.get(0).map_err(read_err)?;
            documents.push(decode(collection, &raw)?);
        }
        Ok(documents)
    }

    pub async fn count(&self, collection: Collection) -> Result<u64, StoreError> {
        let read_err = |source| StoreError::Read { collection, source };
        let mut rows = self
            .conn
            .query(
                &format!("SELECT COUNT(*) FROM {}", collection.name()),
                params![],
            )
            .await
            .map_err(read_err)?;
        let Some(row) = rows.next().await.map_err(read_err)? else {
            return Ok(0);
        };
        let count: i64 = row.get(0).map_err(read_err)?;
        Ok(count.max(0) as u64)
    }

    /// Drops every collection and recreates it empty.
    pub async fn reset(&self) -> Result<(), StoreError> {
        for collection in Collection::ALL {
            self.conn
                .execute_batch(&format!("DROP TABLE IF EXISTS {};", collection.name()))
                .await
                .map_err(|source| StoreError::Schema { collection, source })?;
            tracing::info!(%collection, "collection dropped");
        }
        ensure_schema(&self.conn).await
    }
}

fn decode<T: DeserializeOwned>(collection: Collection, raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|source| StoreError::Decode { collection, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::{Value as Json, json};
    use tempfile::tempdir;

    /// Opens a brand-new store inside a temporary directory so every test
    /// works on an isolated database file.
    async fn create_store() -> Result<(tempfile::TempDir, DocumentStore, PathBuf)> {
        let dir = tempdir()?;
        let path = dir.path().join("data/test.db");
        let store = DocumentStore::open(&path).await?;
        Ok((dir, store, path))
    }

    #[tokio::test]
    async fn opens_store_and_creates_collections() -> Result<()> {
        let (_temp, store, path) = create_store().await?;
        assert!(path.exists(), "database file should be created");

        for collection in Collection::ALL {
            let mut rows = store
                .conn
                .query(
                    "SELECT name FROM sqlite_master WHERE type='index' AND name=?1",
                    [format!("idx_{}_key", collection.name())],
                )
                .await?;
            assert!(
                rows.next().await?.is_some(),
                "missing unique index for {collection}"
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn upsert_replaces_document_under_same_key() -> Result<()> {
        let (_temp, store, _path) = create_store().await?;
        let key = DocumentKey::single("v1");

        store
            .upsert(Collection::Videos, &key, &json!({"video_id": "v1", "title": "old"}))
            .await?;
        store
            .upsert(Collection::Videos, &key, &json!({"video_id": "v1", "title": "new"}))
            .await?;

        assert_eq!(store.count(Collection::Videos).await?, 1);
        let stored: Json = store
            .find_one(Collection::Videos, &key)
            .await?
            .expect("document stored");
        assert_eq!(stored["title"], "new");
        Ok(())
    }

    /// Replacement is whole-document: fields missing from the new record do
    /// not survive from the old one.
    #[tokio::test]
    async fn upsert_does_not_merge_stale_fields() -> Result<()> {
        let (_temp, store, _path) = create_store().await?;
        let key = DocumentKey::single("chan");
        store
            .upsert(
                Collection::Channels,
                &key,
                &json!({"channel_id": "chan", "custom_url": "@old"}),
            )
            .await?;
        store
            .upsert(Collection::Channels, &key, &json!({"channel_id": "chan"}))
            .await?;

        let stored: Json = store.find_one(Collection::Channels, &key).await?.unwrap();
        assert!(stored.get("custom_url").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn composite_keys_are_unique_per_pair() -> Result<()> {
        let (_temp, store, _path) = create_store().await?;
        for (video, comment) in [("v1", "c1"), ("v1", "c2"), ("v2", "c1"), ("v1", "c1")] {
            store
                .upsert(
                    Collection::Comments,
                    &DocumentKey::pair(video, comment),
                    &json!({"video_id": video, "comment_id": comment}),
                )
                .await?;
        }
        assert_eq!(store.count(Collection::Comments).await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn upsert_rejects_key_with_wrong_arity() -> Result<()> {
        let (_temp, store, _path) = create_store().await?;
        let err = store
            .upsert(Collection::Comments, &DocumentKey::single("v1"), &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::KeyArity {
                expected: 2,
                actual: 1,
                ..
            }
        ));
        assert_eq!(store.count(Collection::Comments).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn find_all_keeps_insertion_order() -> Result<()> {
        let (_temp, store, _path) = create_store().await?;
        for id in ["b", "a", "c"] {
            store
                .upsert(
                    Collection::Transcriptions,
                    &DocumentKey::single(id),
                    &json!({"video_id": id}),
                )
                .await?;
        }
        let all: Vec<Json> = store.find_all(Collection::Transcriptions).await?;
        let ids: Vec<&str> = all.iter().filter_map(|d| d["video_id"].as_str()).collect();
        assert_eq!(ids, ["b", "a", "c"]);
        Ok(())
    }

    #[tokio::test]
    async fn find_one_returns_none_for_missing_key() -> Result<()> {
        let (_temp, store, _path) = create_store().await?;
        let missing: Option<Json> = store
            .find_one(Collection::LiveChats, &DocumentKey::single("ghost"))
            .await?;
        assert!(missing.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn reset_empties_every_collection() -> Result<()> {
        let (_temp, store, _path) = create_store().await?;
        store
            .upsert(Collection::Videos, &DocumentKey::single("v"), &json!({"video_id": "v"}))
            .await?;
        store
            .upsert(
                Collection::SuperChats,
                &DocumentKey::single("v"),
                &json!({"video_id": "v", "messages": []}),
            )
            .await?;

        store.reset().await?;

        for collection in Collection::ALL {
            assert_eq!(store.count(collection).await?, 0, "{collection} not empty");
        }
        // Collections are usable again right after a reset.
        store
            .upsert(Collection::Videos, &DocumentKey::single("v"), &json!({"video_id": "v"}))
            .await?;
        assert_eq!(store.count(Collection::Videos).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn reopening_keeps_existing_documents() -> Result<()> {
        let (_temp, store, path) = create_store().await?;
        store
            .upsert(Collection::Videos, &DocumentKey::single("v"), &json!({"video_id": "v"}))
            .await?;
        drop(store);

        let reopened = DocumentStore::open(&path).await?;
        assert_eq!(reopened.count(Collection::Videos).await?, 1);
        Ok(())
    }
}
