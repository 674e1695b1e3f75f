//! Document store client over a pooled SQLite handle.
//!
//! Collections are schemaless: each one is a `(id, body)` table whose body is
//! a JSON document. Filters are flat Mongo-style maps; `"_id"` hits the
//! primary-key column, `"a.b"` matches any element of array `a` whose field
//! `b` equals the value, and any other key compares `json_extract(body, key)`.
//! JSON paths are always bound as parameters, never interpolated.

use std::marker::PhantomData;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Errors from the document store client
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid store URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid collection name: {0}")]
    InvalidCollectionName(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Document is not a JSON object")]
    NotAnObject,

    #[error("Document has no _id")]
    MissingId,

    #[error("Malformed document: {0}")]
    MalformedDocument(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Shared-by-reference store handle. Cheap to clone; all clones share the
/// same connection pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect to the store at the given sqlx SQLite URL.
    pub async fn connect(url: &str) -> Result<Store, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|_| StoreError::InvalidUrl(url.to_string()))?
            .create_if_missing(true);

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(crate::config::config().store.max_connections);

        // Every connection to ":memory:" opens a distinct database, so the
        // pool must hold exactly one connection and never reap it.
        if url.contains(":memory:") {
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options.connect_with(options).await?;
        info!("Connected to document store: {}", url);
        Ok(Store { pool })
    }

    /// Create the backing tables for the named collections.
    pub async fn init(&self, collections: &[&str]) -> Result<(), StoreError> {
        for name in collections {
            let table = valid_collection_name(name)?;
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (id TEXT PRIMARY KEY, body TEXT NOT NULL)"
            ))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Typed handle for one collection.
    pub fn collection<T>(&self, name: &str) -> Collection<T> {
        Collection {
            name: name.to_string(),
            pool: self.pool.clone(),
            _phantom: PhantomData,
        }
    }

    /// Connectivity check for the health endpoint.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the pool on shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Closed document store pool");
    }
}

pub struct Collection<T> {
    name: String,
    pool: SqlitePool,
    _phantom: PhantomData<T>,
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned + Send + Unpin,
{
    pub async fn find(&self, filter: Value) -> Result<Vec<T>, StoreError> {
        let table = valid_collection_name(&self.name)?;
        let (pred, binds) = compile_filter(&filter)?;
        let sql = format!("SELECT body FROM {table} WHERE {pred}");
        let rows = bind_all(sqlx::query(&sql), binds).fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    pub async fn find_one(&self, filter: Value) -> Result<Option<T>, StoreError> {
        let table = valid_collection_name(&self.name)?;
        let (pred, binds) = compile_filter(&filter)?;
        let sql = format!("SELECT body FROM {table} WHERE {pred} LIMIT 1");
        let row = bind_all(sqlx::query(&sql), binds)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_row).transpose()
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<T>, StoreError> {
        let table = valid_collection_name(&self.name)?;
        let sql = format!("SELECT body FROM {table} WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_row).transpose()
    }

    /// Apply a flat `$set`-style update to the first document matching the
    /// filter and return the updated document. A JSON null value deletes the
    /// key (SQLite `json_patch` semantics).
    pub async fn find_one_and_update(
        &self,
        filter: Value,
        update: Value,
    ) -> Result<Option<T>, StoreError> {
        if !update.is_object() {
            return Err(StoreError::InvalidFilter("update must be an object".to_string()));
        }
        let table = valid_collection_name(&self.name)?;
        let (pred, binds) = compile_filter(&filter)?;
        let sql = format!(
            "UPDATE {table} SET body = json_patch(body, ?) \
             WHERE id IN (SELECT id FROM {table} WHERE {pred} LIMIT 1) \
             RETURNING body"
        );
        let query = sqlx::query(&sql).bind(update.to_string());
        let row = bind_all(query, binds).fetch_optional(&self.pool).await?;
        row.as_ref().map(decode_row).transpose()
    }

    /// Delete the first document matching the filter and return it.
    pub async fn find_one_and_delete(&self, filter: Value) -> Result<Option<T>, StoreError> {
        let table = valid_collection_name(&self.name)?;
        let (pred, binds) = compile_filter(&filter)?;
        let sql = format!(
            "DELETE FROM {table} \
             WHERE id IN (SELECT id FROM {table} WHERE {pred} LIMIT 1) \
             RETURNING body"
        );
        let row = bind_all(sqlx::query(&sql), binds)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_row).transpose()
    }

    pub async fn delete_many(&self, filter: Value) -> Result<u64, StoreError> {
        let table = valid_collection_name(&self.name)?;
        let (pred, binds) = compile_filter(&filter)?;
        let sql = format!("DELETE FROM {table} WHERE {pred}");
        let result = bind_all(sqlx::query(&sql), binds).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Insert or replace a document. Mints a v4 uuid for `_id` when the
    /// serialized document lacks one, the way a driver assigns ids
    /// client-side. Returns the document as stored.
    pub async fn save(&self, doc: &T) -> Result<T, StoreError> {
        let table = valid_collection_name(&self.name)?;
        let mut value = serde_json::to_value(doc)?;
        let obj = value.as_object_mut().ok_or(StoreError::NotAnObject)?;

        let id = match obj.get("_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                obj.insert("_id".to_string(), Value::String(id.clone()));
                id
            }
        };

        let sql = format!(
            "INSERT INTO {table} (id, body) VALUES (?, ?) \
             ON CONFLICT(id) DO UPDATE SET body = excluded.body"
        );
        sqlx::query(&sql)
            .bind(id)
            .bind(value.to_string())
            .execute(&self.pool)
            .await?;

        Ok(serde_json::from_value(value)?)
    }

    /// Delete a document by its own `_id`.
    pub async fn remove(&self, doc: &T) -> Result<(), StoreError> {
        let table = valid_collection_name(&self.name)?;
        let value = serde_json::to_value(doc)?;
        let id = value
            .get("_id")
            .and_then(Value::as_str)
            .ok_or(StoreError::MissingId)?
            .to_string();
        let sql = format!("DELETE FROM {table} WHERE id = ?");
        sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn count(&self, filter: Value) -> Result<i64, StoreError> {
        let table = valid_collection_name(&self.name)?;
        let (pred, binds) = compile_filter(&filter)?;
        let sql = format!("SELECT COUNT(*) AS n FROM {table} WHERE {pred}");
        let row = bind_all(sqlx::query(&sql), binds).fetch_one(&self.pool).await?;
        Ok(row.try_get("n")?)
    }
}

fn decode_row<T: DeserializeOwned>(row: &SqliteRow) -> Result<T, StoreError> {
    let body: String = row.try_get("body")?;
    Ok(serde_json::from_str(&body)?)
}

/// Validate collection names, which are interpolated into table positions.
fn valid_collection_name(name: &str) -> Result<&str, StoreError> {
    let mut chars = name.chars();
    let head_ok = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_');
    let tail_ok = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if head_ok && tail_ok {
        Ok(name)
    } else {
        Err(StoreError::InvalidCollectionName(name.to_string()))
    }
}

enum Bind {
    Text(String),
    Int(i64),
    Real(f64),
}

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_all(mut query: SqliteQuery<'_>, binds: Vec<Bind>) -> SqliteQuery<'_> {
    for bind in binds {
        query = match bind {
            Bind::Text(v) => query.bind(v),
            Bind::Int(v) => query.bind(v),
            Bind::Real(v) => query.bind(v),
        };
    }
    query
}

/// Translate a flat filter map into an SQL predicate plus bind values.
fn compile_filter(filter: &Value) -> Result<(String, Vec<Bind>), StoreError> {
    let map = match filter {
        Value::Null => return Ok(("1 = 1".to_string(), Vec::new())),
        Value::Object(map) => map,
        other => {
            return Err(StoreError::InvalidFilter(format!(
                "filter must be an object, got {other}"
            )))
        }
    };

    if map.is_empty() {
        return Ok(("1 = 1".to_string(), Vec::new()));
    }

    let mut fragments = Vec::with_capacity(map.len());
    let mut binds = Vec::new();

    for (key, value) in map {
        valid_filter_key(key)?;

        if key.as_str() == "_id" {
            let id = value
                .as_str()
                .ok_or_else(|| StoreError::InvalidFilter("_id must be a string".to_string()))?;
            fragments.push("id = ?".to_string());
            binds.push(Bind::Text(id.to_string()));
        } else if let Some((array_field, sub_path)) = key.split_once('.') {
            // Array membership: some element of `array_field` has `sub_path`
            // equal to the value.
            let (comparison, value_bind) = comparison_sql("json_extract(value, ?)", value)?;
            fragments.push(format!(
                "EXISTS (SELECT 1 FROM json_each(body, ?) WHERE {comparison})"
            ));
            binds.push(Bind::Text(format!("$.{array_field}")));
            binds.push(Bind::Text(format!("$.{sub_path}")));
            binds.extend(value_bind);
        } else {
            let (comparison, value_bind) = comparison_sql("json_extract(body, ?)", value)?;
            fragments.push(comparison);
            binds.push(Bind::Text(format!("$.{key}")));
            binds.extend(value_bind);
        }
    }

    Ok((fragments.join(" AND "), binds))
}

fn comparison_sql(extract: &str, value: &Value) -> Result<(String, Option<Bind>), StoreError> {
    match value {
        // json_extract yields NULL for both missing keys and JSON null
        Value::Null => Ok((format!("{extract} IS NULL"), None)),
        Value::String(s) => Ok((format!("{extract} = ?"), Some(Bind::Text(s.clone())))),
        Value::Bool(b) => Ok((format!("{extract} = ?"), Some(Bind::Int(i64::from(*b))))),
        Value::Number(n) => {
            let bind = if let Some(i) = n.as_i64() {
                Bind::Int(i)
            } else if let Some(f) = n.as_f64() {
                Bind::Real(f)
            } else {
                return Err(StoreError::InvalidFilter(format!("unsupported number {n}")));
            };
            Ok((format!("{extract} = ?"), Some(bind)))
        }
        other => Err(StoreError::InvalidFilter(format!(
            "unsupported filter value {other}"
        ))),
    }
}

/// Filter keys become JSON path text; keep them to plain field names.
fn valid_filter_key(key: &str) -> Result<(), StoreError> {
    let ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidFilter(format!("bad filter key {key:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Grant {
        access: String,
        token: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        #[serde(rename = "_id")]
        id: Option<Uuid>,
        label: String,
        done: bool,
        #[serde(default)]
        grants: Vec<Grant>,
    }

    fn note(label: &str, done: bool) -> Note {
        Note {
            id: None,
            label: label.to_string(),
            done,
            grants: Vec::new(),
        }
    }

    async fn memory_store() -> Store {
        let store = Store::connect("sqlite::memory:").await.expect("connect");
        store.init(&["notes"]).await.expect("init");
        store
    }

    #[tokio::test]
    async fn save_assigns_id_and_find_by_id_round_trips() {
        let store = memory_store().await;
        let col = store.collection::<Note>("notes");

        let saved = col.save(&note("alpha", false)).await.unwrap();
        let id = saved.id.expect("id assigned on save");

        let found = col.find_by_id(id).await.unwrap().expect("document exists");
        assert_eq!(found, saved);
        assert!(col.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn filters_match_strings_and_booleans() {
        let store = memory_store().await;
        let col = store.collection::<Note>("notes");
        col.save(&note("alpha", false)).await.unwrap();
        col.save(&note("beta", true)).await.unwrap();

        let done = col.find(json!({"done": true})).await.unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].label, "beta");

        let miss = col.find_one(json!({"label": "gamma"})).await.unwrap();
        assert!(miss.is_none());
        assert_eq!(col.count(json!({})).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn filters_match_array_elements() {
        let store = memory_store().await;
        let col = store.collection::<Note>("notes");

        let mut holder = note("alpha", false);
        holder.grants.push(Grant {
            access: "auth".to_string(),
            token: "tok-1".to_string(),
        });
        col.save(&holder).await.unwrap();
        col.save(&note("beta", false)).await.unwrap();

        let hit = col
            .find_one(json!({"grants.token": "tok-1", "grants.access": "auth"}))
            .await
            .unwrap();
        assert_eq!(hit.expect("match").label, "alpha");

        let miss = col
            .find_one(json!({"grants.token": "tok-2"}))
            .await
            .unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn find_one_and_update_patches_and_null_clears_keys() {
        let store = memory_store().await;
        let col = store.collection::<Note>("notes");
        let saved = col.save(&note("alpha", false)).await.unwrap();

        let updated = col
            .find_one_and_update(
                json!({"_id": saved.id}),
                json!({"label": "renamed", "done": true}),
            )
            .await
            .unwrap()
            .expect("updated");
        assert_eq!(updated.label, "renamed");
        assert!(updated.done);

        // Null deletes the key; Option fields read back as None
        let cleared = col
            .find_one_and_update(json!({"_id": saved.id}), json!({"_extra": null}))
            .await
            .unwrap()
            .expect("still present");
        assert_eq!(cleared.label, "renamed");

        let none = col
            .find_one_and_update(json!({"label": "missing"}), json!({"done": false}))
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn find_one_and_delete_removes_and_returns() {
        let store = memory_store().await;
        let col = store.collection::<Note>("notes");
        let saved = col.save(&note("alpha", false)).await.unwrap();

        let deleted = col
            .find_one_and_delete(json!({"_id": saved.id}))
            .await
            .unwrap()
            .expect("deleted doc returned");
        assert_eq!(deleted.label, "alpha");
        assert_eq!(col.count(json!({})).await.unwrap(), 0);

        let again = col.find_one_and_delete(json!({"_id": saved.id})).await.unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn remove_and_delete_many() {
        let store = memory_store().await;
        let col = store.collection::<Note>("notes");
        let saved = col.save(&note("alpha", false)).await.unwrap();
        col.save(&note("beta", true)).await.unwrap();
        col.save(&note("gamma", true)).await.unwrap();

        col.remove(&saved).await.unwrap();
        assert_eq!(col.count(json!({})).await.unwrap(), 2);

        let removed = col.delete_many(json!({"done": true})).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(col.count(json!({})).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rejects_hostile_collection_and_filter_names() {
        let store = memory_store().await;
        let col = store.collection::<Note>("notes; DROP TABLE notes");
        assert!(matches!(
            col.find(json!({})).await,
            Err(StoreError::InvalidCollectionName(_))
        ));

        let col = store.collection::<Note>("notes");
        assert!(matches!(
            col.find(json!({"label')) OR 1=1 --": "x"})).await,
            Err(StoreError::InvalidFilter(_))
        ));
    }
}
