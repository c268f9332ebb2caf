use chrono::Utc;
use serde_json::Value;
use sqlx::Row;

use super::{KeyValueStore, RepositoryError};
use crate::DbPool;

pub struct SqlKeyValueStore {
    pool: DbPool,
}

impl SqlKeyValueStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl KeyValueStore for SqlKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, RepositoryError> {
        let row = sqlx::query("SELECT value_json FROM conversation_memory WHERE memory_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            let raw: String = row
                .try_get("value_json")
                .map_err(|error| RepositoryError::Decode(error.to_string()))?;
            serde_json::from_str(&raw).map_err(|error| {
                RepositoryError::Decode(format!("invalid JSON stored under {key}: {error}"))
            })
        })
        .transpose()
    }

    async fn upsert(&self, key: &str, value: Value) -> Result<(), RepositoryError> {
        let encoded = serde_json::to_string(&value)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO conversation_memory (memory_key, value_json, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(memory_key) DO UPDATE SET
                value_json = excluded.value_json,
                updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(encoded)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::SqlKeyValueStore;
    use crate::repositories::KeyValueStore;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn upsert_overwrites_by_key() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let store = SqlKeyValueStore::new(pool);

        assert_eq!(store.get("conversation:u1:p1").await.expect("get"), None);

        store.upsert("conversation:u1:p1", json!([{"content": "hi"}])).await.expect("first");
        store.upsert("conversation:u1:p1", json!([{"content": "hello"}])).await.expect("second");

        let stored = store.get("conversation:u1:p1").await.expect("get").expect("value");
        assert_eq!(stored, json!([{"content": "hello"}]));
    }
}
