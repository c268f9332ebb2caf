use chrono::Utc;

use atlas_core::domain::spend::DateKey;

use super::{RepositoryError, SpendLedger};
use crate::DbPool;

pub struct SqlSpendLedger {
    pool: DbPool,
}

impl SqlSpendLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn to_cents(value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("negative spend total {value}")))
}

#[async_trait::async_trait]
impl SpendLedger for SqlSpendLedger {
    async fn spent_on(&self, day: &DateKey) -> Result<u64, RepositoryError> {
        let cents: Option<i64> =
            sqlx::query_scalar("SELECT cents FROM daily_spend WHERE date_key = ?")
                .bind(day.as_str())
                .fetch_optional(&self.pool)
                .await?;

        cents.map(to_cents).transpose().map(|value| value.unwrap_or(0))
    }

    async fn add(&self, day: &DateKey, cents: u64) -> Result<u64, RepositoryError> {
        let delta = i64::try_from(cents)
            .map_err(|_| RepositoryError::Decode(format!("spend delta {cents} out of range")))?;

        let total: i64 = sqlx::query_scalar(
            "INSERT INTO daily_spend (date_key, cents, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(date_key) DO UPDATE SET
                cents = daily_spend.cents + excluded.cents,
                updated_at = excluded.updated_at
             RETURNING cents",
        )
        .bind(day.as_str())
        .bind(delta)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        to_cents(total)
    }
}

#[cfg(test)]
mod tests {
    use atlas_core::domain::spend::DateKey;

    use super::SqlSpendLedger;
    use crate::repositories::SpendLedger;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn increments_accumulate_per_day() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let ledger = SqlSpendLedger::new(pool);
        let today = DateKey("2026-03-02".to_string());
        let tomorrow = DateKey("2026-03-03".to_string());

        assert_eq!(ledger.spent_on(&today).await.expect("read"), 0);
        assert_eq!(ledger.add(&today, 12).await.expect("add"), 12);
        assert_eq!(ledger.add(&today, 0).await.expect("add zero"), 12);
        assert_eq!(ledger.add(&today, 30).await.expect("add"), 42);
        assert_eq!(ledger.spent_on(&today).await.expect("read"), 42);
        assert_eq!(ledger.spent_on(&tomorrow).await.expect("new day"), 0);
    }
}
