use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const DEMO_PROJECT_IDS: &[&str] =
    &["proj-downtown-office", "proj-riverside-medical", "proj-green-valley", "proj-mixed-use"];
const DEMO_CONTRACTOR_IDS: &[&str] = &[
    "ctr-summit-electric",
    "ctr-blueline-plumbing",
    "ctr-northwind-hvac",
    "ctr-granite-concrete",
];
const DEMO_COMMUNICATION_IDS: &[&str] =
    &["comm-001", "comm-002", "comm-003", "comm-004", "comm-005", "comm-006"];
const DEMO_MEETING_IDS: &[&str] = &["mtg-001", "mtg-002", "mtg-003"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub projects: usize,
    pub contractors: usize,
    pub communications: usize,
    pub meetings: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

/// Demo construction portfolio used by `atlas seed` and tests.
///
/// Four projects with financial and construction metrics, a small contractor
/// directory, recent communications and upcoming meetings.
pub struct DemoPortfolio;

impl DemoPortfolio {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_portfolio.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            projects: DEMO_PROJECT_IDS.len(),
            contractors: DEMO_CONTRACTOR_IDS.len(),
            communications: DEMO_COMMUNICATION_IDS.len(),
            meetings: DEMO_MEETING_IDS.len(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let checks = vec![
            ("projects", count_ids(pool, "projects", "id", DEMO_PROJECT_IDS).await?),
            (
                "financial-metrics",
                count_ids(pool, "project_financial_metrics", "project_id", DEMO_PROJECT_IDS)
                    .await?,
            ),
            (
                "construction-metrics",
                count_ids(pool, "project_construction_metrics", "project_id", DEMO_PROJECT_IDS)
                    .await?,
            ),
            ("contractors", count_ids(pool, "contractors", "id", DEMO_CONTRACTOR_IDS).await?),
            (
                "communications",
                count_ids(pool, "communications", "id", DEMO_COMMUNICATION_IDS).await?,
            ),
            ("meetings", count_ids(pool, "meetings", "id", DEMO_MEETING_IDS).await?),
        ];
        let all_present = checks.iter().all(|(_, passed)| *passed);

        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let meetings = sql_array_from_ids(DEMO_MEETING_IDS);
        let communications = sql_array_from_ids(DEMO_COMMUNICATION_IDS);
        let contractors = sql_array_from_ids(DEMO_CONTRACTOR_IDS);
        let projects = sql_array_from_ids(DEMO_PROJECT_IDS);

        sqlx::query(&format!("DELETE FROM meetings WHERE id IN {meetings}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM communications WHERE id IN {communications}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM contractors WHERE id IN {contractors}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM projects WHERE id IN {projects}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

async fn count_ids(
    pool: &DbPool,
    table: &str,
    column: &str,
    ids: &[&str],
) -> Result<bool, RepositoryError> {
    let quoted = sql_array_from_ids(ids);
    let count: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(1) FROM {table} WHERE {column} IN {quoted}"))
            .fetch_one(pool)
            .await?;
    Ok(count == ids.len() as i64)
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted =
        ids.iter().map(|id| format!("'{}'", id.replace('\'', "''"))).collect::<Vec<_>>().join(", ");
    format!("({quoted})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{ProjectDirectory, SqlProjectDirectory};
    use crate::{connect_with_settings, migrations};

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!DemoPortfolio::SQL.is_empty());
        for id in DEMO_PROJECT_IDS {
            assert!(DemoPortfolio::SQL.contains(id), "fixture should seed {id}");
        }
    }

    #[tokio::test]
    async fn load_is_idempotent_and_clean_removes_everything() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");

        let first = DemoPortfolio::load(&pool).await.expect("load");
        let first_verification = DemoPortfolio::verify(&pool).await.expect("verify");
        assert!(first_verification.all_present);
        assert_eq!(first.projects, 4);

        DemoPortfolio::load(&pool).await.expect("reload");
        let second_verification = DemoPortfolio::verify(&pool).await.expect("re-verify");
        assert_eq!(first_verification, second_verification);

        DemoPortfolio::clean(&pool).await.expect("clean");
        let after_clean = DemoPortfolio::verify(&pool).await.expect("verify after clean");
        assert!(!after_clean.all_present);
        assert!(after_clean.checks.iter().all(|(_, passed)| !passed));
    }

    #[tokio::test]
    async fn seeded_directory_decodes_every_row() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        DemoPortfolio::load(&pool).await.expect("load");
        let directory = SqlProjectDirectory::new(pool);

        let projects = directory.list_projects().await.expect("projects");
        assert_eq!(projects.len(), 4);
        assert_eq!(directory.all_financial_metrics().await.expect("financials").len(), 4);
        assert_eq!(directory.all_construction_metrics().await.expect("construction").len(), 4);

        let electricians =
            directory.list_contractors(Some("electrical")).await.expect("contractors");
        assert_eq!(electricians.len(), 1);
        assert_eq!(electricians[0].name, "Summit Electric Co.");

        let plumbers = directory.list_contractors(Some("plumbing")).await.expect("plumbers");
        assert_eq!(plumbers.len(), 2);
    }
}
