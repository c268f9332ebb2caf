use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use atlas_core::domain::project::{
    Communication, CommunicationChannel, ConstructionMetrics, Contractor, FinancialMetrics,
    Meeting, Project, ProjectId,
};

use super::{
    parse_date, parse_decimal, parse_string_list, parse_timestamp, ProjectDirectory,
    RepositoryError,
};
use crate::DbPool;

const PROJECT_COLUMNS: &str =
    "id, name, description, status, phase, total_value, start_date, end_date";
const FINANCIAL_COLUMNS: &str = "project_id, total_budget, spent_to_date, contingency_used,
    contingency_remaining, forecasted_cost, roi";
const CONSTRUCTION_COLUMNS: &str = "project_id, overall_completion, current_phase, safety_score,
    quality_score, schedule_variance, safety_incidents";

pub struct SqlProjectDirectory {
    pool: DbPool,
}

impl SqlProjectDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProjectDirectory for SqlProjectDirectory {
    async fn list_projects(&self) -> Result<Vec<Project>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY name ASC"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(project_from_row).collect()
    }

    async fn find_project(&self, id: &ProjectId) -> Result<Option<Project>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(project_from_row).transpose()
    }

    async fn financial_metrics(
        &self,
        id: &ProjectId,
    ) -> Result<Option<FinancialMetrics>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {FINANCIAL_COLUMNS} FROM project_financial_metrics WHERE project_id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(financial_from_row).transpose()
    }

    async fn construction_metrics(
        &self,
        id: &ProjectId,
    ) -> Result<Option<ConstructionMetrics>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CONSTRUCTION_COLUMNS} FROM project_construction_metrics WHERE project_id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(construction_from_row).transpose()
    }

    async fn all_financial_metrics(&self) -> Result<Vec<FinancialMetrics>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {FINANCIAL_COLUMNS} FROM project_financial_metrics ORDER BY project_id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(financial_from_row).collect()
    }

    async fn all_construction_metrics(&self) -> Result<Vec<ConstructionMetrics>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {CONSTRUCTION_COLUMNS} FROM project_construction_metrics ORDER BY project_id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(construction_from_row).collect()
    }

    async fn list_contractors(
        &self,
        specialty: Option<&str>,
    ) -> Result<Vec<Contractor>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, specialties_json, rating, active_projects
             FROM contractors
             ORDER BY rating DESC, name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let contractors = rows.iter().map(contractor_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(match specialty {
            Some(specialty) => {
                contractors.into_iter().filter(|value| value.has_specialty(specialty)).collect()
            }
            None => contractors,
        })
    }

    async fn communications(
        &self,
        project_id: Option<&ProjectId>,
        channel: Option<CommunicationChannel>,
        limit: u32,
    ) -> Result<Vec<Communication>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, project_id, channel, subject, sender, body, created_at
             FROM communications
             WHERE (?1 IS NULL OR project_id = ?1)
               AND (?2 IS NULL OR channel = ?2)
             ORDER BY created_at DESC
             LIMIT ?3",
        )
        .bind(project_id.map(|id| id.0.as_str()))
        .bind(channel.map(|value| value.as_str()))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(communication_from_row).collect()
    }

    async fn upcoming_meetings(
        &self,
        after: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Meeting>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, project_id, title, start_time, end_time, attendees_json
             FROM meetings
             WHERE start_time >= ?
             ORDER BY start_time ASC
             LIMIT ?",
        )
        .bind(after.to_rfc3339_opts(SecondsFormat::Secs, true))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(meeting_from_row).collect()
    }
}

fn decode<T>(result: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    result.map_err(|error| RepositoryError::Decode(error.to_string()))
}

fn project_from_row(row: &SqliteRow) -> Result<Project, RepositoryError> {
    let total_value: String = decode(row.try_get("total_value"))?;
    let start_date: Option<String> = decode(row.try_get("start_date"))?;
    let end_date: Option<String> = decode(row.try_get("end_date"))?;

    Ok(Project {
        id: ProjectId(decode(row.try_get("id"))?),
        name: decode(row.try_get("name"))?,
        description: decode(row.try_get("description"))?,
        status: decode(row.try_get("status"))?,
        phase: decode(row.try_get("phase"))?,
        total_value: parse_decimal("projects.total_value", &total_value)?,
        start_date: start_date
            .as_deref()
            .map(|value| parse_date("projects.start_date", value))
            .transpose()?,
        end_date: end_date
            .as_deref()
            .map(|value| parse_date("projects.end_date", value))
            .transpose()?,
    })
}

fn financial_from_row(row: &SqliteRow) -> Result<FinancialMetrics, RepositoryError> {
    let decimal = |column: &str| -> Result<_, RepositoryError> {
        let raw: String = decode(row.try_get(column))?;
        parse_decimal(column, &raw)
    };
    let forecasted: Option<String> = decode(row.try_get("forecasted_cost"))?;

    Ok(FinancialMetrics {
        project_id: ProjectId(decode(row.try_get("project_id"))?),
        total_budget: decimal("total_budget")?,
        spent_to_date: decimal("spent_to_date")?,
        contingency_used: decimal("contingency_used")?,
        contingency_remaining: decimal("contingency_remaining")?,
        forecasted_cost: forecasted
            .as_deref()
            .map(|value| parse_decimal("forecasted_cost", value))
            .transpose()?,
        roi: decode(row.try_get("roi"))?,
    })
}

fn construction_from_row(row: &SqliteRow) -> Result<ConstructionMetrics, RepositoryError> {
    let incidents: i64 = decode(row.try_get("safety_incidents"))?;

    Ok(ConstructionMetrics {
        project_id: ProjectId(decode(row.try_get("project_id"))?),
        overall_completion: decode(row.try_get("overall_completion"))?,
        current_phase: decode(row.try_get("current_phase"))?,
        safety_score: decode(row.try_get("safety_score"))?,
        quality_score: decode(row.try_get("quality_score"))?,
        schedule_variance: decode(row.try_get("schedule_variance"))?,
        safety_incidents: u32::try_from(incidents)
            .map_err(|_| RepositoryError::Decode(format!("invalid safety_incidents {incidents}")))?,
    })
}

fn contractor_from_row(row: &SqliteRow) -> Result<Contractor, RepositoryError> {
    let specialties: String = decode(row.try_get("specialties_json"))?;
    let active_projects: i64 = decode(row.try_get("active_projects"))?;

    Ok(Contractor {
        id: decode(row.try_get("id"))?,
        name: decode(row.try_get("name"))?,
        specialties: parse_string_list("contractors.specialties_json", &specialties)?,
        rating: decode(row.try_get("rating"))?,
        active_projects: u32::try_from(active_projects).map_err(|_| {
            RepositoryError::Decode(format!("invalid active_projects {active_projects}"))
        })?,
    })
}

fn communication_from_row(row: &SqliteRow) -> Result<Communication, RepositoryError> {
    let channel: String = decode(row.try_get("channel"))?;
    let created_at: String = decode(row.try_get("created_at"))?;
    let project_id: Option<String> = decode(row.try_get("project_id"))?;

    Ok(Communication {
        id: decode(row.try_get("id"))?,
        project_id: project_id.map(ProjectId),
        channel: CommunicationChannel::parse(&channel).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown communication channel `{channel}`"))
        })?,
        subject: decode(row.try_get("subject"))?,
        sender: decode(row.try_get("sender"))?,
        body: decode(row.try_get("body"))?,
        created_at: parse_timestamp("communications.created_at", &created_at)?,
    })
}

fn meeting_from_row(row: &SqliteRow) -> Result<Meeting, RepositoryError> {
    let start_time: String = decode(row.try_get("start_time"))?;
    let end_time: Option<String> = decode(row.try_get("end_time"))?;
    let attendees: String = decode(row.try_get("attendees_json"))?;
    let project_id: Option<String> = decode(row.try_get("project_id"))?;

    Ok(Meeting {
        id: decode(row.try_get("id"))?,
        project_id: project_id.map(ProjectId),
        title: decode(row.try_get("title"))?,
        start_time: parse_timestamp("meetings.start_time", &start_time)?,
        end_time: end_time
            .as_deref()
            .map(|value| parse_timestamp("meetings.end_time", value))
            .transpose()?,
        attendees: parse_string_list("meetings.attendees_json", &attendees)?,
    })
}
