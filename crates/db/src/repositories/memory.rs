use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use atlas_core::domain::project::{
    Communication, CommunicationChannel, ConstructionMetrics, Contractor, FinancialMetrics,
    Meeting, Project, ProjectId,
};
use atlas_core::domain::spend::DateKey;

use super::{KeyValueStore, ProjectDirectory, RepositoryError, SpendLedger};

#[derive(Default)]
pub struct InMemoryKeyValueStore {
    values: RwLock<HashMap<String, Value>>,
}

#[async_trait::async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, RepositoryError> {
        let values = self.values.read().await;
        Ok(values.get(key).cloned())
    }

    async fn upsert(&self, key: &str, value: Value) -> Result<(), RepositoryError> {
        let mut values = self.values.write().await;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySpendLedger {
    totals: RwLock<HashMap<String, u64>>,
}

impl InMemorySpendLedger {
    pub async fn seed(&self, day: &DateKey, cents: u64) {
        let mut totals = self.totals.write().await;
        totals.insert(day.0.clone(), cents);
    }
}

#[async_trait::async_trait]
impl SpendLedger for InMemorySpendLedger {
    async fn spent_on(&self, day: &DateKey) -> Result<u64, RepositoryError> {
        let totals = self.totals.read().await;
        Ok(totals.get(day.as_str()).copied().unwrap_or(0))
    }

    async fn add(&self, day: &DateKey, cents: u64) -> Result<u64, RepositoryError> {
        let mut totals = self.totals.write().await;
        let total = totals.entry(day.0.clone()).or_insert(0);
        *total = total.saturating_add(cents);
        Ok(*total)
    }
}

/// Directory backed by plain vectors. `fail_metrics` makes every metrics
/// lookup fail so callers can exercise their degraded paths.
#[derive(Default)]
pub struct InMemoryProjectDirectory {
    pub projects: Vec<Project>,
    pub financials: Vec<FinancialMetrics>,
    pub construction: Vec<ConstructionMetrics>,
    pub contractors: Vec<Contractor>,
    pub communications: Vec<Communication>,
    pub meetings: Vec<Meeting>,
    pub fail_metrics: bool,
}

impl InMemoryProjectDirectory {
    fn metrics_guard(&self) -> Result<(), RepositoryError> {
        if self.fail_metrics {
            return Err(RepositoryError::Unavailable("metrics tables unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProjectDirectory for InMemoryProjectDirectory {
    async fn list_projects(&self) -> Result<Vec<Project>, RepositoryError> {
        let mut projects = self.projects.clone();
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    async fn find_project(&self, id: &ProjectId) -> Result<Option<Project>, RepositoryError> {
        Ok(self.projects.iter().find(|project| &project.id == id).cloned())
    }

    async fn financial_metrics(
        &self,
        id: &ProjectId,
    ) -> Result<Option<FinancialMetrics>, RepositoryError> {
        self.metrics_guard()?;
        Ok(self.financials.iter().find(|metrics| &metrics.project_id == id).cloned())
    }

    async fn construction_metrics(
        &self,
        id: &ProjectId,
    ) -> Result<Option<ConstructionMetrics>, RepositoryError> {
        self.metrics_guard()?;
        Ok(self.construction.iter().find(|metrics| &metrics.project_id == id).cloned())
    }

    async fn all_financial_metrics(&self) -> Result<Vec<FinancialMetrics>, RepositoryError> {
        self.metrics_guard()?;
        Ok(self.financials.clone())
    }

    async fn all_construction_metrics(&self) -> Result<Vec<ConstructionMetrics>, RepositoryError> {
        self.metrics_guard()?;
        Ok(self.construction.clone())
    }

    async fn list_contractors(
        &self,
        specialty: Option<&str>,
    ) -> Result<Vec<Contractor>, RepositoryError> {
        let mut contractors = self
            .contractors
            .iter()
            .filter(|contractor| specialty.map_or(true, |value| contractor.has_specialty(value)))
            .cloned()
            .collect::<Vec<_>>();
        contractors.sort_by(|a, b| {
            b.rating.partial_cmp(&a.rating).unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(contractors)
    }

    async fn communications(
        &self,
        project_id: Option<&ProjectId>,
        channel: Option<CommunicationChannel>,
        limit: u32,
    ) -> Result<Vec<Communication>, RepositoryError> {
        let mut matching = self
            .communications
            .iter()
            .filter(|item| project_id.map_or(true, |id| item.project_id.as_ref() == Some(id)))
            .filter(|item| channel.map_or(true, |channel| item.channel == channel))
            .cloned()
            .collect::<Vec<_>>();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit as usize);
        Ok(matching)
    }

    async fn upcoming_meetings(
        &self,
        after: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Meeting>, RepositoryError> {
        let mut upcoming =
            self.meetings.iter().filter(|meeting| meeting.start_time >= after).cloned().collect::<Vec<_>>();
        upcoming.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        upcoming.truncate(limit as usize);
        Ok(upcoming)
    }
}
