use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Project id meaning "every project in the portfolio".
pub const PORTFOLIO_PROJECT_ID: &str = "portfolio";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn is_portfolio(&self) -> bool {
        let trimmed = self.0.trim();
        trimmed.is_empty() || trimmed == PORTFOLIO_PROJECT_ID
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub phase: Option<String>,
    pub total_value: Decimal,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinancialMetrics {
    pub project_id: ProjectId,
    pub total_budget: Decimal,
    pub spent_to_date: Decimal,
    pub contingency_used: Decimal,
    pub contingency_remaining: Decimal,
    pub forecasted_cost: Option<Decimal>,
    pub roi: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstructionMetrics {
    pub project_id: ProjectId,
    pub overall_completion: f64,
    pub current_phase: Option<String>,
    pub safety_score: f64,
    pub quality_score: f64,
    pub schedule_variance: f64,
    pub safety_incidents: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contractor {
    pub id: String,
    pub name: String,
    pub specialties: Vec<String>,
    pub rating: f64,
    pub active_projects: u32,
}

impl Contractor {
    pub fn has_specialty(&self, specialty: &str) -> bool {
        let wanted = specialty.trim().to_ascii_lowercase();
        self.specialties.iter().any(|value| value.to_ascii_lowercase() == wanted)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationChannel {
    Email,
    Teams,
    Sms,
    Note,
}

impl CommunicationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Teams => "teams",
            Self::Sms => "sms",
            Self::Note => "note",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "email" => Some(Self::Email),
            "teams" => Some(Self::Teams),
            "sms" => Some(Self::Sms),
            "note" => Some(Self::Note),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Communication {
    pub id: String,
    pub project_id: Option<ProjectId>,
    pub channel: CommunicationChannel,
    pub subject: Option<String>,
    pub sender: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    pub project_id: Option<ProjectId>,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub attendees: Vec<String>,
}
