//! Tool execution: detection, validation, approval gating, dispatch and audit.
//!
//! Every call produces exactly one [`ToolResult`] and one audit record. Read
//! tools are answered from the [`ProjectDirectory`]; write tools are forwarded
//! to the [`PlatformActions`] boundary once they clear approval and guardrails.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use atlas_core::audit::{InvocationStatus, ToolInvocation, ToolInvocationSink};
use atlas_core::domain::project::{
    CommunicationChannel, ConstructionMetrics, FinancialMetrics, Project, ProjectId,
    PORTFOLIO_PROJECT_ID,
};
use atlas_core::domain::spend::Clock;
use atlas_core::domain::tool::{ToolName, ToolSpec};
use atlas_core::errors::{ApplicationError, DomainError};
use atlas_db::ProjectDirectory;

use crate::guardrails::{GuardrailDecision, GuardrailPolicy};
use crate::intent::{match_project_name, IntentClassifier, IntentContext, ToolCall};
use crate::platform::{PlatformActionRequest, PlatformActions};

const READ_LIMIT: u32 = 10;
const SIDE_EFFECT_NOTICE: &str = "This tool will make changes to external systems";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Completed,
    PendingApproval,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: ToolName,
    pub execution_id: String,
    pub status: ToolStatus,
    pub success: bool,
    pub requires_approval: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub tool_parameters: Value,
    pub cost_cents: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost_cents: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_effects: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub execution_time_ms: u64,
}

impl ToolResult {
    fn base(tool: ToolName, execution_id: &str, parameters: &Map<String, Value>) -> Self {
        Self {
            tool_name: tool,
            execution_id: execution_id.to_string(),
            status: ToolStatus::Error,
            success: false,
            requires_approval: false,
            result: None,
            error: None,
            tool_parameters: Value::Object(parameters.clone()),
            cost_cents: 0.0,
            estimated_cost_cents: None,
            side_effects: None,
            timestamp: Utc::now(),
            execution_time_ms: 0,
        }
    }
}

/// Per-request inputs to [`ToolExecutor::analyze_and_execute`].
#[derive(Clone, Copy, Debug)]
pub struct ToolRequest<'a> {
    pub message: &'a str,
    pub project_id: &'a ProjectId,
    pub user_id: &'a str,
    pub require_approval: bool,
    /// `tool_name -> {param: value}` supplied explicitly by the caller.
    pub parameter_overrides: Option<&'a Map<String, Value>>,
}

pub struct ToolExecutor {
    classifier: Arc<dyn IntentClassifier>,
    directory: Arc<dyn ProjectDirectory>,
    platform: Arc<dyn PlatformActions>,
    sink: Arc<dyn ToolInvocationSink>,
    guardrails: GuardrailPolicy,
    clock: Arc<dyn Clock>,
}

impl ToolExecutor {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        directory: Arc<dyn ProjectDirectory>,
        platform: Arc<dyn PlatformActions>,
        sink: Arc<dyn ToolInvocationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            classifier,
            directory,
            platform,
            sink,
            guardrails: GuardrailPolicy::default(),
            clock,
        }
    }

    pub fn with_guardrails(mut self, guardrails: GuardrailPolicy) -> Self {
        self.guardrails = guardrails;
        self
    }

    /// Detects the relevant tools for a message and runs them in order.
    pub async fn analyze_and_execute(&self, request: &ToolRequest<'_>) -> Vec<ToolResult> {
        let context = IntentContext {
            message: request.message,
            project_id: request.project_id,
            today: self.clock.today(),
        };
        let mut calls = self.classifier.classify(&context);
        apply_overrides(&mut calls, request.parameter_overrides);

        if let Some(project) = self.named_project(request.message).await {
            for call in &mut calls {
                let overridden = request
                    .parameter_overrides
                    .and_then(|overrides| overrides.get(call.tool.as_str()))
                    .and_then(|params| params.get("project_id"))
                    .is_some();
                if call.parameters.contains_key("project_id") && !overridden {
                    call.parameters
                        .insert("project_id".to_string(), Value::String(project.id.0.clone()));
                }
            }
        }

        info!(
            event_name = "tools.analyze.detected",
            user_id = %request.user_id,
            project_id = %request.project_id.0,
            tool_count = calls.len(),
            "tool calls detected"
        );

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute(call, request).await);
        }
        results
    }

    /// Runs one call through validate, approval, guardrail and dispatch.
    pub async fn execute(&self, call: ToolCall, request: &ToolRequest<'_>) -> ToolResult {
        let started = Instant::now();
        let spec = call.tool.spec();
        let execution_id = format!("exec_{}", Uuid::new_v4().simple());
        let project_id = call
            .parameters
            .get("project_id")
            .and_then(Value::as_str)
            .unwrap_or(&request.project_id.0)
            .to_string();
        let mut result = ToolResult::base(call.tool, &execution_id, &call.parameters);

        if let Err(error) = validate_parameters(&spec, &call.parameters) {
            warn!(
                event_name = "tools.execute.validation_failed",
                tool = %call.tool,
                execution_id = %execution_id,
                error = %error,
                "tool parameters are incomplete"
            );
            let message = error.to_string();
            self.log_with(
                &call,
                &execution_id,
                InvocationStatus::Failed,
                0.0,
                json!({"error": message}),
                request,
                &project_id,
            )
            .await;
            result.error = Some(message);
            result.execution_time_ms = elapsed_ms(started);
            return result;
        }

        if spec.side_effect && request.require_approval {
            info!(
                event_name = "tools.execute.pending_approval",
                tool = %call.tool,
                execution_id = %execution_id,
                "write tool held for approval"
            );
            result.status = ToolStatus::PendingApproval;
            result.requires_approval = true;
            result.estimated_cost_cents = Some(spec.cost_cents_per_execution);
            result.side_effects = Some(SIDE_EFFECT_NOTICE.to_string());
            self.log_with(
                &call,
                &execution_id,
                InvocationStatus::PendingApproval,
                0.0,
                json!({"message": "awaiting approval"}),
                request,
                &project_id,
            )
            .await;
            result.execution_time_ms = elapsed_ms(started);
            return result;
        }

        let outcome = match self.guardrails.evaluate(&spec) {
            GuardrailDecision::Allow => {
                self.dispatch(&call, &execution_id, request, &project_id).await
            }
            GuardrailDecision::Deny { reason_code, user_message, .. }
            | GuardrailDecision::Degrade { reason_code, user_message, .. } => {
                warn!(
                    event_name = "tools.execute.guardrail_blocked",
                    tool = %call.tool,
                    reason_code,
                    "guardrail blocked tool"
                );
                Err(ApplicationError::ToolExecution { tool: call.tool, message: user_message })
            }
        };

        match outcome {
            Ok(value) => {
                result.status = ToolStatus::Completed;
                result.success = true;
                result.cost_cents = spec.cost_cents_per_execution;
                self.log_with(
                    &call,
                    &execution_id,
                    InvocationStatus::Success,
                    spec.cost_cents_per_execution,
                    value.clone(),
                    request,
                    &project_id,
                )
                .await;
                result.result = Some(value);
            }
            Err(error) => {
                warn!(
                    event_name = "tools.execute.failed",
                    tool = %call.tool,
                    execution_id = %execution_id,
                    error_class = error.error_class(),
                    error = %error,
                    "tool execution failed"
                );
                let message = match error {
                    ApplicationError::ToolExecution { message, .. } => message,
                    other => other.to_string(),
                };
                self.log_with(
                    &call,
                    &execution_id,
                    InvocationStatus::Failed,
                    0.0,
                    json!({"error": message}),
                    request,
                    &project_id,
                )
                .await;
                result.error = Some(message);
            }
        }
        result.execution_time_ms = elapsed_ms(started);
        result
    }

    async fn named_project(&self, message: &str) -> Option<Project> {
        match self.directory.list_projects().await {
            Ok(projects) => match_project_name(message, &projects).cloned(),
            Err(error) => {
                warn!(
                    event_name = "tools.project_match.lookup_failed",
                    error = %error,
                    "could not load projects for name matching"
                );
                None
            }
        }
    }

    async fn dispatch(
        &self,
        call: &ToolCall,
        execution_id: &str,
        request: &ToolRequest<'_>,
        project_id: &str,
    ) -> Result<Value, ApplicationError> {
        if call.tool.spec().side_effect {
            let action = PlatformActionRequest::for_tool(
                call.tool,
                Value::Object(call.parameters.clone()),
                request.user_id,
                project_id,
                execution_id,
            );
            return self.platform.perform(&action).await;
        }
        self.read(call).await
    }

    async fn read(&self, call: &ToolCall) -> Result<Value, ApplicationError> {
        let text = |key: &str| call.parameters.get(key).and_then(Value::as_str);
        match call.tool {
            ToolName::GetProjectStatus => {
                let id = ProjectId(text("project_id").unwrap_or(PORTFOLIO_PROJECT_ID).to_string());
                if id.is_portfolio() {
                    self.portfolio_status().await
                } else {
                    self.project_status(&id).await
                }
            }
            ToolName::ListContractors => {
                let specialty = text("specialty");
                let contractors = self.directory.list_contractors(specialty).await?;
                Ok(json!({
                    "contractors": contractors,
                    "count": contractors.len(),
                    "specialty": specialty,
                }))
            }
            ToolName::GetCommunications => {
                let id = text("project_id").map(|id| ProjectId(id.to_string()));
                let scope = id.as_ref().filter(|id| !id.is_portfolio());
                let communications =
                    self.directory.communications(scope, None, READ_LIMIT).await?;
                Ok(json!({"communications": communications, "count": communications.len()}))
            }
            ToolName::GetEmails => self.channel_messages(CommunicationChannel::Email).await,
            ToolName::GetTeamsMessages => self.channel_messages(CommunicationChannel::Teams).await,
            ToolName::GetCalendarEvents => {
                let meetings = self.directory.upcoming_meetings(Utc::now(), READ_LIMIT).await?;
                Ok(json!({"events": meetings, "count": meetings.len()}))
            }
            ToolName::OpenCommunicationApp => {
                Ok(json!({"app_name": text("app_name"), "action": "open_app"}))
            }
            other => Err(ApplicationError::ToolExecution {
                tool: other,
                message: "tool has no read handler".to_string(),
            }),
        }
    }

    async fn channel_messages(
        &self,
        channel: CommunicationChannel,
    ) -> Result<Value, ApplicationError> {
        let messages = self.directory.communications(None, Some(channel), READ_LIMIT).await?;
        Ok(json!({"messages": messages, "count": messages.len(), "channel": channel}))
    }

    async fn project_status(&self, id: &ProjectId) -> Result<Value, ApplicationError> {
        let project = self.directory.find_project(id).await?.ok_or_else(|| {
            ApplicationError::ToolExecution {
                tool: ToolName::GetProjectStatus,
                message: format!("project {} not found", id.0),
            }
        })?;

        let metrics = async {
            let financials = self.directory.financial_metrics(id).await?;
            let construction = self.directory.construction_metrics(id).await?;
            Ok::<_, atlas_db::RepositoryError>((financials, construction))
        }
        .await;

        match metrics {
            Ok((financials, construction)) => Ok(detailed_status(
                &project,
                financials.as_ref(),
                construction.as_ref(),
                self.clock.today(),
            )),
            Err(error) => {
                warn!(
                    event_name = "tools.project_status.metrics_unavailable",
                    project_id = %id.0,
                    error = %error,
                    "falling back to basic project data"
                );
                Ok(basic_status(&project))
            }
        }
    }

    async fn portfolio_status(&self) -> Result<Value, ApplicationError> {
        let projects = self.directory.list_projects().await?;
        if projects.is_empty() {
            return Err(ApplicationError::ToolExecution {
                tool: ToolName::GetProjectStatus,
                message: "no projects available in the system".to_string(),
            });
        }

        let metrics = async {
            let financials = self.directory.all_financial_metrics().await?;
            let construction = self.directory.all_construction_metrics().await?;
            Ok::<_, atlas_db::RepositoryError>((financials, construction))
        }
        .await;

        match metrics {
            Ok((financials, construction)) => {
                Ok(portfolio_aggregate(&projects, &financials, &construction))
            }
            Err(error) => {
                warn!(
                    event_name = "tools.project_status.portfolio_metrics_unavailable",
                    error = %error,
                    "falling back to basic portfolio listing"
                );
                Ok(basic_portfolio(&projects))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn log_with(
        &self,
        call: &ToolCall,
        execution_id: &str,
        status: InvocationStatus,
        cost_cents: f64,
        outcome: Value,
        request: &ToolRequest<'_>,
        project_id: &str,
    ) {
        let invocation = ToolInvocation::new(
            call.tool,
            Value::Object(call.parameters.clone()),
            status,
            request.user_id,
            project_id,
        )
        .with_execution_id(execution_id)
        .with_cost(cost_cents)
        .with_outcome(outcome);

        if let Err(error) = self.sink.record(invocation).await {
            warn!(
                event_name = "tools.audit.write_failed",
                tool = %call.tool,
                execution_id,
                error = %error,
                "could not record tool invocation"
            );
        }
    }
}

/// Fails with the names of every required parameter that is absent, null,
/// or empty.
pub fn validate_parameters(
    spec: &ToolSpec,
    parameters: &Map<String, Value>,
) -> Result<(), DomainError> {
    let missing: Vec<String> = spec
        .required_parameters
        .iter()
        .filter(|name| match parameters.get(**name) {
            None | Some(Value::Null) => true,
            Some(Value::String(value)) => value.trim().is_empty(),
            Some(Value::Array(values)) => values.is_empty(),
            Some(_) => false,
        })
        .map(|name| name.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(DomainError::MissingToolParameters { tool: spec.name, missing })
    }
}

fn apply_overrides(calls: &mut Vec<ToolCall>, overrides: Option<&Map<String, Value>>) {
    let Some(overrides) = overrides else {
        return;
    };
    for (name, params) in overrides {
        let tool = match name.parse::<ToolName>() {
            Ok(tool) => tool,
            Err(error) => {
                warn!(
                    event_name = "tools.overrides.unknown_tool",
                    error = %error,
                    "ignoring override"
                );
                continue;
            }
        };
        let Some(params) = params.as_object() else {
            continue;
        };
        match calls.iter_mut().find(|call| call.tool == tool) {
            Some(call) => {
                for (key, value) in params {
                    call.parameters.insert(key.clone(), value.clone());
                }
            }
            None => {
                let mut call = ToolCall::new(tool);
                call.parameters = params.clone();
                calls.push(call);
            }
        }
    }
}

fn money(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn detailed_status(
    project: &Project,
    financials: Option<&FinancialMetrics>,
    construction: Option<&ConstructionMetrics>,
    today: chrono::NaiveDate,
) -> Value {
    let budget_total =
        financials.map(|metrics| metrics.total_budget).unwrap_or(project.total_value);
    let budget_used = financials.map(|metrics| metrics.spent_to_date).unwrap_or_default();
    let completion = construction.map(|metrics| metrics.overall_completion).unwrap_or(0.0);
    let phase = construction
        .and_then(|metrics| metrics.current_phase.clone())
        .or_else(|| project.phase.clone())
        .unwrap_or_else(|| "Planning".to_string());
    let days_elapsed =
        project.start_date.map(|start| (today - start).num_days().max(0)).unwrap_or(0);
    let cost_variance = financials
        .map(|metrics| {
            let total =
                if metrics.total_budget.is_zero() { Decimal::ONE } else { metrics.total_budget };
            money(metrics.spent_to_date) / money(total) * 100.0 - completion
        })
        .unwrap_or(0.0);

    json!({
        "project_id": project.id.0,
        "project_name": project.name,
        "description": project.description,
        "status": project.status,
        "budget_total": money(budget_total),
        "budget_used": money(budget_used),
        "budget_remaining": money(budget_total - budget_used),
        "contingency_used": financials
            .map(|metrics| money(metrics.contingency_used))
            .unwrap_or(0.0),
        "contingency_remaining": financials
            .map(|metrics| money(metrics.contingency_remaining))
            .unwrap_or(0.0),
        "forecasted_cost": money(
            financials.and_then(|metrics| metrics.forecasted_cost).unwrap_or(budget_total)
        ),
        "roi": financials.map(|metrics| metrics.roi).unwrap_or(0.0),
        "completion_percentage": completion,
        "current_phase": phase,
        "safety_score": construction.map(|metrics| metrics.safety_score).unwrap_or(0.0),
        "quality_score": construction.map(|metrics| metrics.quality_score).unwrap_or(0.0),
        "timeline": {
            "start_date": project.start_date,
            "expected_completion": project.end_date,
            "current_phase": phase,
            "days_elapsed": days_elapsed,
        },
        "kpis": {
            "schedule_variance": construction
                .map(|metrics| metrics.schedule_variance)
                .unwrap_or(0.0),
            "cost_variance": cost_variance,
            "quality_score": construction.map(|metrics| metrics.quality_score).unwrap_or(0.0),
            "safety_incidents": construction.map(|metrics| metrics.safety_incidents).unwrap_or(0),
        },
        "last_updated": Utc::now(),
        "data_source": "real_database",
    })
}

fn basic_status(project: &Project) -> Value {
    json!({
        "project_id": project.id.0,
        "project_name": project.name,
        "description": project.description,
        "status": project.status,
        "budget_total": money(project.total_value),
        "timeline": {
            "start_date": project.start_date,
            "expected_completion": project.end_date,
            "current_phase": project.phase.clone().unwrap_or_else(|| "Planning".to_string()),
        },
        "last_updated": Utc::now(),
        "data_source": "basic_project_data",
        "note": "Detailed metrics not available - showing basic project information",
    })
}

fn portfolio_aggregate(
    projects: &[Project],
    financials: &[FinancialMetrics],
    construction: &[ConstructionMetrics],
) -> Value {
    let summaries: Vec<Value> = projects
        .iter()
        .map(|project| {
            let finance = financials.iter().find(|metrics| metrics.project_id == project.id);
            let build = construction.iter().find(|metrics| metrics.project_id == project.id);
            json!({
                "project_id": project.id.0,
                "name": project.name,
                "description": project.description,
                "status": project.status,
                "current_phase": build
                    .and_then(|metrics| metrics.current_phase.clone())
                    .unwrap_or_else(|| "Planning".to_string()),
                "budget_total": money(
                    finance.map(|metrics| metrics.total_budget).unwrap_or(project.total_value)
                ),
                "budget_used": finance.map(|metrics| money(metrics.spent_to_date)).unwrap_or(0.0),
                "completion_percentage": build
                    .map(|metrics| metrics.overall_completion)
                    .unwrap_or(0.0),
                "safety_score": build.map(|metrics| metrics.safety_score).unwrap_or(0.0),
                "quality_score": build.map(|metrics| metrics.quality_score).unwrap_or(0.0),
                "start_date": project.start_date,
                "end_date": project.end_date,
            })
        })
        .collect();

    let divisor = construction.len().max(1) as f64;
    let average = |field: fn(&ConstructionMetrics) -> f64| {
        construction.iter().map(field).sum::<f64>() / divisor
    };
    let count_status =
        |status: &str| projects.iter().filter(|project| project.status == status).count();

    json!({
        "portfolio_id": PORTFOLIO_PROJECT_ID,
        "portfolio_name": "Portfolio Overview",
        "description": "Aggregate data for all active projects",
        "total_projects": projects.len(),
        "projects": summaries,
        "total_budget": money(financials.iter().map(|metrics| metrics.total_budget).sum()),
        "total_spent": money(financials.iter().map(|metrics| metrics.spent_to_date).sum()),
        "average_completion": average(|metrics| metrics.overall_completion),
        "average_safety_score": average(|metrics| metrics.safety_score),
        "average_quality_score": average(|metrics| metrics.quality_score),
        "status_breakdown": {
            "active": count_status("active"),
            "completed": count_status("completed"),
            "planning": count_status("planning"),
            "on_hold": count_status("on_hold"),
        },
        "last_updated": Utc::now(),
        "data_source": "portfolio_aggregate",
    })
}

fn basic_portfolio(projects: &[Project]) -> Value {
    let listing: Vec<Value> = projects
        .iter()
        .map(|project| {
            json!({
                "project_id": project.id.0,
                "name": project.name,
                "description": project.description,
                "status": project.status,
                "total_value": money(project.total_value),
            })
        })
        .collect();
    json!({
        "portfolio_id": PORTFOLIO_PROJECT_ID,
        "portfolio_name": "Portfolio Overview",
        "description": "Basic project listing (detailed metrics unavailable)",
        "total_projects": projects.len(),
        "projects": listing,
        "last_updated": Utc::now(),
        "data_source": "basic_portfolio_data",
        "note": "Detailed portfolio metrics not available",
    })
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use serde_json::{json, Map, Value};

    use atlas_core::audit::{InMemoryToolInvocationSink, InvocationStatus};
    use atlas_core::domain::project::{ConstructionMetrics, FinancialMetrics, Project, ProjectId};
    use atlas_core::domain::spend::FixedClock;
    use atlas_core::domain::tool::ToolName;
    use atlas_core::errors::{ApplicationError, DomainError};
    use atlas_db::InMemoryProjectDirectory;

    use super::{validate_parameters, ToolExecutor, ToolRequest, ToolStatus};
    use crate::guardrails::GuardrailPolicy;
    use crate::intent::KeywordIntentClassifier;
    use crate::platform::{PlatformActionRequest, PlatformActions};

    #[derive(Default)]
    pub(crate) struct RecordingPlatform {
        pub(crate) requests: Mutex<Vec<PlatformActionRequest>>,
    }

    impl RecordingPlatform {
        pub(crate) fn requests(&self) -> Vec<PlatformActionRequest> {
            match self.requests.lock() {
                Ok(requests) => requests.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            }
        }
    }

    #[async_trait]
    impl PlatformActions for RecordingPlatform {
        async fn perform(
            &self,
            request: &PlatformActionRequest,
        ) -> Result<Value, ApplicationError> {
            match self.requests.lock() {
                Ok(mut requests) => requests.push(request.clone()),
                Err(poisoned) => poisoned.into_inner().push(request.clone()),
            }
            Ok(json!({"success": true, "id": "co-101"}))
        }
    }

    pub(crate) fn project(id: &str, name: &str, status: &str) -> Project {
        Project {
            id: ProjectId(id.to_string()),
            name: name.to_string(),
            description: Some(format!("{name} build")),
            status: status.to_string(),
            phase: Some("Structure".to_string()),
            total_value: Decimal::new(10_000_000, 0),
            start_date: NaiveDate::from_ymd_opt(2026, 1, 5),
            end_date: NaiveDate::from_ymd_opt(2027, 6, 30),
        }
    }

    fn construction(id: &str, completion: f64, safety: f64) -> ConstructionMetrics {
        ConstructionMetrics {
            project_id: ProjectId(id.to_string()),
            overall_completion: completion,
            current_phase: Some("Framing".to_string()),
            safety_score: safety,
            quality_score: 90.0,
            schedule_variance: -2.0,
            safety_incidents: 1,
        }
    }

    fn financials(id: &str, budget: i64, spent: i64) -> FinancialMetrics {
        FinancialMetrics {
            project_id: ProjectId(id.to_string()),
            total_budget: Decimal::new(budget, 0),
            spent_to_date: Decimal::new(spent, 0),
            contingency_used: Decimal::new(50_000, 0),
            contingency_remaining: Decimal::new(150_000, 0),
            forecasted_cost: None,
            roi: 12.5,
        }
    }

    pub(crate) fn three_project_directory() -> InMemoryProjectDirectory {
        InMemoryProjectDirectory {
            projects: vec![
                project("proj-riverside", "Riverside Medical Center", "active"),
                project("proj-harbor", "Harbor View Lofts", "active"),
                project("proj-summit", "Summit Ridge Office Park", "planning"),
            ],
            financials: vec![
                financials("proj-riverside", 4_000_000, 1_000_000),
                financials("proj-harbor", 2_000_000, 500_000),
                financials("proj-summit", 1_000_000, 0),
            ],
            construction: vec![
                construction("proj-riverside", 60.0, 95.0),
                construction("proj-harbor", 30.0, 88.0),
                construction("proj-summit", 0.0, 100.0),
            ],
            ..InMemoryProjectDirectory::default()
        }
    }

    struct Harness {
        executor: ToolExecutor,
        platform: Arc<RecordingPlatform>,
        sink: InMemoryToolInvocationSink,
    }

    fn harness(directory: InMemoryProjectDirectory) -> Harness {
        let platform = Arc::new(RecordingPlatform::default());
        let sink = InMemoryToolInvocationSink::default();
        let executor = ToolExecutor::new(
            Arc::new(KeywordIntentClassifier::new()),
            Arc::new(directory),
            platform.clone(),
            Arc::new(sink.clone()),
            Arc::new(FixedClock(NaiveDate::from_ymd_opt(2026, 10, 19).expect("date"))),
        )
        .with_guardrails(GuardrailPolicy {
            write_tools_enabled: true,
            platform_actions_configured: true,
        });
        Harness { executor, platform, sink }
    }

    fn request<'a>(message: &'a str, project_id: &'a ProjectId, approval: bool) -> ToolRequest<'a> {
        ToolRequest {
            message,
            project_id,
            user_id: "u-1",
            require_approval: approval,
            parameter_overrides: None,
        }
    }

    #[test]
    fn missing_cost_impact_is_named() {
        let mut params = Map::new();
        params.insert("project_id".to_string(), json!("proj-harbor"));
        params.insert("description".to_string(), json!("add a skylight"));

        assert_eq!(
            validate_parameters(&ToolName::CreateChangeOrder.spec(), &params),
            Err(DomainError::MissingToolParameters {
                tool: ToolName::CreateChangeOrder,
                missing: vec!["cost_impact".to_string()],
            })
        );
    }

    #[tokio::test]
    async fn change_order_without_amount_fails_validation_and_logs_zero_cost() {
        let h = harness(three_project_directory());
        let project = ProjectId("proj-harbor".to_string());

        let results = h
            .executor
            .analyze_and_execute(&request(
                "Please open a change order to add a skylight",
                &project,
                false,
            ))
            .await;

        let change_order = results
            .iter()
            .find(|result| result.tool_name == ToolName::CreateChangeOrder)
            .expect("change order result");
        assert_eq!(change_order.status, ToolStatus::Error);
        assert!(!change_order.success);
        assert!(change_order.error.as_deref().unwrap_or_default().contains("cost_impact"));
        assert!(h.platform.requests().is_empty());

        let logged = h
            .sink
            .invocations()
            .into_iter()
            .find(|invocation| invocation.tool_name == ToolName::CreateChangeOrder)
            .expect("change order log");
        assert_eq!(logged.status, InvocationStatus::Failed);
        assert_eq!(logged.cost_cents, 0.0);
    }

    #[tokio::test]
    async fn portfolio_status_averages_every_project() {
        let h = harness(three_project_directory());
        let portfolio = ProjectId("portfolio".to_string());

        let results = h
            .executor
            .analyze_and_execute(&request("Give me the overview", &portfolio, true))
            .await;

        let status = &results[0];
        assert_eq!(status.tool_name, ToolName::GetProjectStatus);
        assert_eq!(status.status, ToolStatus::Completed);
        let data = status.result.as_ref().expect("portfolio data");
        assert_eq!(data["total_projects"], 3);
        assert_eq!(data["average_completion"], 30.0);
        assert_eq!(data["total_budget"], 7_000_000.0);
        assert_eq!(data["status_breakdown"]["active"], 2);
        assert_eq!(data["data_source"], "portfolio_aggregate");

        let logged = &h.sink.invocations()[0];
        assert_eq!(logged.status, InvocationStatus::Success);
        assert_eq!(logged.cost_cents, 0.001);
    }

    #[tokio::test]
    async fn approval_gate_never_reaches_the_platform() {
        let h = harness(three_project_directory());
        let project = ProjectId("proj-harbor".to_string());

        let results = h
            .executor
            .analyze_and_execute(&request(
                "Create a change order for the lobby upgrade costing $12,500",
                &project,
                true,
            ))
            .await;

        let pending: Vec<_> = results.iter().filter(|result| result.requires_approval).collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, ToolStatus::PendingApproval);
        assert_eq!(pending[0].estimated_cost_cents, Some(0.10));
        assert_eq!(pending[0].tool_parameters["cost_impact"], 12_500.0);
        assert!(h.platform.requests().is_empty());

        let logged = h
            .sink
            .invocations()
            .into_iter()
            .find(|invocation| invocation.status == InvocationStatus::PendingApproval)
            .expect("pending log");
        assert_eq!(logged.cost_cents, 0.0);
    }

    #[tokio::test]
    async fn approved_write_is_forwarded_with_its_execution_id() {
        let h = harness(three_project_directory());
        let project = ProjectId("proj-harbor".to_string());

        let results = h
            .executor
            .analyze_and_execute(&request(
                "Create a change order for the lobby upgrade costing $12,500",
                &project,
                false,
            ))
            .await;

        let change_order = results
            .iter()
            .find(|result| result.tool_name == ToolName::CreateChangeOrder)
            .expect("change order");
        assert!(change_order.success);
        assert_eq!(change_order.cost_cents, 0.10);

        let sent = h.platform.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].resource, "change_orders");
        assert_eq!(sent[0].ai_request_id, change_order.execution_id);
        assert_eq!(sent[0].project_id, "proj-harbor");
    }

    #[tokio::test]
    async fn unknown_project_is_a_failed_tool() {
        let h = harness(three_project_directory());
        let project = ProjectId("proj-missing".to_string());

        let results =
            h.executor.analyze_and_execute(&request("What is the status?", &project, true)).await;

        assert_eq!(results[0].status, ToolStatus::Error);
        assert!(results[0].error.as_deref().unwrap_or_default().contains("proj-missing"));
        assert_eq!(h.sink.invocations()[0].status, InvocationStatus::Failed);
    }

    #[tokio::test]
    async fn unavailable_metrics_degrade_to_basic_data() {
        let mut directory = three_project_directory();
        directory.fail_metrics = true;
        let h = harness(directory);
        let project = ProjectId("proj-harbor".to_string());

        let results =
            h.executor.analyze_and_execute(&request("Budget status please", &project, true)).await;

        let data = results[0].result.as_ref().expect("basic data");
        assert_eq!(data["data_source"], "basic_project_data");
        assert_eq!(data["project_name"], "Harbor View Lofts");
    }

    #[tokio::test]
    async fn named_project_replaces_the_context_project() {
        let h = harness(three_project_directory());
        let portfolio = ProjectId("portfolio".to_string());

        let results = h
            .executor
            .analyze_and_execute(&request(
                "How is the Riverside job doing on budget?",
                &portfolio,
                true,
            ))
            .await;

        let data = results[0].result.as_ref().expect("project data");
        assert_eq!(data["project_id"], "proj-riverside");
        assert_eq!(data["budget_remaining"], 3_000_000.0);
    }

    #[tokio::test]
    async fn caller_overrides_replay_an_approved_call() {
        let h = harness(three_project_directory());
        let project = ProjectId("proj-harbor".to_string());
        let overrides = json!({
            "send_email": {
                "to": "pm@example.com",
                "subject": "Pour schedule",
                "body": "Concrete pour moved to Friday"
            }
        });
        let overrides = overrides.as_object().cloned().expect("object");
        let request = ToolRequest {
            message: "Go ahead",
            project_id: &project,
            user_id: "u-1",
            require_approval: false,
            parameter_overrides: Some(&overrides),
        };

        let results = h.executor.analyze_and_execute(&request).await;

        let email = results
            .iter()
            .find(|result| result.tool_name == ToolName::SendEmail)
            .expect("email result");
        assert!(email.success);
        assert_eq!(h.platform.requests()[0].data["to"], "pm@example.com");
    }

    #[tokio::test]
    async fn disabled_writes_fail_without_dispatch() {
        let mut h = harness(three_project_directory());
        h.executor = h.executor.with_guardrails(GuardrailPolicy {
            write_tools_enabled: false,
            platform_actions_configured: true,
        });
        let project = ProjectId("proj-harbor".to_string());

        let results = h
            .executor
            .analyze_and_execute(&request(
                "Create a change order for the lobby upgrade costing $12,500",
                &project,
                false,
            ))
            .await;

        let change_order = results
            .iter()
            .find(|result| result.tool_name == ToolName::CreateChangeOrder)
            .expect("change order");
        assert!(!change_order.success);
        assert!(h.platform.requests().is_empty());
    }
}
