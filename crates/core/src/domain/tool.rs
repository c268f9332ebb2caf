use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    SendEmail,
    SendSms,
    ScheduleMeeting,
    CreateChangeOrder,
    UpdateSchedule,
    SendTeamsMessage,
    GetProjectStatus,
    ListContractors,
    GetCommunications,
    GetEmails,
    GetTeamsMessages,
    GetCalendarEvents,
    OpenCommunicationApp,
}

impl ToolName {
    pub const ALL: [ToolName; 13] = [
        ToolName::SendEmail,
        ToolName::SendSms,
        ToolName::ScheduleMeeting,
        ToolName::CreateChangeOrder,
        ToolName::UpdateSchedule,
        ToolName::SendTeamsMessage,
        ToolName::GetProjectStatus,
        ToolName::ListContractors,
        ToolName::GetCommunications,
        ToolName::GetEmails,
        ToolName::GetTeamsMessages,
        ToolName::GetCalendarEvents,
        ToolName::OpenCommunicationApp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendEmail => "send_email",
            Self::SendSms => "send_sms",
            Self::ScheduleMeeting => "schedule_meeting",
            Self::CreateChangeOrder => "create_change_order",
            Self::UpdateSchedule => "update_schedule",
            Self::SendTeamsMessage => "send_teams_message",
            Self::GetProjectStatus => "get_project_status",
            Self::ListContractors => "list_contractors",
            Self::GetCommunications => "get_communications",
            Self::GetEmails => "get_emails",
            Self::GetTeamsMessages => "get_teams_messages",
            Self::GetCalendarEvents => "get_calendar_events",
            Self::OpenCommunicationApp => "open_communication_app",
        }
    }

    pub fn spec(&self) -> ToolSpec {
        match self {
            Self::SendEmail => ToolSpec::write(*self, 0.01, &["to", "subject", "body"]),
            Self::SendSms => ToolSpec::write(*self, 0.05, &["to", "message"]),
            Self::ScheduleMeeting => {
                ToolSpec::write(*self, 0.02, &["attendees", "subject", "start_time", "duration"])
            }
            Self::CreateChangeOrder => {
                ToolSpec::write(*self, 0.10, &["project_id", "description", "cost_impact"])
            }
            Self::UpdateSchedule => {
                ToolSpec::write(*self, 0.05, &["project_id", "task_id", "new_date"])
            }
            Self::SendTeamsMessage => ToolSpec::write(*self, 0.02, &["channel", "message"]),
            Self::GetProjectStatus => ToolSpec::read(*self, &["project_id"]),
            Self::ListContractors => ToolSpec::read(*self, &[]),
            Self::GetCommunications => ToolSpec::read(*self, &["project_id"]),
            Self::GetEmails | Self::GetTeamsMessages | Self::GetCalendarEvents => {
                ToolSpec::read(*self, &[])
            }
            Self::OpenCommunicationApp => ToolSpec::read(*self, &["app_name"]),
        }
    }

    /// `(action, resource)` pair sent to the platform actions service.
    pub fn platform_action(&self) -> (&'static str, &'static str) {
        match self {
            Self::CreateChangeOrder => ("create", "change_orders"),
            Self::UpdateSchedule => ("update", "schedules"),
            other => ("execute", other.as_str()),
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|tool| tool.as_str() == value.trim())
            .copied()
            .ok_or_else(|| format!("unknown tool `{value}`"))
    }
}

/// Static registry entry for one tool.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: ToolName,
    pub side_effect: bool,
    pub cost_cents_per_execution: f64,
    pub required_parameters: &'static [&'static str],
}

const READ_COST_CENTS: f64 = 0.001;

impl ToolSpec {
    fn write(name: ToolName, cost: f64, required: &'static [&'static str]) -> Self {
        Self { name, side_effect: true, cost_cents_per_execution: cost, required_parameters: required }
    }

    fn read(name: ToolName, required: &'static [&'static str]) -> Self {
        Self {
            name,
            side_effect: false,
            cost_cents_per_execution: READ_COST_CENTS,
            required_parameters: required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ToolName;

    #[test]
    fn every_side_effecting_tool_has_required_parameters() {
        for tool in ToolName::ALL {
            let spec = tool.spec();
            if spec.side_effect {
                assert!(!spec.required_parameters.is_empty(), "{tool} should declare parameters");
                assert!(spec.cost_cents_per_execution > 0.0);
            }
        }
    }

    #[test]
    fn registry_lookup_by_wire_name() {
        assert_eq!("create_change_order".parse::<ToolName>(), Ok(ToolName::CreateChangeOrder));
        assert!("delete_everything".parse::<ToolName>().is_err());
    }

    #[test]
    fn platform_action_mapping() {
        assert_eq!(ToolName::CreateChangeOrder.platform_action(), ("create", "change_orders"));
        assert_eq!(ToolName::UpdateSchedule.platform_action(), ("update", "schedules"));
        assert_eq!(ToolName::SendSms.platform_action(), ("execute", "send_sms"));
    }
}
