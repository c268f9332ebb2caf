use atlas_core::config::ToolsConfig;
use atlas_core::domain::tool::ToolSpec;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
    Degrade { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

impl GuardrailDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Last check before an approved tool is dispatched. Read tools always pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub write_tools_enabled: bool,
    pub platform_actions_configured: bool,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { write_tools_enabled: true, platform_actions_configured: false }
    }
}

impl GuardrailPolicy {
    pub fn from_config(config: &ToolsConfig) -> Self {
        Self {
            write_tools_enabled: config.write_enabled,
            platform_actions_configured: config
                .platform_actions_url
                .as_deref()
                .map(|url| !url.trim().is_empty())
                .unwrap_or(false),
        }
    }

    pub fn evaluate(&self, spec: &ToolSpec) -> GuardrailDecision {
        if !spec.side_effect {
            return GuardrailDecision::Allow;
        }
        if !self.write_tools_enabled {
            return GuardrailDecision::Deny {
                reason_code: "write_tools_disabled",
                user_message: format!(
                    "{} is disabled here. Actions that change external systems are turned off.",
                    spec.name
                ),
                fallback_path: "manual_followup",
            };
        }
        if !self.platform_actions_configured {
            return GuardrailDecision::Degrade {
                reason_code: "platform_actions_unconfigured",
                user_message: format!(
                    "{} could not run because no platform actions service is configured.",
                    spec.name
                ),
                fallback_path: "manual_followup",
            };
        }
        GuardrailDecision::Allow
    }
}

#[cfg(test)]
mod tests {
    use atlas_core::config::AppConfig;
    use atlas_core::domain::tool::ToolName;

    use super::{GuardrailDecision, GuardrailPolicy};

    #[test]
    fn read_tools_are_always_allowed() {
        let policy =
            GuardrailPolicy { write_tools_enabled: false, platform_actions_configured: false };
        assert_eq!(policy.evaluate(&ToolName::GetProjectStatus.spec()), GuardrailDecision::Allow);
    }

    #[test]
    fn disabled_writes_are_denied() {
        let policy =
            GuardrailPolicy { write_tools_enabled: false, platform_actions_configured: true };
        let decision = policy.evaluate(&ToolName::SendEmail.spec());

        let (reason_code, user_message, fallback_path) = match decision {
            GuardrailDecision::Deny { reason_code, user_message, fallback_path } => {
                (reason_code, user_message, fallback_path)
            }
            _ => ("", String::new(), ""),
        };

        assert_eq!(reason_code, "write_tools_disabled");
        assert!(user_message.starts_with("send_email is disabled"));
        assert_eq!(fallback_path, "manual_followup");
    }

    #[test]
    fn missing_platform_service_degrades_writes() {
        let policy = GuardrailPolicy::from_config(&AppConfig::default().tools);
        let decision = policy.evaluate(&ToolName::CreateChangeOrder.spec());

        assert!(matches!(
            decision,
            GuardrailDecision::Degrade { reason_code: "platform_actions_unconfigured", .. }
        ));
        assert!(!decision.is_allowed());
    }

    #[test]
    fn configured_writes_are_allowed() {
        let policy =
            GuardrailPolicy { write_tools_enabled: true, platform_actions_configured: true };
        assert!(policy.evaluate(&ToolName::UpdateSchedule.spec()).is_allowed());
    }
}
