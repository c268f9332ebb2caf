use atlas_core::catalog::ProviderAvailability;
use atlas_core::config::{AppConfig, LoadOptions};
use serde::Serialize;

use crate::commands::{async_runtime, migrated_pool};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let checks = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => vec![
            DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            },
            check_providers(&config),
            check_platform_actions(&config),
            check_database(&config),
        ],
        Err(error) => {
            let mut checks = vec![DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            }];
            for name in ["model_providers", "platform_actions", "database_migrations"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
            checks
        }
    };

    let failed = checks
        .iter()
        .any(|check| matches!(check.status, CheckStatus::Fail | CheckStatus::Skipped));
    let (overall_status, summary) = if failed {
        (CheckStatus::Fail, "doctor: one or more readiness checks failed")
    } else {
        (CheckStatus::Pass, "doctor: assistant is ready to serve requests")
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn check_providers(config: &AppConfig) -> DoctorCheck {
    let models = ProviderAvailability::from_config(&config.llm).available_models();
    if !models.is_empty() {
        let names: Vec<&str> = models.iter().map(|model| model.as_str()).collect();
        return DoctorCheck {
            name: "model_providers",
            status: CheckStatus::Pass,
            details: format!("{} routable models: {}", names.len(), names.join(", ")),
        };
    }

    if config.llm.offline_fallback {
        DoctorCheck {
            name: "model_providers",
            status: CheckStatus::Warn,
            details: "no provider credentials; replies will come from the offline responder"
                .to_string(),
        }
    } else {
        DoctorCheck {
            name: "model_providers",
            status: CheckStatus::Fail,
            details: "no provider credentials and offline fallback is disabled".to_string(),
        }
    }
}

fn check_platform_actions(config: &AppConfig) -> DoctorCheck {
    match (&config.tools.platform_actions_url, config.tools.write_enabled) {
        (Some(url), true) => DoctorCheck {
            name: "platform_actions",
            status: CheckStatus::Pass,
            details: format!("write tools forward to `{url}`"),
        },
        (None, true) => DoctorCheck {
            name: "platform_actions",
            status: CheckStatus::Warn,
            details: "write tools are enabled but no platform actions url is set".to_string(),
        },
        (_, false) => DoctorCheck {
            name: "platform_actions",
            status: CheckStatus::Warn,
            details: "write tools are disabled".to_string(),
        },
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match async_runtime("doctor") {
        Ok(runtime) => runtime,
        Err(failure) => {
            return DoctorCheck {
                name: "database_migrations",
                status: CheckStatus::Fail,
                details: failure.output,
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = migrated_pool(config).await?;
        pool.close().await;
        Ok::<(), crate::commands::StepFailure>(())
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "database_migrations",
            status: CheckStatus::Pass,
            details: format!("connected and migrated `{}`", config.database.url),
        },
        Err((error_class, message, _)) => DoctorCheck {
            name: "database_migrations",
            status: CheckStatus::Fail,
            details: format!("{error_class}: {message}"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
