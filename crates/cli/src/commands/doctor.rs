use henry_core::config::{AppConfig, LoadOptions};
use henry_core::lookup::MapRequest;
use henry_lookup::{StaticMapClient, YelpClient};
use henry_slack::SlackApiClient;
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_slack_auth(&config));
            checks.push(check_lookup_clients(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck::skipped("slack_auth"));
            checks.push(DoctorCheck::skipped("lookup_clients"));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// Calls `auth.test` the same way `henry-server` does at startup.
fn check_slack_auth(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "slack_auth",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let client = SlackApiClient::new(
            config.slack.api_base_url.clone(),
            config.slack.bot_token.clone(),
            config.slack.app_token.clone(),
        )?;
        client.auth_test().await
    });

    match result {
        Ok(identity) => DoctorCheck {
            name: "slack_auth",
            status: CheckStatus::Pass,
            details: format!("bot token accepted for user `{}`", identity.user_id),
        },
        Err(error) => {
            DoctorCheck { name: "slack_auth", status: CheckStatus::Fail, details: error.to_string() }
        }
    }
}

fn check_lookup_clients(config: &AppConfig) -> DoctorCheck {
    if let Err(error) = YelpClient::from_config(&config.search) {
        return DoctorCheck {
            name: "lookup_clients",
            status: CheckStatus::Fail,
            details: format!("business search client: {error}"),
        };
    }

    let sample = MapRequest {
        location: config.conversation.home_address.clone(),
        width: config.maps.width,
        height: config.maps.height,
    };
    match StaticMapClient::from_config(&config.maps).url_for(&sample) {
        Ok(_) => DoctorCheck {
            name: "lookup_clients",
            status: CheckStatus::Pass,
            details: format!(
                "business search at `{}`, maps at `{}`",
                config.search.base_url, config.maps.base_url
            ),
        },
        Err(error) => DoctorCheck {
            name: "lookup_clients",
            status: CheckStatus::Fail,
            details: format!("map client: {error}"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
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
