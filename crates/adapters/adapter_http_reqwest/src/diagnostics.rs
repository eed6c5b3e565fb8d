//! Connection diagnostics.
//!
//! Three independent REST probes, each reported on its own so a user can tell
//! an unreachable hub from a bad token from a broken states endpoint. A failed
//! probe does not stop the following ones.

use std::fmt;

use serde_json::Value;

use homedash_domain::connection::HubConfig;

use crate::api::{Reply, RestClient};
use crate::error::HttpError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// `GET /api/` answers.
    Connectivity,
    /// `GET /api/config` accepts the token.
    Authentication,
    /// `GET /api/states` returns a list.
    States,
}

impl Probe {
    pub const ALL: [Self; 3] = [Self::Connectivity, Self::Authentication, Self::States];

    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Connectivity => "/api/",
            Self::Authentication => "/api/config",
            Self::States => "/api/states",
        }
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connectivity => "Basic API connectivity",
            Self::Authentication => "Authentication",
            Self::States => "States endpoint",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Result of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticReport {
    pub probe: Probe,
    pub outcome: Outcome,
    pub message: String,
    pub details: Option<String>,
}

impl DiagnosticReport {
    fn success(probe: Probe, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            probe,
            outcome: Outcome::Success,
            message: message.into(),
            details,
        }
    }

    fn failure(probe: Probe, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            probe,
            outcome: Outcome::Failure,
            message: message.into(),
            details,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

/// Run every probe against `hub`, in order.
pub async fn diagnose(rest: &RestClient, hub: &HubConfig) -> Vec<DiagnosticReport> {
    let mut reports = Vec::with_capacity(Probe::ALL.len());
    for probe in Probe::ALL {
        let response = rest.get(hub, hub.token(), probe.path()).await;
        let report = evaluate(probe, response);
        tracing::info!(
            probe = %report.probe,
            success = report.is_success(),
            message = %report.message,
            "diagnostic probe finished"
        );
        reports.push(report);
    }
    reports
}

fn evaluate(probe: Probe, response: Result<Reply, HttpError>) -> DiagnosticReport {
    let reply = match response {
        Ok(reply) => reply,
        Err(err) => {
            let details = std::error::Error::source(&err).map(ToString::to_string);
            return DiagnosticReport::failure(probe, "Network error", details);
        }
    };

    if reply.is_unauthorized() {
        return DiagnosticReport::failure(
            probe,
            "Invalid access token",
            Some(format!("Status: {}", reply.status)),
        );
    }
    if !reply.is_success() {
        return DiagnosticReport::failure(
            probe,
            "HTTP error",
            Some(format!("Status: {}", reply.status)),
        );
    }

    match probe {
        Probe::Connectivity => DiagnosticReport::success(
            probe,
            format!("Connected successfully (Status: {})", reply.status.as_u16()),
            None,
        ),
        Probe::Authentication => {
            let field = |name: &str| {
                reply
                    .body
                    .get(name)
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string()
            };
            DiagnosticReport::success(
                probe,
                "Authentication successful",
                Some(format!(
                    "Home Assistant {} at {}",
                    field("version"),
                    field("location_name")
                )),
            )
        }
        Probe::States => match reply.body.as_array() {
            Some(items) => DiagnosticReport::success(
                probe,
                format!("Retrieved {} entities", items.len()),
                None,
            ),
            None => DiagnosticReport::failure(probe, "States response is not a list", None),
        },
    }
}
