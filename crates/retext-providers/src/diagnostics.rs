//! Step-by-step connection diagnostics for one backend.
//!
//! Every probe runs exactly once, without the retry policy, so the report
//! reflects the first failure a user would hit.

use chrono::{DateTime, Utc};
use retext_config::BackendConfig;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::info;
use url::Url;

use crate::client::BackendClient;
use crate::error::{BackendError, ErrorKind};
use crate::error_classify::classify_reqwest;

/// Timeout for the connectivity and authentication probes.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const MODELS_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Passed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Passed,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsReport {
    pub timestamp: DateTime<Utc>,
    pub config: ConfigSummary,
    pub tests: DiagnosticTests,
    pub overall: Overall,
}

/// What was probed; never includes the key itself.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    pub base_url: String,
    pub has_api_key: bool,
    pub api_key_length: usize,
    pub model: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticTests {
    pub config: ConfigCheck,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<ProbeResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<ProbeResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<ProbeResult>,
}

impl DiagnosticTests {
    fn statuses(&self) -> Vec<ProbeStatus> {
        let mut statuses = vec![self.config.status];
        statuses.extend(
            [&self.network, &self.authentication, &self.models]
                .into_iter()
                .flatten()
                .map(|probe| probe.status),
        );
        statuses
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigCheck {
    pub status: ProbeStatus,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub status: ProbeStatus,
    pub message: String,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<crate::error::ErrorCategory>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<String>>,
}

impl ProbeResult {
    fn passed(message: impl Into<String>, started: Instant) -> Self {
        Self {
            status: ProbeStatus::Passed,
            message: message.into(),
            elapsed_ms: elapsed_ms(started),
            status_code: None,
            error_type: None,
            error_category: None,
            suggestions: Vec::new(),
            model_count: None,
            models: None,
        }
    }

    fn failed(err: &BackendError, started: Instant) -> Self {
        let classification = err.classification();
        Self {
            status: ProbeStatus::Failed,
            message: classification
                .map(|c| c.message.clone())
                .unwrap_or_else(|| err.to_string()),
            elapsed_ms: elapsed_ms(started),
            status_code: err.status(),
            error_type: classification.map(|c| c.kind),
            error_category: classification.map(|c| c.category),
            suggestions: err.suggestions(),
            model_count: None,
            models: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Overall {
    pub status: OverallStatus,
    pub message: String,
}

impl Overall {
    fn from_statuses(statuses: &[ProbeStatus]) -> Self {
        let total = statuses.len();
        let passed = statuses
            .iter()
            .filter(|status| **status == ProbeStatus::Passed)
            .count();

        if passed == total {
            Self {
                status: OverallStatus::Passed,
                message: "All checks passed".to_string(),
            }
        } else if passed > 0 {
            Self {
                status: OverallStatus::Partial,
                message: format!("Some checks passed ({passed}/{total})"),
            }
        } else {
            Self {
                status: OverallStatus::Failed,
                message: "All checks failed".to_string(),
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u64::MAX as u128) as u64
}

impl BackendClient {
    /// Validate `backend`, then probe connectivity, authentication and the
    /// models endpoint. An invalid configuration stops after the first check.
    pub async fn diagnostics(&self, backend: &BackendConfig) -> DiagnosticsReport {
        let validation = backend.validate();
        let config = ConfigSummary {
            base_url: backend.base_url.clone(),
            has_api_key: backend.has_api_key(),
            api_key_length: backend.api_key.chars().count(),
            model: backend.model_id.clone(),
            timeout_ms: backend.timeout().as_millis().min(u64::MAX as u128) as u64,
        };
        let mut tests = DiagnosticTests {
            config: ConfigCheck {
                status: if validation.is_valid {
                    ProbeStatus::Passed
                } else {
                    ProbeStatus::Failed
                },
                errors: validation.errors,
                warnings: validation.warnings,
            },
            network: None,
            authentication: None,
            models: None,
        };

        if tests.config.status == ProbeStatus::Failed {
            return DiagnosticsReport {
                timestamp: Utc::now(),
                config,
                tests,
                overall: Overall {
                    status: OverallStatus::Failed,
                    message: "Configuration validation failed".to_string(),
                },
            };
        }

        tests.network = Some(self.probe_network(backend).await);
        tests.authentication = Some(self.probe_authentication(backend).await);
        tests.models = Some(self.probe_models(backend).await);

        let overall = Overall::from_statuses(&tests.statuses());
        info!(status = ?overall.status, base_url = %backend.base_url_trimmed(), "Diagnostics finished");

        DiagnosticsReport {
            timestamp: Utc::now(),
            config,
            tests,
            overall,
        }
    }

    /// `HEAD` on the origin of the base URL; any HTTP answer means reachable.
    async fn probe_network(&self, backend: &BackendConfig) -> ProbeResult {
        let started = Instant::now();
        let origin = match Url::parse(backend.base_url_trimmed()) {
            Ok(url) => url.origin().ascii_serialization(),
            Err(err) => {
                return ProbeResult {
                    status: ProbeStatus::Failed,
                    message: format!("Invalid base URL: {err}"),
                    ..ProbeResult::passed("", started)
                };
            }
        };

        match self.http().head(&origin).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) => ProbeResult {
                status_code: Some(response.status().as_u16()),
                ..ProbeResult::passed("Network connection is working", started)
            },
            Err(err) => ProbeResult::failed(&classify_reqwest(err), started),
        }
    }

    async fn probe_authentication(&self, backend: &BackendConfig) -> ProbeResult {
        let started = Instant::now();
        match self.fetch_models(backend, PROBE_TIMEOUT).await {
            Ok(_) => ProbeResult::passed("API authentication succeeded", started),
            Err(err) => ProbeResult::failed(&err, started),
        }
    }

    async fn probe_models(&self, backend: &BackendConfig) -> ProbeResult {
        let started = Instant::now();
        match self.fetch_models(backend, MODELS_PROBE_TIMEOUT).await {
            Ok(list) => {
                let ids: Vec<String> = list.data.into_iter().map(|model| model.id).collect();
                ProbeResult {
                    model_count: Some(ids.len()),
                    models: Some(ids),
                    ..ProbeResult::passed("Model list retrieved", started)
                }
            }
            Err(err) => ProbeResult::failed(&err, started),
        }
    }
}
