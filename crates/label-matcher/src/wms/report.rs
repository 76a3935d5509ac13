//! Asynchronous report protocol: submit, poll, fetch

use reqwest::{header::AUTHORIZATION, Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use super::poll::{PollPolicy, PollState, TaskStatus};
use super::session::Credential;
use crate::error::{snippet, ReportError, ReportPhase};

/// One report row: column name to value
pub type ReportRow = serde_json::Map<String, Value>;

/// Identifier of a submitted report task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskId(String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accepts string or numeric ids; empty strings are not ids
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Self(s.trim().to_string())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest<'a> {
    report_name: &'a str,
    filters: Vec<Value>,
}

#[derive(Deserialize)]
struct SubmitResponse {
    #[serde(rename = "TaskId", default)]
    task_id: Value,
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(rename = "Status", default)]
    status: Option<String>,
}

#[derive(Deserialize)]
struct DataResponse {
    #[serde(rename = "Data", default)]
    data: Option<Vec<Value>>,
}

pub struct ReportClient {
    client: Client,
    base_url: String,
    request_timeout: Duration,
    fetch_timeout: Duration,
    poll: PollPolicy,
}

impl ReportClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        request_timeout: Duration,
        fetch_timeout: Duration,
        poll: PollPolicy,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            request_timeout,
            fetch_timeout,
            poll,
        }
    }

    /// Submit, wait for `Done`, fetch. Any failure aborts the whole pull;
    /// no partial data is ever returned.
    #[instrument(skip(self, credential))]
    pub async fn pull(
        &self,
        credential: &Credential,
        report_name: &str,
    ) -> Result<Vec<ReportRow>, ReportError> {
        let task_id = self.submit(credential, report_name).await?;
        self.wait_until_done(credential, &task_id).await?;
        self.fetch(credential, &task_id).await
    }

    /// `POST /reports` with an empty filter set
    pub async fn submit(
        &self,
        credential: &Credential,
        report_name: &str,
    ) -> Result<TaskId, ReportError> {
        let url = format!("{}/reports", self.base_url);
        let request = SubmitRequest {
            report_name,
            filters: Vec::new(),
        };

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, credential.authorization())
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| ReportError::request(ReportPhase::Submit, e))?;

        let response = ensure_success(response, ReportPhase::Submit).await?;
        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| ReportError::request(ReportPhase::Submit, e))?;

        let task_id = TaskId::from_value(&body.task_id).ok_or_else(|| {
            error!("No TaskId in report response");
            ReportError::MissingTaskId
        })?;

        info!(task_id = %task_id, "Report submitted");
        Ok(task_id)
    }

    /// `GET /reports/{id}/status` once
    pub async fn status(
        &self,
        credential: &Credential,
        task_id: &TaskId,
    ) -> Result<TaskStatus, ReportError> {
        let url = format!("{}/reports/{}/status", self.base_url, task_id);

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, credential.authorization())
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| ReportError::request(ReportPhase::Poll, e))?;

        let response = ensure_success(response, ReportPhase::Poll).await?;
        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| ReportError::request(ReportPhase::Poll, e))?;

        Ok(TaskStatus::parse(body.status.as_deref()))
    }

    /// Drive the poll state machine to a terminal state.
    ///
    /// Transport errors and non-success statuses end polling immediately.
    pub async fn wait_until_done(
        &self,
        credential: &Credential,
        task_id: &TaskId,
    ) -> Result<(), ReportError> {
        let mut state = PollState::Submitted;

        loop {
            match state {
                PollState::Done { attempts } => {
                    debug!(task_id = %task_id, attempts, "Report ready");
                    return Ok(());
                }
                PollState::TooLarge { .. } => {
                    error!(task_id = %task_id, "Report too large");
                    return Err(ReportError::TooLarge {
                        task_id: task_id.to_string(),
                    });
                }
                PollState::TimedOut { attempts } => {
                    error!(
                        task_id = %task_id,
                        attempts,
                        "Report timed out after {:?}",
                        self.poll.max_wait()
                    );
                    return Err(ReportError::TimedOut {
                        task_id: task_id.to_string(),
                        attempts,
                    });
                }
                PollState::Submitted | PollState::Polling { .. } => {}
            }

            if state.needs_delay() {
                tokio::time::sleep(self.poll.interval).await;
            }

            let status = self.status(credential, task_id).await?;
            if let TaskStatus::InProgress(ref raw) = status {
                debug!(task_id = %task_id, status = ?raw, attempt = state.attempts() + 1, "Report not ready");
            }
            state = state.observe(&status, &self.poll);
        }
    }

    /// `GET /reports/{id}` for the materialized rows
    pub async fn fetch(
        &self,
        credential: &Credential,
        task_id: &TaskId,
    ) -> Result<Vec<ReportRow>, ReportError> {
        let url = format!("{}/reports/{}", self.base_url, task_id);

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, credential.authorization())
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| ReportError::request(ReportPhase::Fetch, e))?;

        let response = ensure_success(response, ReportPhase::Fetch).await?;
        let body: DataResponse = response
            .json()
            .await
            .map_err(|e| ReportError::request(ReportPhase::Fetch, e))?;

        let values = body.data.ok_or_else(|| ReportError::MissingData {
            task_id: task_id.to_string(),
        })?;

        let total = values.len();
        let rows: Vec<ReportRow> = values
            .into_iter()
            .filter_map(|value| match value {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect();

        if rows.len() != total {
            warn!(
                task_id = %task_id,
                "Ignored {} report rows that were not objects",
                total - rows.len()
            );
        }

        info!(task_id = %task_id, rows = rows.len(), "Report fetched");
        Ok(rows)
    }
}

async fn ensure_success(response: Response, phase: ReportPhase) -> Result<Response, ReportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    error!(%phase, status = status.as_u16(), "Report request failed: {}", snippet(&body));
    Err(ReportError::Status {
        phase,
        status: status.as_u16(),
        body: snippet(&body),
    })
}
