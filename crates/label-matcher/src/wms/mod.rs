//! WMS client
//!
//! Session login plus the asynchronous report protocol. The reconciler only
//! sees the [`OrderSource`] trait so tests can swap in a fake.

use async_trait::async_trait;
use reqwest::Client;

use crate::config::WmsConfig;
use crate::error::{AuthError, ReportError};

pub mod poll;
pub mod report;
pub mod session;

pub use poll::{PollPolicy, PollState, TaskStatus};
pub use report::{ReportClient, ReportRow, TaskId};
pub use session::{Credential, SessionClient};

/// Source of the open-orders snapshot
#[async_trait]
pub trait OrderSource: Send + Sync {
    async fn authenticate(&self) -> Result<Credential, AuthError>;

    /// Submit, poll and fetch the report in one call
    async fn pull_report(&self, credential: &Credential) -> Result<Vec<ReportRow>, ReportError>;

    fn report_name(&self) -> &str;

    /// Row column holding the order reference
    fn order_id_column(&self) -> &str;
}

/// HTTP implementation of [`OrderSource`]
pub struct WmsClient {
    config: WmsConfig,
    session: SessionClient,
    reports: ReportClient,
}

impl WmsClient {
    pub fn new(config: WmsConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("label-matcher/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_client(client, config))
    }

    /// Share an existing connection pool
    pub fn with_client(client: Client, config: WmsConfig) -> Self {
        let session = SessionClient::new(client.clone(), config.base_url.clone());
        let reports = ReportClient::new(
            client,
            config.base_url.clone(),
            config.request_timeout,
            config.fetch_timeout,
            config.poll,
        );

        Self {
            config,
            session,
            reports,
        }
    }
}

#[async_trait]
impl OrderSource for WmsClient {
    async fn authenticate(&self) -> Result<Credential, AuthError> {
        self.session.authenticate(&self.config.login).await
    }

    async fn pull_report(&self, credential: &Credential) -> Result<Vec<ReportRow>, ReportError> {
        self.reports.pull(credential, &self.config.report_name).await
    }

    fn report_name(&self) -> &str {
        &self.config.report_name
    }

    fn order_id_column(&self) -> &str {
        &self.config.order_id_column
    }
}
