use async_trait::async_trait;
use aws_sdk_sns::{error::DisplayErrorContext, Client};
use tracing::{debug, instrument};

use super::AlertSink;
use crate::error::AlertError;

/// Publishes alerts to an SNS topic
#[derive(Clone)]
pub struct SnsAlertSink {
    client: Client,
    topic_arn: String,
}

impl SnsAlertSink {
    /// Client from the default AWS credential and region chain
    pub async fn new(topic_arn: impl Into<String>) -> Self {
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;

        Self::from_client(Client::new(&shared), topic_arn)
    }

    pub fn from_client(client: Client, topic_arn: impl Into<String>) -> Self {
        Self {
            client,
            topic_arn: topic_arn.into(),
        }
    }
}

#[async_trait]
impl AlertSink for SnsAlertSink {
    #[instrument(skip(self, body), fields(topic = %self.topic_arn))]
    async fn publish(&self, subject: &str, body: &str) -> Result<(), AlertError> {
        let output = self
            .client
            .publish()
            .topic_arn(&self.topic_arn)
            .subject(subject)
            .message(body)
            .send()
            .await
            .map_err(|e| AlertError(DisplayErrorContext(&e).to_string()))?;

        debug!(message_id = ?output.message_id(), "Published alert");

        Ok(())
    }
}
