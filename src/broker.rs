use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tracing::{error, info, Instrument};

#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish(&self, payload: String, topic_id: &str, channel: &str) -> anyhow::Result<()>;
}

/// Turns a (possibly encrypted) broker delivery into the plain request body.
///
/// Only [`Passthrough`] ships with this crate. Deployments whose broker encrypts
/// deliveries must supply their own implementation holding the pre-shared key.
pub trait MessageDecryptor: Send + Sync {
    fn decrypt(&self, body: Bytes) -> anyhow::Result<Bytes>;
}

/// Publishes to the broker's HTTP API.
#[derive(Clone)]
pub struct BrokerPublisher {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct PublishBody<'a> {
    id: &'a str,
    channel: &'a str,
    msg: &'a str,
}

impl BrokerPublisher {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl NotificationPublisher for BrokerPublisher {
    async fn publish(&self, payload: String, topic_id: &str, channel: &str) -> anyhow::Result<()> {
        self.client
            .post(format!("{}/publish", self.base_url))
            .json(&PublishBody {
                id: topic_id,
                channel,
                msg: &payload,
            })
            .send()
            .await
            .context("broker publish")?
            .error_for_status()
            .context("broker publish status")?;
        Ok(())
    }
}

/// Body decoding for deployments where the broker delivers plaintext. It does
/// not decrypt anything.
#[derive(Clone, Copy, Default)]
pub struct Passthrough;

impl MessageDecryptor for Passthrough {
    fn decrypt(&self, body: Bytes) -> anyhow::Result<Bytes> {
        Ok(body)
    }
}

/// Emits the "account created" event on a detached task.
/// At most once: failures are logged and dropped, never retried.
#[derive(Clone)]
pub struct ActivationNotifier {
    publisher: Arc<dyn NotificationPublisher>,
    topic_id: String,
    channel: String,
}

impl ActivationNotifier {
    pub fn new(publisher: Arc<dyn NotificationPublisher>, topic_id: &str, channel: &str) -> Self {
        Self {
            publisher,
            topic_id: topic_id.to_string(),
            channel: channel.to_string(),
        }
    }

    pub fn notify(&self, user_id: &str) -> tokio::task::JoinHandle<()> {
        let payload = serde_json::json!({ "user_id": user_id }).to_string();
        let publisher = self.publisher.clone();
        let topic_id = self.topic_id.clone();
        let channel = self.channel.clone();
        let span = tracing::info_span!("activation_event", user_id = %user_id);
        tokio::spawn(
            async move {
                match publisher.publish(payload, &topic_id, &channel).await {
                    Ok(()) => info!("activation event published"),
                    Err(e) => error!(error = %e, "activation event dropped"),
                }
            }
            .instrument(span),
        )
    }
}
