//! Application payload hook.

use async_trait::async_trait;
use yoo_auth::UserId;

/// Failure inside a [`MessageProducer`]. Logged; the session continues.
#[derive(Debug, thiserror::Error)]
#[error("message producer failed: {0}")]
pub struct ProducerError(pub String);

/// Payload received from a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundPayload {
    /// UTF-8 payload.
    Text(String),
    /// Binary payload.
    Binary(Vec<u8>),
}

/// Supplies outbound payloads on each update tick and consumes inbound ones.
#[async_trait]
pub trait MessageProducer: Send + Sync {
    /// Called on every update tick of a live, responsive connection.
    /// `Some(text)` is sent to the client as a text frame.
    async fn produce(&self, user: &UserId) -> Result<Option<String>, ProducerError>;

    /// Called for every text or binary frame the client sends.
    async fn on_message(&self, _user: &UserId, _payload: InboundPayload) {}
}

/// Producer that never sends anything and ignores input.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopProducer;

#[async_trait]
impl MessageProducer for NoopProducer {
    async fn produce(&self, _user: &UserId) -> Result<Option<String>, ProducerError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_produces_nothing() {
        let user = UserId::new("u1").unwrap();
        assert!(NoopProducer.produce(&user).await.unwrap().is_none());
        NoopProducer
            .on_message(&user, InboundPayload::Text("ignored".into()))
            .await;
    }

    #[test]
    fn producer_error_display() {
        let err = ProducerError("store unavailable".into());
        assert_eq!(err.to_string(), "message producer failed: store unavailable");
    }
}
