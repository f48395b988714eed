//! NATS connection and JetStream stream setup.
//!
//! Both tiers share one stream whose subjects are `{topic}.>`. Districts
//! publish to `{topic}.{action}`; the city reads through a durable pull
//! consumer named after its consumer group, so delivery positions survive
//! restarts and concurrent city instances share the work.

use async_nats::jetstream;
use tracing::info;

use crate::config::BrokerConfig;
use crate::error::CoreError;

/// Connect to a NATS server.
pub async fn connect(url: &str) -> Result<async_nats::Client, CoreError> {
    info!(url = url, "Connecting to NATS server");
    let client = async_nats::connect(url)
        .await
        .map_err(|e| CoreError::Transport(format!("failed to connect to {url}: {e}")))?;
    info!("NATS connection established");
    Ok(client)
}

/// Get the event stream, creating it on first use.
pub async fn ensure_stream(
    context: &jetstream::Context,
    broker: &BrokerConfig,
) -> Result<jetstream::stream::Stream, CoreError> {
    let stream = context
        .get_or_create_stream(jetstream::stream::Config {
            name: broker.stream.clone(),
            subjects: vec![broker.subject_filter()],
            ..Default::default()
        })
        .await
        .map_err(|e| {
            CoreError::Transport(format!("failed to open stream {}: {e}", broker.stream))
        })?;
    info!(stream = %broker.stream, subjects = %broker.subject_filter(), "Event stream ready");
    Ok(stream)
}
