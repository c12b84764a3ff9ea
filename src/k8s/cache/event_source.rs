/**
 * Change event transports
 *
 * A source yields raw message payloads in arrival order. Decoding happens in the
 * enrichment service so a malformed payload costs one event, not the stream.
 */
use super::config::{
    DEFAULT_EVENT_CHANNEL, DEFAULT_REDIS_HOST, DEFAULT_REDIS_PORT, EVENT_CHANNEL_CAPACITY,
};
use super::errors::stream_closed_error;
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

#[async_trait]
pub trait ChangeEventSource: Send {
    /// Wait for the next payload.
    ///
    /// `Ok(None)` means the source is exhausted. Implementations must be cancel
    /// safe: dropping the future before it resolves loses no message.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying transport fails.
    async fn recv(&mut self) -> Result<Option<String>>;
}

/// Adapts any stream of payloads into a [`ChangeEventSource`].
pub struct StreamEventSource<S> {
    inner: S,
}

impl<S> StreamEventSource<S>
where
    S: Stream<Item = Result<String>> + Unpin + Send,
{
    #[must_use]
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }
}

/// Source fed from inside the process, see [`ChannelEventSource::channel`].
pub type ChannelEventSource =
    StreamEventSource<futures::stream::Map<ReceiverStream<String>, fn(String) -> Result<String>>>;

fn payload(message: String) -> Result<String> {
    Ok(message)
}

impl ChannelEventSource {
    /// In-process source fed through the returned sender. Dropping every sender
    /// exhausts the source.
    #[must_use]
    pub fn channel() -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let stream = ReceiverStream::new(rx).map(payload as fn(String) -> Result<String>);
        (tx, Self::new(stream))
    }
}

#[async_trait]
impl<S> ChangeEventSource for StreamEventSource<S>
where
    S: Stream<Item = Result<String>> + Unpin + Send,
{
    async fn recv(&mut self) -> Result<Option<String>> {
        self.inner.next().await.transpose()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventStreamConfig {
    pub host: String,
    pub port: u16,
    pub channel: String,
}

impl Default for EventStreamConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_REDIS_HOST.to_string(),
            port: DEFAULT_REDIS_PORT,
            channel: DEFAULT_EVENT_CHANNEL.to_string(),
        }
    }
}

impl EventStreamConfig {
    #[must_use]
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

/// Redis pub/sub subscription on the configured channel.
pub struct RedisEventSource {
    channel: String,
    messages: BoxStream<'static, redis::Msg>,
}

impl RedisEventSource {
    /// Connect and subscribe.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or the subscription fails
    pub async fn connect(config: &EventStreamConfig) -> Result<Self> {
        let client = redis::Client::open(config.redis_url())?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(&config.channel).await?;
        info!(
            "📡 subscribed to {} on {}:{}",
            config.channel, config.host, config.port
        );

        Ok(Self {
            channel: config.channel.clone(),
            messages: pubsub.into_on_message().boxed(),
        })
    }
}

#[async_trait]
impl ChangeEventSource for RedisEventSource {
    async fn recv(&mut self) -> Result<Option<String>> {
        match self.messages.next().await {
            Some(msg) => Ok(Some(msg.get_payload::<String>()?)),
            // pub/sub streams only end when the connection drops
            None => Err(stream_closed_error(&format!(
                "redis subscription to {} lost its connection",
                self.channel
            ))),
        }
    }
}
