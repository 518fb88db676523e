//! Publish/subscribe types shared by backends and decorators.

use tokio::sync::mpsc;

/// A pub/sub message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Channel name.
    pub channel: String,
    /// Message payload.
    pub payload: String,
    /// Pattern (for pattern subscriptions).
    pub pattern: Option<String>,
}

/// A subscription handle.
///
/// Backends feed messages into the channel returned by
/// [`Subscription::channel_pair`]; dropping the handle ends the subscription.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<Message>,
    channels: Vec<String>,
    strip: Vec<String>,
}

impl Subscription {
    /// Default buffer size for subscription channels.
    pub const BUFFER: usize = 100;

    /// Create a subscription fed by `receiver`.
    pub fn new(receiver: mpsc::Receiver<Message>, channels: Vec<String>) -> Self {
        Self {
            receiver,
            channels,
            strip: Vec::new(),
        }
    }

    /// Create a sender and the subscription it feeds.
    pub fn channel_pair(channels: Vec<String>) -> (mpsc::Sender<Message>, Self) {
        let (tx, rx) = mpsc::channel(Self::BUFFER);
        (tx, Self::new(rx, channels))
    }

    /// Report channel names with `prefix` removed.
    ///
    /// Used by key-prefixing decorators so subscribers only see logical
    /// channel names. Prefixes stack: each call strips after the previous ones.
    pub fn with_channel_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        for channel in &mut self.channels {
            if let Some(rest) = channel.strip_prefix(prefix.as_str()) {
                *channel = rest.to_string();
            }
        }
        self.strip.push(prefix);
        self
    }

    /// The subscribed channel names.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Receive the next message.
    ///
    /// Returns `None` once the backend side has gone away.
    pub async fn recv(&mut self) -> Option<Message> {
        let message = self.receiver.recv().await?;
        Some(self.localize(message))
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&mut self) -> Option<Message> {
        let message = self.receiver.try_recv().ok()?;
        Some(self.localize(message))
    }

    fn localize(&self, mut message: Message) -> Message {
        for prefix in &self.strip {
            if let Some(rest) = message.channel.strip_prefix(prefix.as_str()) {
                message.channel = rest.to_string();
            }
        }
        message
    }
}
