use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AmqpOptions {
    pub uri: String,
    pub exchange: String,
    pub service: String,
    pub topic: String,
    /// Fixed wait between connection attempts. No backoff growth; broker
    /// restarts are assumed to resolve within a bounded window.
    pub reconnect_interval: Duration,
    /// Full-request retries after a broker shutdown signal. `None` retries
    /// until the broker comes back.
    pub max_retries: Option<u32>,
    /// Upper bound on one reply wait. `None` blocks until a reply arrives.
    pub reply_timeout: Option<Duration>,
}

impl AmqpOptions {
    pub fn new(
        uri: impl Into<String>,
        exchange: impl Into<String>,
        service: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            exchange: exchange.into(),
            service: service.into(),
            topic: topic.into(),
            reconnect_interval: Duration::from_secs(60),
            max_retries: None,
            reply_timeout: None,
        }
    }
}
