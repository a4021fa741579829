/// Broker configuration loading.
pub mod config;
/// Error types: broker operations, mailbox receive, logging setup.
pub mod error;
/// Logging setup (filters, console and file sinks).
pub mod logging;
/// Pub/Sub: Broker, Subscription, Mailbox.
pub mod pubsub;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Broker configuration.
pub use crate::config::{BrokerConfig, DeliveryMode};
/// Operation errors.
pub use error::{BrokerError, LoggingError, RecvError, TryRecvError};
/// Logging entry points.
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
/// Pub/Sub API.
pub use pubsub::{
    Broker, BrokerStats, MailboxReceiver, SubscriberId, Subscription, TopicStats, Unsubscriber,
    DEFAULT_MAILBOX_CAPACITY, DEFAULT_QUEUE_CAPACITY,
};
