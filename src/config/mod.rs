pub mod settings;

pub use settings::{BrokerConfig, DeliveryMode};
