use serde::{Deserialize, Serialize};

use config::{Config, ConfigError, Environment};

use crate::pubsub::{DEFAULT_MAILBOX_CAPACITY, DEFAULT_QUEUE_CAPACITY};

/// Где выполняется рассылка опубликованного сообщения.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Рассылка в потоке издателя.
    #[default]
    Direct,
    /// Издатель только ставит сообщение в очередь топика, рассылает
    /// фоновая задача (по одной на топик). Требует рантайм Tokio.
    Queued,
}

/// Конфигурация брокера.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Ёмкость почтового ящика каждого подписчика.
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
    #[serde(default)]
    pub delivery: DeliveryMode,
    /// Ёмкость очереди распределителя (только для `Queued`).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl BrokerConfig {
    /// Загружает конфигурацию из значений по умолчанию и переменных
    /// окружения с префиксом `BOBOK_` (`BOBOK_MAILBOX_CAPACITY`,
    /// `BOBOK_DELIVERY`, `BOBOK_QUEUE_CAPACITY`).
    pub fn load() -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            // Добавляем значения по умолчанию
            .set_default("mailbox_capacity", DEFAULT_MAILBOX_CAPACITY as u64)?
            .set_default("delivery", "direct")?
            .set_default("queue_capacity", DEFAULT_QUEUE_CAPACITY as u64)?
            // Добавляем переменные окружения с префиксом BOBOK_
            .add_source(Environment::with_prefix("BOBOK").try_parsing(true))
            .build()?;

        cfg.try_deserialize()
    }

    pub fn with_mailbox_capacity(
        mut self,
        capacity: usize,
    ) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    pub fn with_delivery(
        mut self,
        delivery: DeliveryMode,
    ) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_queue_capacity(
        mut self,
        capacity: usize,
    ) -> Self {
        self.queue_capacity = capacity;
        self
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            delivery: DeliveryMode::Direct,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

fn default_mailbox_capacity() -> usize {
    DEFAULT_MAILBOX_CAPACITY
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
