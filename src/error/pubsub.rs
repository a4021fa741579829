use thiserror::Error;

/// Ошибки операций брокера (`subscribe` / `publish`).
///
/// Отсутствие подписчиков и переполненный почтовый ящик ошибками не
/// считаются: такие ситуации поглощаются внутри брокера. Наружу выходят
/// только нарушения внутренней согласованности реестра.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("topic '{label}' stayed torn down after {attempts} attach attempts")]
    Inconsistent { label: String, attempts: usize },

    #[error("distributor for topic '{label}' stopped while the topic is still live")]
    DistributorStopped { label: String },

    #[error("queued delivery requires a running Tokio runtime")]
    NoRuntime,
}

/// Ошибка при получении сообщений.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecvError {
    #[error("mailbox is closed")]
    Closed,
}

/// Ошибка при неблокирующем получении сообщений.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TryRecvError {
    #[error("no messages available")]
    Empty,

    #[error("mailbox is closed")]
    Closed,
}

// === Преобразования ===

impl From<async_channel::RecvError> for RecvError {
    fn from(_: async_channel::RecvError) -> Self {
        RecvError::Closed
    }
}

impl From<async_channel::TryRecvError> for TryRecvError {
    fn from(err: async_channel::TryRecvError) -> Self {
        match err {
            async_channel::TryRecvError::Empty => TryRecvError::Empty,
            async_channel::TryRecvError::Closed => TryRecvError::Closed,
        }
    }
}
