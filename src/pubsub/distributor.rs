//! Фоновый распределитель топика (режим очереди).
//!
//! Публикация только кладёт сообщение в ограниченную очередь топика;
//! рассылку по почтовым ящикам выполняет одна задача на топик.
//!
//! ```text
//! Publishers:                         Distributor (one per topic):
//!   publish ──┐
//!   publish ──┼──► queue (bounded) ──► drain ──► Topic::deliver ──► mailboxes
//!   publish ──┘                          ▲
//!                          stop ─────────┘
//! ```
//!
//! Правила:
//! - очередь переполнена: сообщение отбрасывается, издатель не ждёт;
//! - сигнал остановки проверяется при каждом пробуждении, в том числе
//!   пока задача ждёт новых сообщений;
//! - задача держит только `Weak` на топик и завершается, если топик
//!   уничтожен.

use std::sync::Weak;

use tokio::{
    runtime::Handle,
    sync::{mpsc, watch},
};

use super::topic::Topic;

/// Ёмкость очереди распределителя по умолчанию.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Управляющая сторона распределителя, хранится в топике.
pub(crate) struct Distributor<M> {
    queue: mpsc::Sender<M>,
    stop: watch::Sender<bool>,
}

/// Результат постановки сообщения в очередь.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Enqueue {
    Accepted,
    Full,
    /// Задача распределителя завершилась.
    Stopped,
}

/// Запускает распределитель для топика.
pub(crate) fn spawn<M>(
    runtime: &Handle,
    topic: Weak<Topic<M>>,
    capacity: usize,
) -> Distributor<M>
where
    M: Clone + Send + Sync + 'static,
{
    let (queue_tx, queue_rx) = mpsc::channel(capacity.max(1));
    let (stop_tx, stop_rx) = watch::channel(false);

    runtime.spawn(run(topic, queue_rx, stop_rx));

    Distributor {
        queue: queue_tx,
        stop: stop_tx,
    }
}

impl<M> Distributor<M> {
    pub(crate) fn enqueue(
        &self,
        message: M,
    ) -> Enqueue {
        match self.queue.try_send(message) {
            Ok(()) => Enqueue::Accepted,
            Err(mpsc::error::TrySendError::Full(_)) => Enqueue::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => Enqueue::Stopped,
        }
    }

    /// Посылает сигнал остановки. Повторные вызовы безопасны.
    pub(crate) fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Задача ещё держит приёмную сторону очереди.
    pub(crate) fn is_running(&self) -> bool {
        !self.queue.is_closed()
    }
}

async fn run<M>(
    topic: Weak<Topic<M>>,
    mut queue: mpsc::Receiver<M>,
    mut stop: watch::Receiver<bool>,
) where
    M: Clone + Send + Sync + 'static,
{
    loop {
        tokio::select! {
            biased;

            // Сигнал шлётся только со значением `true`; ошибка означает,
            // что топик уничтожен.
            _ = stop.changed() => break,

            next = queue.recv() => {
                let Some(message) = next else { break };
                let Some(topic) = topic.upgrade() else { break };

                topic.deliver(message);
                while let Ok(message) = queue.try_recv() {
                    topic.deliver(message);
                }
            }
        }
    }

    queue.close();
    tracing::debug!("Topic distributor stopped");
}
