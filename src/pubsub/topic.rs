use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::runtime::Handle;

use super::{
    distributor::{self, Distributor, Enqueue},
    mailbox::{MailboxSender, SendOutcome},
    subscription::SubscriberId,
};
use crate::BrokerError;

/// Счётчики доставки. Один экземпляр живёт в каждом топике, ещё один
/// общий для всего брокера.
#[derive(Debug, Default)]
pub(crate) struct DeliveryCounters {
    pub(crate) delivered: AtomicU64,
    pub(crate) dropped: AtomicU64,
}

/// Статистика по одному топику.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicStats {
    pub label: String,
    pub subscribers: usize,
    /// Сообщений, принятых почтовыми ящиками.
    pub delivered: u64,
    /// Сообщений, отброшенных из-за переполнения.
    pub dropped: u64,
    /// Работает ли фоновый распределитель (режим очереди).
    pub queued: bool,
}

/// Участник топика: подписчик и пишущая сторона его ящика.
pub(crate) struct Member<M> {
    id: SubscriberId,
    mailbox: MailboxSender<M>,
}

/// Результат удаления подписчика.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Detach {
    /// Подписчика уже нет в топике.
    NotFound,
    /// Подписчик удалён, в топике остались другие.
    Remaining(usize),
    /// Удалён последний подписчик, топик закрыт.
    Emptied,
}

/// Топик: все активные подписки одной метки и политика доставки.
///
/// Список участников хранится как `Arc<Vec<_>>`: рассылка берёт снимок
/// под мьютексом и работает с ним уже без блокировки, а изменения
/// состава копируют вектор через [`Arc::make_mut`], если снимок кем-то
/// удерживается.
pub(crate) struct Topic<M> {
    label: Arc<str>,
    state: Mutex<TopicState<M>>,
    counters: DeliveryCounters,
    totals: Arc<DeliveryCounters>,
    distributor: Option<Distributor<M>>,
}

struct TopicState<M> {
    members: Arc<Vec<Member<M>>>,
    /// Топик опустел и снят с реестра; новых участников не принимает.
    closed: bool,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<M> Member<M> {
    pub(crate) fn new(
        id: SubscriberId,
        mailbox: MailboxSender<M>,
    ) -> Self {
        Self { id, mailbox }
    }
}

impl<M> Topic<M>
where
    M: Clone + Send + Sync + 'static,
{
    /// Топик с прямой рассылкой в потоке издателя.
    pub(crate) fn direct(
        label: Arc<str>,
        totals: Arc<DeliveryCounters>,
    ) -> Arc<Self> {
        Arc::new(Self::build(label, totals, None))
    }

    /// Топик с фоновым распределителем, запущенным на `runtime`.
    pub(crate) fn queued(
        label: Arc<str>,
        totals: Arc<DeliveryCounters>,
        queue_capacity: usize,
        runtime: &Handle,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let distributor = distributor::spawn(runtime, weak.clone(), queue_capacity);
            Self::build(label, totals, Some(distributor))
        })
    }

    fn build(
        label: Arc<str>,
        totals: Arc<DeliveryCounters>,
        distributor: Option<Distributor<M>>,
    ) -> Self {
        tracing::debug!(
            topic = %label,
            queued = distributor.is_some(),
            "Topic created"
        );
        Self {
            label,
            state: Mutex::new(TopicState {
                members: Arc::new(Vec::new()),
                closed: false,
            }),
            counters: DeliveryCounters::default(),
            totals,
            distributor,
        }
    }

    pub(crate) fn label(&self) -> &Arc<str> {
        &self.label
    }

    /// Добавляет участника.
    ///
    /// # Возвращает
    /// - `Ok(n)` с числом участников после добавления
    /// - `Err(member)` если топик уже закрыт; участник возвращается
    ///   вызывающему для повторной попытки на новом топике
    pub(crate) fn attach(
        &self,
        member: Member<M>,
    ) -> Result<usize, Member<M>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(member);
        }
        let members = Arc::make_mut(&mut state.members);
        members.push(member);
        Ok(members.len())
    }

    /// Удаляет участника и закрывает его почтовый ящик.
    ///
    /// Если участник был последним, топик закрывается и останавливает
    /// распределитель. Снять топик с реестра должен вызывающий.
    pub(crate) fn detach(
        &self,
        id: SubscriberId,
    ) -> Detach {
        let (removed, outcome) = {
            let mut state = self.state.lock();
            let Some(pos) = state.members.iter().position(|m| m.id == id) else {
                return Detach::NotFound;
            };
            let removed = Arc::make_mut(&mut state.members).remove(pos);
            if state.members.is_empty() {
                state.closed = true;
                if let Some(distributor) = &self.distributor {
                    distributor.stop();
                }
                (removed, Detach::Emptied)
            } else {
                (removed, Detach::Remaining(state.members.len()))
            }
        };

        removed.mailbox.close();
        if outcome == Detach::Emptied {
            tracing::debug!(topic = %self.label, "Last subscriber left, topic closed");
        }
        outcome
    }

    /// Публикация в топик согласно режиму доставки.
    ///
    /// # Возвращает
    /// - в прямом режиме: число ящиков, принявших сообщение
    /// - в режиме очереди: число подписчиков на момент постановки в
    ///   очередь, либо 0, если очередь переполнена
    pub(crate) fn publish(
        &self,
        message: M,
    ) -> Result<usize, BrokerError> {
        let Some(distributor) = &self.distributor else {
            return Ok(self.deliver(message));
        };

        match distributor.enqueue(message) {
            Enqueue::Accepted => Ok(self.subscriber_count()),
            Enqueue::Full => {
                self.record_dropped(1);
                tracing::trace!(topic = %self.label, "Distribution queue full, message dropped");
                Ok(0)
            }
            // Топик снесли параллельно с публикацией: как будто
            // подписчиков не было.
            Enqueue::Stopped if self.is_closed() => Ok(0),
            Enqueue::Stopped => Err(BrokerError::DistributorStopped {
                label: self.label.to_string(),
            }),
        }
    }

    /// Неблокирующая рассылка всем текущим участникам.
    ///
    /// Переполненный ящик теряет только своё сообщение; остальные
    /// получают его как обычно. Отправка в ящик, закрытый параллельной
    /// отпиской, молча игнорируется.
    pub(crate) fn deliver(
        &self,
        message: M,
    ) -> usize {
        let snapshot = self.snapshot();
        let Some((last, rest)) = snapshot.split_last() else {
            return 0;
        };

        let mut delivered = 0;
        let mut dropped = 0;
        let mut offer = |member: &Member<M>, msg: M| match member.mailbox.send(msg) {
            SendOutcome::Delivered => delivered += 1,
            SendOutcome::Full => {
                dropped += 1;
                tracing::trace!(
                    topic = %self.label,
                    subscriber = %member.id,
                    "Mailbox full, message dropped"
                );
            }
            SendOutcome::Closed => {}
        };

        for member in rest {
            offer(member, message.clone());
        }
        offer(last, message);

        self.record_delivered(delivered);
        self.record_dropped(dropped);
        delivered as usize
    }

    /// Снимок списка участников, взятый под мьютексом.
    fn snapshot(&self) -> Arc<Vec<Member<M>>> {
        self.state.lock().members.clone()
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.state.lock().members.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn distributor_running(&self) -> bool {
        self.distributor.as_ref().is_some_and(Distributor::is_running)
    }

    pub(crate) fn stats(&self) -> TopicStats {
        TopicStats {
            label: self.label.to_string(),
            subscribers: self.subscriber_count(),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            queued: self.distributor.is_some(),
        }
    }

    fn record_delivered(
        &self,
        n: u64,
    ) {
        if n > 0 {
            self.counters.delivered.fetch_add(n, Ordering::Relaxed);
            self.totals.delivered.fetch_add(n, Ordering::Relaxed);
        }
    }

    fn record_dropped(
        &self,
        n: u64,
    ) {
        if n > 0 {
            self.counters.dropped.fetch_add(n, Ordering::Relaxed);
            self.totals.dropped.fetch_add(n, Ordering::Relaxed);
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие трейты
////////////////////////////////////////////////////////////////////////////////

impl<M> Clone for Member<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            mailbox: self.mailbox.clone(),
        }
    }
}

impl<M> Drop for Topic<M> {
    fn drop(&mut self) {
        if let Some(distributor) = &self.distributor {
            distributor.stop();
        }
    }
}
