use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use dashmap::DashMap;
use tokio::runtime::Handle;

use super::{
    mailbox::{mailbox, MailboxSender},
    subscription::{SubscriberId, Subscription, Unsubscriber},
    topic::{DeliveryCounters, Detach, Member, Topic, TopicStats},
};
use crate::{BrokerConfig, BrokerError, DeliveryMode};

type TopicKey = Arc<str>;

/// Сколько раз `subscribe` пытается присоединиться к живому топику,
/// прежде чем признать реестр несогласованным.
const MAX_ATTACH_ATTEMPTS: usize = 16;

/// Брокер Pub/Sub сообщений: реестр `метка → топик`.
///
/// Поддерживает:
/// - Ленивое создание топика при первой подписке
/// - Автоматическое удаление топика, когда уходит последний подписчик
/// - Неблокирующую публикацию с отбрасыванием при переполнении ящика
/// - Прямую рассылку или рассылку фоновым распределителем
///   ([`DeliveryMode`])
/// - Статистику публикаций, доставок и потерь
///
/// Клонирование дешёвое: все клоны работают с одним реестром.
pub struct Broker<M> {
    shared: Arc<Shared<M>>,
}

struct Shared<M> {
    /// Метка → топик. Шардированная карта: разные метки не
    /// конкурируют за одну блокировку.
    topics: DashMap<TopicKey, Arc<Topic<M>>>,
    config: BrokerConfig,
    next_id: AtomicU64,
    /// Публикации, заставшие живой топик
    published: AtomicU64,
    totals: Arc<DeliveryCounters>,
}

/// Глобальная статистика брокера.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerStats {
    /// Публикации в метки с подписчиками; публикация в пустоту не
    /// учитывается.
    pub published: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub active_topics: usize,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<M> Broker<M>
where
    M: Clone + Send + Sync + 'static,
{
    /// Создаёт брокер с настройками по умолчанию: прямая рассылка,
    /// ящики на 10 сообщений.
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    /// Создаёт брокер с заданной конфигурацией.
    ///
    /// Нулевые ёмкости поднимаются до 1.
    pub fn with_config(mut config: BrokerConfig) -> Self {
        if config.mailbox_capacity == 0 {
            tracing::warn!("mailbox_capacity = 0 is not usable, clamped to 1");
            config.mailbox_capacity = 1;
        }
        if config.queue_capacity == 0 {
            tracing::warn!("queue_capacity = 0 is not usable, clamped to 1");
            config.queue_capacity = 1;
        }

        Self {
            shared: Arc::new(Shared {
                topics: DashMap::new(),
                config,
                next_id: AtomicU64::new(1),
                published: AtomicU64::new(0),
                totals: Arc::new(DeliveryCounters::default()),
            }),
        }
    }

    /// Подписка на метку.
    ///
    /// Создаёт почтовый ящик, находит или создаёт топик и регистрирует в
    /// нём подписчика. Подписчик получает только сообщения,
    /// опубликованные после подписки.
    ///
    /// # Ошибки
    /// - [`BrokerError::NoRuntime`] в режиме очереди вне рантайма Tokio
    /// - [`BrokerError::Inconsistent`] если не удалось присоединиться к
    ///   живому топику
    pub fn subscribe(
        &self,
        label: &str,
    ) -> Result<Subscription<M>, BrokerError> {
        let id = SubscriberId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mailbox(self.shared.config.mailbox_capacity);
        let mut member = Member::new(id, tx.clone());

        for _ in 0..MAX_ATTACH_ATTEMPTS {
            let topic = self.shared.get_or_create_topic(label)?;
            match topic.attach(member) {
                Ok(count) => {
                    tracing::trace!(topic = %label, subscriber = %id, subscribers = count, "Subscribed");
                    let key = topic.label().clone();
                    let unsubscriber = self.unsubscriber(topic, id, tx);
                    return Ok(Subscription::new(key, id, rx, unsubscriber));
                }
                // Топик опустел между поиском и присоединением: помогаем
                // снять его с реестра и пробуем снова.
                Err(rejected) => {
                    member = rejected;
                    self.shared.remove_topic(label, &topic);
                }
            }
        }

        Err(BrokerError::Inconsistent {
            label: label.to_string(),
            attempts: MAX_ATTACH_ATTEMPTS,
        })
    }

    /// Публикация сообщения в топик.
    ///
    /// Публикация в метку без подписчиков не ошибка и не оставляет
    /// следов: топик не создаётся, статистика не меняется, возвращается
    /// `Ok(0)`.
    ///
    /// # Возвращает
    /// - в прямом режиме: число ящиков, принявших сообщение
    /// - в режиме очереди: число подписчиков на момент постановки в
    ///   очередь
    pub fn publish(
        &self,
        label: &str,
        message: M,
    ) -> Result<usize, BrokerError> {
        let Some(topic) = self.shared.topic(label) else {
            tracing::trace!(topic = %label, "Publish without subscribers");
            return Ok(0);
        };
        self.shared.published.fetch_add(1, Ordering::Relaxed);
        topic.publish(message)
    }

    /// Возвращает количество подписчиков на метку.
    pub fn subscriber_count(
        &self,
        label: &str,
    ) -> usize {
        self.shared
            .topic(label)
            .map_or(0, |topic| topic.subscriber_count())
    }

    /// Возвращает список меток, у которых есть подписчики.
    pub fn active_topics(&self) -> Vec<String> {
        self.shared
            .topics
            .iter()
            .map(|entry| entry.key().to_string())
            .collect()
    }

    pub fn topic_count(&self) -> usize {
        self.shared.topics.len()
    }

    /// Возвращает статистику по топику.
    pub fn topic_stats(
        &self,
        label: &str,
    ) -> Option<TopicStats> {
        self.shared.topic(label).map(|topic| topic.stats())
    }

    /// Возвращает глобальную статистику брокера.
    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            published: self.shared.published.load(Ordering::Relaxed),
            delivered: self.shared.totals.delivered.load(Ordering::Relaxed),
            dropped: self.shared.totals.dropped.load(Ordering::Relaxed),
            active_topics: self.shared.topics.len(),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.shared.config
    }

    /// Функция отписки: убирает подписчика из топика, закрывает ящик и
    /// снимает опустевший топик с реестра.
    ///
    /// Держит только `Weak` на реестр, поэтому отписка работает и после
    /// уничтожения брокера.
    fn unsubscriber(
        &self,
        topic: Arc<Topic<M>>,
        id: SubscriberId,
        mailbox: MailboxSender<M>,
    ) -> Unsubscriber {
        let registry = Arc::downgrade(&self.shared);
        Unsubscriber::new(move || {
            let outcome = topic.detach(id);
            if outcome == Detach::Emptied {
                if let Some(shared) = registry.upgrade() {
                    shared.remove_topic(topic.label(), &topic);
                }
            }
            mailbox.close();
            tracing::trace!(topic = %topic.label(), subscriber = %id, ?outcome, "Unsubscribed");
        })
    }

    #[cfg(test)]
    fn topic_handle(
        &self,
        label: &str,
    ) -> Option<Arc<Topic<M>>> {
        self.shared.topic(label)
    }
}

impl<M> Shared<M>
where
    M: Clone + Send + Sync + 'static,
{
    fn topic(
        &self,
        label: &str,
    ) -> Option<Arc<Topic<M>>> {
        self.topics.get(label).map(|entry| entry.value().clone())
    }

    /// Возвращает существующий топик или атомарно создаёт новый.
    ///
    /// Гонку создания решает `entry`: под блокировкой шарда побеждает
    /// ровно один топик, и все вызывающие получают именно его.
    fn get_or_create_topic(
        &self,
        label: &str,
    ) -> Result<Arc<Topic<M>>, BrokerError> {
        if let Some(topic) = self.topic(label) {
            return Ok(topic);
        }

        let runtime = match self.config.delivery {
            DeliveryMode::Direct => None,
            DeliveryMode::Queued => {
                Some(Handle::try_current().map_err(|_| BrokerError::NoRuntime)?)
            }
        };

        let topic = self
            .topics
            .entry(Arc::from(label))
            .or_insert_with(|| {
                let key: TopicKey = Arc::from(label);
                match &runtime {
                    None => Topic::direct(key, self.totals.clone()),
                    Some(handle) => Topic::queued(
                        key,
                        self.totals.clone(),
                        self.config.queue_capacity,
                        handle,
                    ),
                }
            })
            .value()
            .clone();
        Ok(topic)
    }

    /// Удаляет метку, только если в реестре лежит именно `topic`.
    ///
    /// Новый топик, созданный на месте снесённого, не трогается.
    fn remove_topic(
        &self,
        label: &str,
        topic: &Arc<Topic<M>>,
    ) {
        if self
            .topics
            .remove_if(label, |_, stored| Arc::ptr_eq(stored, topic))
            .is_some()
        {
            tracing::debug!(topic = %label, "Topic removed from registry");
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие трейты
////////////////////////////////////////////////////////////////////////////////

impl<M> Clone for Broker<M> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<M> Default for Broker<M>
where
    M: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for Broker<M> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Broker")
            .field("config", &self.shared.config)
            .field("topics", &self.shared.topics.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;
    use tokio::time::timeout;

    use super::*;
    use crate::{RecvError, TryRecvError};

    /// Тест проверяет, что сообщение доставляется подписчику, и что
    /// счётчики обновлены правильно.
    #[tokio::test]
    async fn test_publish_and_receive() {
        let broker = Broker::new();
        let mut sub = broker.subscribe("chan").unwrap();

        assert_eq!(broker.publish("chan", "x"), Ok(1));
        let msg = timeout(Duration::from_millis(50), sub.recv())
            .await
            .expect("timed out")
            .expect("no message");
        assert_eq!(msg, "x");

        let stats = broker.stats();
        assert_eq!(stats.published, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.active_topics, 1);
    }

    /// Тест проверяет, что публикация в несуществующую метку не создаёт
    /// топик и не является ошибкой.
    #[test]
    fn test_publish_to_nonexistent_label() {
        let broker: Broker<u8> = Broker::new();
        assert_eq!(broker.publish("nochan", 1), Ok(0));
        assert_eq!(broker.stats().published, 0);
        assert_eq!(broker.topic_count(), 0);
        assert!(broker.topic_stats("nochan").is_none());
    }

    /// Тест проверяет, что все N подписчиков получают сообщение.
    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(3)]
    #[case(25)]
    fn test_fan_out_reaches_every_subscriber(#[case] n: usize) {
        let broker = Broker::new();
        let mut subs: Vec<_> = (0..n).map(|_| broker.subscribe("multi").unwrap()).collect();

        assert_eq!(broker.publish("multi", 7u32), Ok(n));
        for sub in subs.iter_mut() {
            assert_eq!(sub.try_recv(), Ok(7));
        }
        assert_eq!(broker.subscriber_count("multi"), n);
    }

    /// Тест проверяет, что последний отписавшийся снимает топик с
    /// реестра.
    #[test]
    fn test_last_unsubscribe_removes_topic() {
        let broker: Broker<u8> = Broker::new();
        let a = broker.subscribe("temp").unwrap();
        let b = broker.subscribe("temp").unwrap();
        assert_eq!(broker.topic_count(), 1);

        a.unsubscribe();
        assert_eq!(broker.active_topics(), vec!["temp".to_string()]);

        b.unsubscribe();
        assert_eq!(broker.topic_count(), 0);
        assert_eq!(broker.subscriber_count("temp"), 0);
    }

    /// Тест проверяет идемпотентность отписки и закрытие ящика.
    #[tokio::test]
    async fn test_unsubscribe_twice_is_safe() {
        let broker = Broker::new();
        let mut sub = broker.subscribe("twice").unwrap();
        let _other = broker.subscribe("twice").unwrap();

        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        assert_eq!(broker.subscriber_count("twice"), 1);

        assert_eq!(sub.recv().await, Err::<u8, _>(RecvError::Closed));
        assert_eq!(sub.try_recv(), Err(TryRecvError::Closed));
    }

    /// Тест проверяет, что удаление устаревшего топика не трогает новый,
    /// созданный на его месте.
    #[test]
    fn test_remove_topic_only_removes_same_instance() {
        let broker: Broker<u8> = Broker::new();
        let first = broker.subscribe("swap").unwrap();
        let stale = broker.topic_handle("swap").unwrap();
        first.unsubscribe();

        let _second = broker.subscribe("swap").unwrap();
        let fresh = broker.topic_handle("swap").unwrap();
        assert!(!Arc::ptr_eq(&stale, &fresh));

        broker.shared.remove_topic("swap", &stale);
        assert_eq!(broker.topic_count(), 1);

        broker.shared.remove_topic("swap", &fresh);
        assert_eq!(broker.topic_count(), 0);
    }

    /// Тест проверяет, что подписка на закрытый, но ещё не снятый с
    /// реестра топик создаёт новый топик.
    #[test]
    fn test_subscribe_replaces_closed_topic() {
        let broker: Broker<u8> = Broker::new();
        let sub = broker.subscribe("race").unwrap();
        let stale = broker.topic_handle("race").unwrap();

        // Имитируем окно между закрытием топика и удалением из реестра.
        stale.detach(sub.id());
        assert!(stale.is_closed());
        assert_eq!(broker.topic_count(), 1);

        let mut fresh = broker.subscribe("race").unwrap();
        let current = broker.topic_handle("race").unwrap();
        assert!(!Arc::ptr_eq(&stale, &current));

        broker.publish("race", 3).unwrap();
        assert_eq!(fresh.try_recv(), Ok(3));
    }

    /// Тест проверяет, что отписка после уничтожения брокера не паникует.
    #[test]
    fn test_unsubscribe_after_broker_dropped() {
        let broker: Broker<u8> = Broker::new();
        let sub = broker.subscribe("orphan").unwrap();
        drop(broker);

        assert!(sub.unsubscribe());
        assert!(sub.is_closed());
    }

    /// Тест проверяет, что нулевая ёмкость поднимается до 1.
    #[test]
    fn test_zero_capacity_is_clamped() {
        let broker: Broker<u8> =
            Broker::with_config(BrokerConfig::default().with_mailbox_capacity(0));
        assert_eq!(broker.config().mailbox_capacity, 1);

        let sub = broker.subscribe("tiny").unwrap();
        assert_eq!(sub.capacity(), 1);
    }

    /// Тест проверяет, что режим очереди вне рантайма возвращает ошибку,
    /// а не паникует.
    #[test]
    fn test_queued_mode_without_runtime() {
        let broker: Broker<u8> =
            Broker::with_config(BrokerConfig::default().with_delivery(DeliveryMode::Queued));
        let err = broker.subscribe("q").unwrap_err();
        assert_eq!(err, BrokerError::NoRuntime);
        assert_eq!(broker.topic_count(), 0);
    }

    /// Тест проверяет доставку через фоновый распределитель и его
    /// остановку при снятии топика.
    #[tokio::test]
    async fn test_queued_mode_round_trip() {
        let broker =
            Broker::with_config(BrokerConfig::default().with_delivery(DeliveryMode::Queued));
        let mut sub = broker.subscribe("q").unwrap();
        let topic = broker.topic_handle("q").unwrap();
        assert!(topic.stats().queued);

        for i in 0..3u32 {
            assert_eq!(broker.publish("q", i), Ok(1));
        }
        for i in 0..3u32 {
            let got = timeout(Duration::from_millis(200), sub.recv())
                .await
                .expect("timed out");
            assert_eq!(got, Ok(i));
        }

        sub.unsubscribe();
        assert_eq!(broker.topic_count(), 0);
        timeout(Duration::from_secs(1), async {
            while topic.distributor_running() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("distributor did not stop");
    }

    #[test]
    fn test_clones_share_registry() {
        let broker: Broker<u8> = Broker::default();
        let clone = broker.clone();
        let mut sub = broker.subscribe("shared").unwrap();

        clone.publish("shared", 5).unwrap();
        assert_eq!(sub.try_recv(), Ok(5));
        assert_eq!(clone.subscriber_count("shared"), 1);
    }
}
