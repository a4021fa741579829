use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::watch;

use super::mailbox::MailboxReceiver;
use crate::{RecvError, TryRecvError};

/// Идентификатор подписчика, уникальный в пределах брокера.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u64);

type DisposeFn = Box<dyn FnOnce() + Send + 'static>;

/// Одноразовая функция отписки.
///
/// Дешёво клонируется: все клоны разделяют одно состояние, поэтому
/// отписку можно выполнить из любой задачи. Только первый вызов
/// [`Unsubscriber::unsubscribe`] что-то делает, остальные ничего не
/// меняют.
#[derive(Clone)]
pub struct Unsubscriber {
    inner: Arc<DisposeState>,
}

struct DisposeState {
    action: Mutex<Option<DisposeFn>>,
    done: watch::Sender<bool>,
}

/// Подписка на топик.
///
/// Владеет читающей стороной своего почтового ящика и функцией отписки.
/// Отписка только явная: `Drop` подписку из топика НЕ удаляет, ящик
/// остаётся зарегистрированным до вызова [`Subscription::unsubscribe`].
pub struct Subscription<M> {
    label: Arc<str>,
    id: SubscriberId,
    mailbox: MailboxReceiver<M>,
    unsubscriber: Unsubscriber,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Unsubscriber {
    pub(crate) fn new<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (done, _) = watch::channel(false);
        Self {
            inner: Arc::new(DisposeState {
                action: Mutex::new(Some(Box::new(action))),
                done,
            }),
        }
    }

    /// Удаляет подписку из топика и закрывает её почтовый ящик.
    ///
    /// # Возвращает
    /// - `true`, если отписку выполнил именно этот вызов
    /// - `false`, если подписка уже была удалена ранее
    ///
    /// Конкурентный вызов ждёт, пока первый не завершит отписку, так что
    /// после возврата ящик всегда закрыт.
    pub fn unsubscribe(&self) -> bool {
        // Блокировка держится до отметки `done`.
        let mut slot = self.inner.action.lock();
        let Some(action) = slot.take() else {
            return false;
        };
        action();
        self.inner.done.send_replace(true);
        true
    }

    /// Проверяет, была ли выполнена отписка.
    pub fn is_disposed(&self) -> bool {
        *self.inner.done.borrow()
    }

    /// Ожидает завершения отписки.
    pub async fn disposed(&self) {
        let mut rx = self.inner.done.subscribe();
        // Отправитель живёт в `self`, поэтому ошибки закрытия здесь нет.
        let _ = rx.wait_for(|done| *done).await;
    }
}

impl<M> Subscription<M> {
    pub(crate) fn new(
        label: Arc<str>,
        id: SubscriberId,
        mailbox: MailboxReceiver<M>,
        unsubscriber: Unsubscriber,
    ) -> Self {
        Self {
            label,
            id,
            mailbox,
            unsubscriber,
        }
    }

    /// Асинхронно ожидает следующее сообщение.
    ///
    /// # Возвращает
    /// - `Ok(M)` при успешном получении сообщения
    /// - `Err(RecvError::Closed)` после отписки, когда ящик опустошён
    pub async fn recv(&mut self) -> Result<M, RecvError> {
        self.mailbox.recv().await
    }

    /// Пытается получить сообщение без ожидания.
    ///
    /// # Возвращает
    /// - `Ok(M)` если сообщение доступно немедленно
    /// - `Err(TryRecvError::Empty)` если сообщений нет
    /// - `Err(TryRecvError::Closed)` если подписка удалена
    pub fn try_recv(&mut self) -> Result<M, TryRecvError> {
        self.mailbox.try_recv()
    }

    /// Блокирующее получение для синхронных потребителей.
    pub fn recv_blocking(&mut self) -> Result<M, RecvError> {
        self.mailbox.recv_blocking()
    }

    /// Явно отписаться. Повторные вызовы ничего не делают.
    pub fn unsubscribe(&self) -> bool {
        self.unsubscriber.unsubscribe()
    }

    /// Возвращает клон функции отписки.
    pub fn unsubscriber(&self) -> Unsubscriber {
        self.unsubscriber.clone()
    }

    /// Ожидает, пока подписка не будет удалена (из любой задачи).
    pub async fn disposed(&self) {
        self.unsubscriber.disposed().await
    }

    /// Разделяет подписку на читающую сторону и функцию отписки.
    pub fn into_parts(self) -> (MailboxReceiver<M>, Unsubscriber) {
        (self.mailbox, self.unsubscriber)
    }

    pub fn label(&self) -> &Arc<str> {
        &self.label
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Проверяет, закрыт ли почтовый ящик.
    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }

    /// Количество сообщений в очереди на получение.
    pub fn len(&self) -> usize {
        self.mailbox.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mailbox.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.mailbox.capacity()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие трейты
////////////////////////////////////////////////////////////////////////////////

impl fmt::Display for SubscriberId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

impl fmt::Debug for Unsubscriber {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Unsubscriber")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl<M> fmt::Debug for Subscription<M> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("label", &self.label)
            .field("id", &self.id)
            .field("mailbox", &self.mailbox)
            .field("disposed", &self.unsubscriber.is_disposed())
            .finish()
    }
}
