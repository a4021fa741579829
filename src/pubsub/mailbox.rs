//! Почтовый ящик подписчика.
//!
//! Ограниченная FIFO-очередь поверх [`async_channel::bounded`] с одним
//! потребителем:
//!
//! - отправка никогда не блокирует: если ящик заполнен или закрыт,
//!   сообщение отбрасывается и вызывающий получает [`SendOutcome`];
//! - получение ожидает следующее сообщение либо сообщает о закрытии, как
//!   только ящик закрыт и опустошён;
//! - ёмкость фиксируется при создании и никогда не меняется.

use std::{
    fmt,
    pin::Pin,
    task::{Context, Poll},
};

use async_channel::TrySendError;
use futures::Stream;

use crate::{RecvError, TryRecvError};

/// Ёмкость почтового ящика по умолчанию.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 10;

/// Результат неблокирующей отправки в почтовый ящик.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Сообщение помещено в очередь.
    Delivered,
    /// Ящик заполнен, сообщение отброшено.
    Full,
    /// Ящик уже закрыт, сообщение отброшено.
    Closed,
}

/// Пишущая сторона почтового ящика. Принадлежит топику.
pub struct MailboxSender<M> {
    inner: async_channel::Sender<M>,
}

/// Читающая сторона почтового ящика. Принадлежит подписке.
///
/// Реализует [`Stream`]: поток заканчивается после закрытия ящика и
/// выдачи всех оставшихся сообщений.
pub struct MailboxReceiver<M> {
    inner: Pin<Box<async_channel::Receiver<M>>>,
}

/// Создаёт почтовый ящик заданной ёмкости.
///
/// Нулевая ёмкость поднимается до 1: канал без буфера не может
/// принять ни одного сообщения без ожидания читателя.
pub fn mailbox<M>(capacity: usize) -> (MailboxSender<M>, MailboxReceiver<M>) {
    let (tx, rx) = async_channel::bounded(capacity.max(1));
    (
        MailboxSender { inner: tx },
        MailboxReceiver {
            inner: Box::pin(rx),
        },
    )
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<M> MailboxSender<M> {
    /// Неблокирующая отправка.
    ///
    /// Переполнение и закрытие не являются ошибками: сообщение просто
    /// отбрасывается, а результат сообщает, что произошло.
    pub fn send(
        &self,
        msg: M,
    ) -> SendOutcome {
        match self.inner.try_send(msg) {
            Ok(()) => SendOutcome::Delivered,
            Err(TrySendError::Full(_)) => SendOutcome::Full,
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Закрывает ящик. Возвращает `true`, если закрыл именно этот вызов.
    ///
    /// Уже поставленные в очередь сообщения остаются доступны читателю.
    pub fn close(&self) -> bool {
        self.inner.close()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity().unwrap_or(usize::MAX)
    }
}

impl<M> MailboxReceiver<M> {
    /// Асинхронно ожидает следующее сообщение.
    ///
    /// # Возвращает
    /// - `Ok(M)` при получении сообщения
    /// - `Err(RecvError::Closed)` если ящик закрыт и пуст
    pub async fn recv(&mut self) -> Result<M, RecvError> {
        self.inner.recv().await.map_err(Into::into)
    }

    /// Пытается получить сообщение без ожидания.
    pub fn try_recv(&mut self) -> Result<M, TryRecvError> {
        self.inner.try_recv().map_err(Into::into)
    }

    /// Блокирует текущий поток до получения сообщения или закрытия.
    ///
    /// Не вызывайте из асинхронного контекста.
    pub fn recv_blocking(&mut self) -> Result<M, RecvError> {
        self.inner.recv_blocking().map_err(Into::into)
    }

    /// Закрывает ящик со стороны читателя.
    pub fn close(&self) -> bool {
        self.inner.close()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Количество сообщений, ожидающих получения.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity().unwrap_or(usize::MAX)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие трейты
////////////////////////////////////////////////////////////////////////////////

impl<M> Clone for MailboxSender<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<M> fmt::Debug for MailboxSender<M> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("MailboxSender")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<M> fmt::Debug for MailboxReceiver<M> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("MailboxReceiver")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<M> Stream for MailboxReceiver<M> {
    type Item = M;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<M>> {
        self.inner.as_mut().poll_next(cx)
    }
}
