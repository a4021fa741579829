//! Подсистема Publish–Subscribe (pub/sub).
//!
//! Внутрипроцессное вещание сообщений по меткам:
//!
//! - `broker`: реестр `метка → топик`, подписка и публикация.
//! - `distributor` (приватный): фоновая рассылка для режима очереди.
//! - `mailbox`: ограниченный почтовый ящик подписчика.
//! - `subscription`: подписка и одноразовая функция отписки.
//! - `topic` (приватный): состав подписчиков и политика доставки.
//!
//! Публичный API переэкспортирует:
//! - `broker::*`
//! - `mailbox::*`
//! - `subscription::*`
//! - `topic::TopicStats`

pub mod broker;
mod distributor;
pub mod mailbox;
pub mod subscription;
mod topic;

pub use broker::*;
pub use distributor::DEFAULT_QUEUE_CAPACITY;
pub use mailbox::*;
pub use subscription::*;
pub use topic::TopicStats;
