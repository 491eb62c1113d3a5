//! Backup status notifications

mod models;
mod service;
mod transport;

pub use models::{Attachment, DeliveryOutcome, MailMessage};
pub use service::Notifier;
pub use transport::{HttpMailTransport, LogOnlyTransport, MailTransport};
