//! Notification service composing backup status messages

use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::models::{Attachment, DeliveryOutcome, MailMessage};
use super::transport::MailTransport;
use crate::backup::{human_size, BackupRun};

const SUBJECT_PREFIX: &str = "[Workdesk]";

/// Sends backup status messages through the configured transport.
pub struct Notifier {
    transport: Arc<dyn MailTransport>,
    from: String,
    recipients: Vec<String>,
}

impl Notifier {
    pub fn new(transport: Arc<dyn MailTransport>, from: String, recipients: Vec<String>) -> Self {
        Self {
            transport,
            from,
            recipients,
        }
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Reports the outcome of a run. Successful runs carry every produced
    /// file as attachment, failed runs carry none.
    ///
    /// Delivery problems are returned, never raised.
    pub fn notify(&self, run: &BackupRun) -> DeliveryOutcome {
        let message = if run.success {
            self.success_message(run)
        } else {
            self.failure_message(run)
        };
        self.deliver(message)
    }

    /// Sends a minimal message to validate the transport configuration.
    pub fn send_probe(&self) -> DeliveryOutcome {
        let message = MailMessage {
            from: self.from.clone(),
            to: self.recipients.clone(),
            subject: format!("{} Mail transport probe", SUBJECT_PREFIX),
            body: format!(
                "This is a test message from the Workdesk backup service, sent at {}.\n\
                 If you received it, backup notifications are configured correctly.\n",
                chrono::Utc::now().to_rfc3339()
            ),
            attachments: Vec::new(),
        };
        self.deliver(message)
    }

    fn deliver(&self, message: MailMessage) -> DeliveryOutcome {
        if message.to.is_empty() {
            warn!("No notification recipients configured, skipping '{}'", message.subject);
            return DeliveryOutcome::failed("No recipients configured");
        }

        match self.transport.send(&message) {
            Ok(()) => {
                info!(
                    "Delivered '{}' to {} recipient(s) via {}",
                    message.subject,
                    message.to.len(),
                    self.transport.name()
                );
                DeliveryOutcome::delivered()
            }
            Err(e) => {
                error!("Failed to deliver '{}': {:#}", message.subject, e);
                DeliveryOutcome::failed(format!("{:#}", e))
            }
        }
    }

    fn success_message(&self, run: &BackupRun) -> MailMessage {
        let mut attachments = Vec::with_capacity(run.files.len());
        let mut unreadable = Vec::new();
        for file in &run.files {
            match std::fs::read(&file.path) {
                Ok(content) => attachments.push(Attachment {
                    file_name: file.name.clone(),
                    content_type: content_type_for(&file.name).to_string(),
                    content,
                }),
                Err(e) => {
                    warn!("Cannot attach {:?}: {}", file.path, e);
                    unreadable.push(file.name.clone());
                }
            }
        }

        MailMessage {
            from: self.from.clone(),
            to: self.recipients.clone(),
            subject: format!("{} Backup completed - {}", SUBJECT_PREFIX, run.timestamp),
            body: SuccessBody {
                run,
                unreadable: &unreadable,
            }
            .to_string(),
            attachments,
        }
    }

    fn failure_message(&self, run: &BackupRun) -> MailMessage {
        let error = run.error.as_deref().unwrap_or("unknown error");
        let body = format!(
            "Backup {} FAILED.\n\nError: {}\n\nNo backup files were produced by this run.\n",
            run.timestamp, error
        );
        MailMessage {
            from: self.from.clone(),
            to: self.recipients.clone(),
            subject: format!("{} Backup FAILED - {}", SUBJECT_PREFIX, run.timestamp),
            body,
            attachments: Vec::new(),
        }
    }
}

struct SuccessBody<'a> {
    run: &'a BackupRun,
    unreadable: &'a [String],
}

impl fmt::Display for SuccessBody<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let run = self.run;
        writeln!(f, "Backup {} completed.", run.timestamp)?;
        writeln!(f)?;
        writeln!(f, "Collections:")?;
        for (collection, export) in &run.per_collection {
            match (&export.error, export.record_count) {
                (None, Some(count)) => writeln!(f, "  - {}: {} records", collection, count)?,
                (Some(err), _) => writeln!(f, "  - {}: FAILED ({})", collection, err)?,
                (None, None) => writeln!(f, "  - {}: no data", collection)?,
            }
        }

        writeln!(f)?;
        writeln!(f, "Attached files:")?;
        for file in run.files.iter().filter(|f| !self.unreadable.contains(&f.name)) {
            writeln!(f, "  - {} ({})", file.name, human_size(file.size))?;
        }
        if !self.unreadable.is_empty() {
            writeln!(f)?;
            writeln!(f, "Could not attach: {}", self.unreadable.join(", "))?;
        }
        for warning in &run.warnings {
            writeln!(f, "Warning: {}", warning)?;
        }
        Ok(())
    }
}

fn content_type_for(file_name: &str) -> &'static str {
    if file_name.ends_with(".csv") {
        "text/csv"
    } else {
        "text/plain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::{BackupFile, CollectionExport};
    use crate::record_store::Collection;
    use anyhow::{anyhow, Result};
    use chrono::Utc;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<MailMessage>>,
        fail: bool,
    }

    impl MailTransport for RecordingTransport {
        fn send(&self, message: &MailMessage) -> Result<()> {
            if self.fail {
                return Err(anyhow!("SMTP credentials rejected"));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn successful_run(dir: &TempDir) -> BackupRun {
        let mut run = BackupRun::new("2024-05-01T06-00-00-000Z".to_string(), Utc::now());
        let path = dir.path().join("users_x.csv");
        std::fs::write(&path, "id\n1\n").unwrap();
        run.files.push(BackupFile {
            name: "users_x.csv".to_string(),
            path,
            collection: "users".to_string(),
            size: 5,
        });
        run.per_collection.insert(
            Collection::Users,
            CollectionExport {
                csv_text: "id\n1\n".to_string(),
                record_count: Some(1),
                error: None,
            },
        );
        run
    }

    fn notifier(transport: Arc<RecordingTransport>) -> Notifier {
        Notifier::new(
            transport,
            "backup@workdesk.local".to_string(),
            vec!["ops@example.com".to_string()],
        )
    }

    #[test]
    fn test_success_attaches_every_file() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let run = successful_run(&dir);

        let outcome = notifier(transport.clone()).notify(&run);

        assert_eq!(outcome, DeliveryOutcome::delivered());
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].subject.contains("Backup completed"));
        assert_eq!(sent[0].attachments.len(), 1);
        assert_eq!(sent[0].attachments[0].content_type, "text/csv");
        assert!(sent[0].body.contains("users: 1 records"));
    }

    #[test]
    fn test_failure_has_no_attachments() {
        let transport = Arc::new(RecordingTransport::default());
        let mut run = BackupRun::new("ts".to_string(), Utc::now());
        run.fail("Data layer unavailable: connection refused".to_string());

        let outcome = notifier(transport.clone()).notify(&run);

        assert!(outcome.delivered);
        let sent = transport.sent.lock().unwrap();
        assert!(sent[0].subject.contains("FAILED"));
        assert!(sent[0].body.contains("connection refused"));
        assert!(sent[0].attachments.is_empty());
    }

    #[test]
    fn test_delivery_failure_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let run = successful_run(&dir);

        let outcome = notifier(transport).notify(&run);

        assert!(!outcome.delivered);
        assert!(outcome.error.unwrap().contains("credentials rejected"));
        assert!(run.success);
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let run = successful_run(&dir);
        std::fs::remove_file(&run.files[0].path).unwrap();

        let outcome = notifier(transport.clone()).notify(&run);

        assert!(outcome.delivered);
        let sent = transport.sent.lock().unwrap();
        assert!(sent[0].attachments.is_empty());
        assert!(sent[0].body.contains("Could not attach: users_x.csv"));
    }

    #[test]
    fn test_probe_has_no_attachments() {
        let transport = Arc::new(RecordingTransport::default());
        let outcome = notifier(transport.clone()).send_probe();

        assert!(outcome.delivered);
        let sent = transport.sent.lock().unwrap();
        assert!(sent[0].subject.contains("probe"));
        assert!(sent[0].attachments.is_empty());
    }

    #[test]
    fn test_no_recipients() {
        let transport = Arc::new(RecordingTransport::default());
        let notifier = Notifier::new(transport.clone(), "a@b".to_string(), vec![]);

        let outcome = notifier.send_probe();

        assert!(!outcome.delivered);
        assert!(transport.sent.lock().unwrap().is_empty());
    }
}
