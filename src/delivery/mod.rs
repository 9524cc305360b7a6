use camino::Utf8Path;

use crate::domain::OfferRecord;
use crate::error::SourcingError;

pub mod enterprise;
pub mod ftp;
pub mod remote_copy;

pub use enterprise::EnterpriseNotifier;
pub use ftp::FtpChannel;
pub use remote_copy::{RemoteCopy, ScpChannel, SkipRemoteCopy};

/// A destination the finished output file is pushed to.
pub trait DeliveryChannel: Send + Sync {
    fn name(&self) -> &str;
    fn deliver(&self, path: &Utf8Path) -> Result<(), SourcingError>;
}

/// Receives the aggregated records once the output file exists. Failures are
/// logged by the caller and never undo the delivery.
pub trait Notifier: Send + Sync {
    fn notify(&self, records: &[OfferRecord]) -> Result<(), SourcingError>;
}

#[derive(Debug, Clone, Default)]
pub struct DeliveryOutcome {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl DeliveryOutcome {
    pub fn into_result(self) -> Result<Vec<String>, SourcingError> {
        if self.failed.is_empty() {
            return Ok(self.delivered);
        }
        let summary = self
            .failed
            .iter()
            .map(|(channel, reason)| format!("{channel} ({reason})"))
            .collect::<Vec<_>>()
            .join("; ");
        Err(SourcingError::Delivery(summary))
    }
}

/// Hands `path` to every channel in order. A failing channel does not stop
/// the ones after it.
pub fn deliver_all(channels: &[Box<dyn DeliveryChannel>], path: &Utf8Path) -> DeliveryOutcome {
    let mut outcome = DeliveryOutcome::default();
    for channel in channels {
        match channel.deliver(path) {
            Ok(()) => {
                tracing::info!(channel = channel.name(), file = %path, "delivered");
                outcome.delivered.push(channel.name().to_string());
            }
            Err(err) => {
                tracing::error!(channel = channel.name(), file = %path, error = %err, "delivery failed");
                outcome
                    .failed
                    .push((channel.name().to_string(), err.to_string()));
            }
        }
    }
    outcome
}

pub fn file_name(path: &Utf8Path) -> Result<&str, SourcingError> {
    path.file_name()
        .ok_or_else(|| SourcingError::Filesystem(format!("{path} has no file name")))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;

    use super::*;

    struct Recording {
        name: &'static str,
        fail: bool,
        seen: Mutex<Vec<String>>,
    }

    impl DeliveryChannel for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn deliver(&self, path: &Utf8Path) -> Result<(), SourcingError> {
            self.seen.lock().unwrap().push(path.to_string());
            if self.fail {
                Err(SourcingError::Transfer("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn channel(name: &'static str, fail: bool) -> Box<dyn DeliveryChannel> {
        Box::new(Recording {
            name,
            fail,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn failure_does_not_stop_later_channels() {
        let channels = vec![channel("ftp", true), channel("scp", false)];
        let outcome = deliver_all(&channels, Utf8Path::new("out/a_response.xlsx"));
        assert_eq!(outcome.delivered, vec!["scp".to_string()]);
        assert_eq!(outcome.failed.len(), 1);
        let err = outcome.into_result().unwrap_err();
        assert_matches!(err, SourcingError::Delivery(message) if message.starts_with("ftp ("));
    }

    #[test]
    fn all_succeeded() {
        let channels = vec![channel("ftp", false)];
        let outcome = deliver_all(&channels, Utf8Path::new("a.xlsx"));
        assert_eq!(outcome.into_result().unwrap(), vec!["ftp".to_string()]);
    }
}
