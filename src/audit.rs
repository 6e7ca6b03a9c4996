//! Append-only JSON-lines log of donation lifecycle events.
use crate::model::DonationEvent;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    // serializes appends so lines never interleave
    file: Mutex<fs::File>,
}

impl AuditLog {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("failed to open audit log {}", path.display()))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    #[instrument(skip_all, fields(event = event.event.as_str(), donation_id = %event.donation_id))]
    pub async fn record(&self, event: &DonationEvent) -> Result<()> {
        let mut line = serde_json::to_vec(event).context("failed to encode audit event")?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line)
            .await
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        file.flush().await?;
        debug!("audit event recorded");
        Ok(())
    }
}

/// Parse every line of an audit log. Blank lines are skipped.
pub async fn read_all(path: impl AsRef<Path>) -> Result<Vec<DonationEvent>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read audit log {}", path.display()))?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .map(|(i, l)| {
            serde_json::from_str(l).with_context(|| format!("audit log line {} is invalid", i + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DonationStage;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn appends_one_line_per_event_in_order() {
        let td = tempdir().unwrap();
        let path = td.path().join("logs").join("audit.log");
        let log = AuditLog::open(&path).await.unwrap();

        let mut created = DonationEvent::new(DonationStage::DonationCreated, "don-1");
        created.user_id = Some("u-9".into());
        created.amount_cents = Some(2500);
        created.currency = Some("USD".into());
        log.record(&created).await.unwrap();

        let mut paid = DonationEvent::new(DonationStage::PaymentSucceeded, "don-1");
        paid.details = json!({"provider": "mock", "reference": "pi_123"});
        log.record(&paid).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 2);
        for line in raw.lines() {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }

        let events = read_all(&path).await.unwrap();
        assert_eq!(events, vec![created, paid]);
    }

    #[tokio::test]
    async fn reopen_appends() {
        let td = tempdir().unwrap();
        let path = td.path().join("audit.log");
        {
            let log = AuditLog::open(&path).await.unwrap();
            log.record(&DonationEvent::new(DonationStage::PaymentInitiated, "d"))
                .await
                .unwrap();
        }
        let log = AuditLog::open(&path).await.unwrap();
        log.record(&DonationEvent::new(DonationStage::PaymentFailed, "d"))
            .await
            .unwrap();
        let events = read_all(&path).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event, DonationStage::PaymentFailed);
    }

    #[tokio::test]
    async fn concurrent_writers_do_not_interleave() {
        let td = tempdir().unwrap();
        let path = td.path().join("audit.log");
        let log = Arc::new(AuditLog::open(&path).await.unwrap());
        let mut handles = Vec::new();
        for i in 0..20 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                let ev = DonationEvent::new(DonationStage::DonationRefunded, format!("don-{i}"));
                log.record(&ev).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(read_all(&path).await.unwrap().len(), 20);
    }
}
