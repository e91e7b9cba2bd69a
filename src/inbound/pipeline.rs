//! Background sweep of the inbound object store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::parse::{parse_message, IngestError, InboundMail};
use super::store::{list_all, ObjectStore};
use crate::mail::{formulate_message, MailQueue};
use crate::MailError;

/// Default sweep interval in seconds (30 minutes).
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 1800;

/// Set while a pipeline loop is running in this process.
static PIPELINE_RUNNING: AtomicBool = AtomicBool::new(false);

/// Clears [`PIPELINE_RUNNING`] when the loop exits.
struct RunningGuard;

impl RunningGuard {
    fn acquire() -> Option<Self> {
        PIPELINE_RUNNING
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningGuard)
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        PIPELINE_RUNNING.store(false, Ordering::Release);
    }
}

/// Turns foreign mail into queued console mail.
///
/// Shared by the object store sweep and the inbound webhook.
#[derive(Debug, Clone)]
pub struct Ingestor {
    queue: MailQueue,
}

impl Ingestor {
    pub fn new(queue: MailQueue) -> Self {
        Self { queue }
    }

    /// Formulate `mail` for its console recipient and queue it.
    pub async fn deliver(&self, mail: InboundMail) -> Result<i64, IngestError> {
        let recipient = mail.recipient()?;

        match self.queue.recipient_exists(recipient).await {
            Ok(true) => {}
            Ok(false) => return Err(IngestError::UnknownRecipient(recipient)),
            Err(e) => return Err(IngestError::Enqueue(e)),
        }

        let sender = mail.from.clone();
        let data = tokio::task::spawn_blocking(move || {
            formulate_message(
                &mail.from,
                &mail.to,
                &mail.subject,
                &mail.body,
                mail.image.as_deref(),
            )
        })
        .await
        .map_err(|e| IngestError::Formulate(MailError::Image(e.to_string())))?
        .map_err(IngestError::Formulate)?;

        self.queue
            .enqueue(&sender, recipient, &data)
            .await
            .map_err(IngestError::Enqueue)
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Objects queued and removed from the store.
    pub queued: usize,
    /// Objects removed without queueing (no such console).
    pub discarded: usize,
    /// Objects left in the store for the next sweep.
    pub failed: usize,
}

/// Periodically drains the object store into the mail queue.
///
/// At most one pipeline loop runs per process; a second call to
/// [`InboundPipeline::run`] returns immediately.
pub struct InboundPipeline {
    store: Arc<dyn ObjectStore>,
    ingestor: Ingestor,
    sweep_interval: Duration,
}

impl InboundPipeline {
    /// Create a pipeline with the default 30 minute interval.
    pub fn new(store: Arc<dyn ObjectStore>, ingestor: Ingestor) -> Self {
        Self::with_interval(store, ingestor, DEFAULT_SWEEP_INTERVAL_SECS)
    }

    /// Create a pipeline with a custom interval.
    pub fn with_interval(store: Arc<dyn ObjectStore>, ingestor: Ingestor, interval_secs: u64) -> Self {
        Self {
            store,
            ingestor,
            sweep_interval: Duration::from_secs(interval_secs.max(1)),
        }
    }

    /// Run the pipeline loop on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Run the pipeline loop.
    ///
    /// The first sweep happens immediately, then once per interval.
    pub async fn run(&self) {
        let Some(_guard) = RunningGuard::acquire() else {
            warn!("Inbound pipeline already running, not starting another");
            return;
        };

        info!(
            "Inbound pipeline started (sweep interval: {} seconds)",
            self.sweep_interval.as_secs()
        );

        let mut timer = sweep_timer(self.sweep_interval);

        loop {
            timer.tick().await;
            let report = self.sweep().await;
            if report != SweepReport::default() {
                info!(
                    queued = report.queued,
                    discarded = report.discarded,
                    failed = report.failed,
                    "Inbound sweep finished"
                );
            }
        }
    }

    /// Process every object currently in the store.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let keys = match list_all(self.store.as_ref()).await {
            Ok(keys) => keys,
            Err(e) => {
                error!(error = %e, "Failed to list inbound objects");
                return report;
            }
        };

        if keys.is_empty() {
            debug!("No inbound mail");
            return report;
        }

        for key in keys {
            match self.process(&key).await {
                Ok(true) => report.queued += 1,
                Ok(false) => report.discarded += 1,
                Err(e) => {
                    error!(key = %key, error = %e, "Failed to ingest inbound mail");
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Returns `Ok(true)` when queued, `Ok(false)` when discarded.
    async fn process(&self, key: &str) -> Result<bool, ProcessError> {
        let raw = self.store.get(key).await.map_err(ProcessError::Store)?;
        let mail = parse_message(&raw).map_err(ProcessError::Ingest)?;

        let queued = match self.ingestor.deliver(mail).await {
            Ok(snowflake) => {
                debug!(key = %key, snowflake, "Inbound mail queued");
                true
            }
            Err(IngestError::UnknownRecipient(mlid)) => {
                warn!(key = %key, mlid, "Inbound mail for unknown console, discarding");
                false
            }
            Err(e) => return Err(ProcessError::Ingest(e)),
        };

        self.store.delete(key).await.map_err(ProcessError::Store)?;
        Ok(queued)
    }
}

/// Ticker for the sweep loop. A sweep that overruns the period pushes the
/// next one back rather than triggering catch-up sweeps.
fn sweep_timer(period: Duration) -> Interval {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

#[derive(Debug, thiserror::Error)]
enum ProcessError {
    #[error(transparent)]
    Store(MailError),
    #[error(transparent)]
    Ingest(IngestError),
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::db::{AccountRepository, Database, NewAccount};
    use crate::inbound::DirectoryStore;
    use crate::mail::{MailRepository, SnowflakeGenerator};
    use tempfile::TempDir;

    const MLID: i64 = 6382198605942757;

    struct Fixture {
        _temp: TempDir,
        db: Arc<Database>,
        store: Arc<DirectoryStore>,
        pipeline: InboundPipeline,
    }

    async fn setup() -> Fixture {
        let temp = TempDir::new().unwrap();
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        AccountRepository::new(db.pool())
            .create(&NewAccount::new(MLID, "pw", "chk"))
            .await
            .unwrap();

        let store = Arc::new(DirectoryStore::new(temp.path(), 2).unwrap());
        let queue = MailQueue::new(db.clone(), Arc::new(SnowflakeGenerator::new(1)));
        let pipeline = InboundPipeline::new(store.clone(), Ingestor::new(queue));

        Fixture {
            _temp: temp,
            db,
            store,
            pipeline,
        }
    }

    fn raw_mail(to: &str, body: &str) -> String {
        format!(
            "From: Alice <alice@example.com>\r\nTo: {to}\r\nSubject: Hi\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\r\n{body}\r\n"
        )
    }

    fn drop_object(fixture: &Fixture, key: &str, content: &str) {
        std::fs::write(fixture.store.root().join(key), content).unwrap();
    }

    #[tokio::test]
    async fn test_sweep_queues_and_deletes() {
        let fixture = setup().await;
        for i in 0..3 {
            drop_object(
                &fixture,
                &format!("{i}.eml"),
                &raw_mail("w6382198605942757@rc24.xyz", &format!("message {i}")),
            );
        }

        let report = fixture.pipeline.sweep().await;
        assert_eq!(report.queued, 3);
        assert_eq!(report.failed, 0);

        let pending = MailRepository::new(fixture.db.pool())
            .list_pending(MLID, 10)
            .await
            .unwrap();
        assert_eq!(pending.len(), 3);
        assert!(pending[0].data.contains("message 0"));
        assert!(pending[0].data.contains("Content-Description: wiimail"));
        assert_eq!(pending[0].sender, "alice@example.com");

        assert!(fixture.store.list(None).await.unwrap().keys.is_empty());
    }

    #[tokio::test]
    async fn test_bad_objects_are_kept_and_do_not_stop_the_sweep() {
        let fixture = setup().await;
        drop_object(&fixture, "a.eml", &raw_mail("not-a-console@rc24.xyz", "x"));
        drop_object(&fixture, "b.eml", "Subject: no addresses\r\n\r\nbody\r\n");
        drop_object(&fixture, "c.eml", &raw_mail("w6382198605942757@rc24.xyz", "ok"));

        let report = fixture.pipeline.sweep().await;
        assert_eq!(report.queued, 1);
        assert_eq!(report.failed, 2);

        let remaining = fixture.store.list(None).await.unwrap().keys;
        assert_eq!(remaining, vec!["a.eml", "b.eml"]);
    }

    #[tokio::test]
    async fn test_unknown_console_is_discarded() {
        let fixture = setup().await;
        drop_object(&fixture, "a.eml", &raw_mail("w1111111111111111@rc24.xyz", "x"));

        let report = fixture.pipeline.sweep().await;
        assert_eq!(report.discarded, 1);
        assert!(fixture.store.list(None).await.unwrap().keys.is_empty());
        assert_eq!(
            MailRepository::new(fixture.db.pool()).count_for(MLID).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_enqueue_rotates_mail_flag() {
        let fixture = setup().await;
        drop_object(&fixture, "a.eml", &raw_mail("w6382198605942757@rc24.xyz", "x"));

        fixture.pipeline.sweep().await;

        let account = AccountRepository::new(fixture.db.pool())
            .get_by_id(MLID)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.mail_flag.map(|f| f.len()), Some(22));
    }

    #[tokio::test]
    async fn test_sweep_timer_delays_after_overrun() {
        let timer = sweep_timer(Duration::from_secs(60));
        assert_eq!(timer.missed_tick_behavior(), MissedTickBehavior::Delay);
        assert_eq!(timer.period(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_failed_enqueue_is_retried_without_duplicates() {
        let fixture = setup().await;
        sqlx::raw_sql(
            "CREATE TRIGGER reject_flag BEFORE UPDATE ON accounts
             BEGIN SELECT RAISE(ABORT, 'flag write rejected'); END;",
        )
        .execute(fixture.db.pool())
        .await
        .unwrap();
        drop_object(&fixture, "a.eml", &raw_mail("w6382198605942757@rc24.xyz", "x"));

        for _ in 0..2 {
            let report = fixture.pipeline.sweep().await;
            assert_eq!(report.failed, 1);
            assert_eq!(report.queued, 0);
        }

        assert_eq!(
            MailRepository::new(fixture.db.pool()).count_for(MLID).await.unwrap(),
            0
        );
        assert_eq!(fixture.store.list(None).await.unwrap().keys, vec!["a.eml"]);

        sqlx::raw_sql("DROP TRIGGER reject_flag")
            .execute(fixture.db.pool())
            .await
            .unwrap();
        let report = fixture.pipeline.sweep().await;
        assert_eq!(report.queued, 1);
        assert_eq!(
            MailRepository::new(fixture.db.pool()).count_for(MLID).await.unwrap(),
            1
        );
    }
}
