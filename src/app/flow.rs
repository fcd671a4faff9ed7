//! Per-flow pipeline: convert stage and upload scheduler.
//!
//! ```text
//! receiver --lines--> convert --events--> scheduler --batch--> upload task
//!                                             ^                    |
//!                                             +--- UploadOutcome --+
//! ```
//!
//! The scheduler owns the queue and, while idle, the destination. Starting an
//! upload moves the destination into the upload task and the outcome hands it
//! back, so a second upload cannot start before the first finishes.

use crate::buffer::{Batch, EventQueue};
use crate::domain::{EventError, LogEvent};
use crate::parser::{MessageTemplate, ParseError, RenderError, SyslogParser};
use crate::sender::{BatchDisposition, Destination};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Why a received line did not become an event.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    #[error("invalid event: {0}")]
    Event(#[from] EventError),
}

/// Counters for one flow, logged when the flow finishes.
#[derive(Debug, Default)]
pub struct FlowStats {
    pub received: AtomicU64,
    pub dropped: AtomicU64,
    pub evicted: AtomicU64,
    pub uploaded: AtomicU64,
    pub requeued: AtomicU64,
    pub discarded: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowStatsSnapshot {
    pub received: u64,
    pub dropped: u64,
    pub evicted: u64,
    pub uploaded: u64,
    pub requeued: u64,
    pub discarded: u64,
}

impl std::ops::AddAssign for FlowStatsSnapshot {
    fn add_assign(&mut self, other: Self) {
        self.received += other.received;
        self.dropped += other.dropped;
        self.evicted += other.evicted;
        self.uploaded += other.uploaded;
        self.requeued += other.requeued;
        self.discarded += other.discarded;
    }
}

impl FlowStats {
    fn add(counter: &AtomicU64, value: usize) {
        counter.fetch_add(value as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FlowStatsSnapshot {
        FlowStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            uploaded: self.uploaded.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Everything a flow needs once its receiver is listening.
pub struct Flow {
    pub name: String,
    pub parser: Box<dyn SyslogParser>,
    pub template: MessageTemplate,
    pub destination: Destination,
    pub upload_delay: Duration,
    pub queue_size: usize,
}

impl Flow {
    /// Spawns the convert stage and the scheduler on `tracker`.
    ///
    /// The returned stats are complete once the tracker has drained.
    pub fn spawn(self, lines: mpsc::UnboundedReceiver<String>, tracker: &TaskTracker) -> Arc<FlowStats> {
        let stats = Arc::new(FlowStats::default());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        info!(
            "flow {} -> {} (delay {:?}, queue {} bytes)",
            self.name, self.destination, self.upload_delay, self.queue_size
        );

        tracker.spawn(run_convert_stage(
            lines,
            events_tx,
            self.parser,
            self.template,
            stats.clone(),
        ));

        let scheduler = Scheduler::new(
            self.name,
            self.destination,
            EventQueue::new(self.queue_size),
            self.upload_delay,
            stats.clone(),
        );
        tracker.spawn(scheduler.run(events_rx));

        stats
    }
}

/// Turns one raw line into an event.
///
/// `buf` is reused between calls to avoid reallocating the rendered message.
pub fn convert_line(
    parser: &dyn SyslogParser,
    template: &MessageTemplate,
    buf: &mut String,
    raw: &str,
) -> Result<LogEvent, ConvertError> {
    let record = parser.parse(raw)?;
    template.render(&record, buf)?;
    Ok(LogEvent::try_new(buf.as_str(), record.timestamp_millis())?)
}

/// Parses, renders and validates lines until `lines` closes. Bad lines are
/// dropped. Dropping `events` on return signals exhaustion downstream.
pub async fn run_convert_stage(
    mut lines: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<LogEvent>,
    parser: Box<dyn SyslogParser>,
    template: MessageTemplate,
    stats: Arc<FlowStats>,
) {
    let mut buf = String::new();
    while let Some(raw) = lines.recv().await {
        FlowStats::add(&stats.received, 1);
        match convert_line(parser.as_ref(), &template, &mut buf, &raw) {
            Ok(event) => {
                if events.send(event).is_err() {
                    break;
                }
            }
            Err(e) => {
                FlowStats::add(&stats.dropped, 1);
                debug!("dropping line: {}", e);
            }
        }
    }
}

/// Result of one upload task.
#[derive(Debug)]
pub struct UploadOutcome {
    pub destination: Destination,
    pub batch: Batch,
    pub succeeded: bool,
    pub disposition: BatchDisposition,
}

/// Uploads one batch and applies the retry protocol to the result.
pub async fn upload_batch(mut destination: Destination, mut batch: Batch) -> UploadOutcome {
    let result = destination.upload(&mut batch).await;
    let succeeded = result.is_ok();
    let disposition = destination.handle_result(result).await;
    UploadOutcome {
        destination,
        batch,
        succeeded,
        disposition,
    }
}

async fn wait_upload(
    in_flight: &mut Option<JoinHandle<UploadOutcome>>,
) -> Result<UploadOutcome, JoinError> {
    match in_flight {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

/// The upload stage of one flow.
pub struct Scheduler {
    name: String,
    queue: EventQueue,
    destination: Option<Destination>,
    blueprint: Destination,
    in_flight: Option<JoinHandle<UploadOutcome>>,
    in_flight_len: usize,
    upload_delay: Duration,
    stats: Arc<FlowStats>,
}

impl Scheduler {
    pub fn new(
        name: impl Into<String>,
        destination: Destination,
        queue: EventQueue,
        upload_delay: Duration,
        stats: Arc<FlowStats>,
    ) -> Self {
        Self {
            name: name.into(),
            queue,
            blueprint: destination.without_token(),
            destination: Some(destination),
            in_flight: None,
            in_flight_len: 0,
            upload_delay,
            stats,
        }
    }

    /// Runs until `events` is closed, the queue is empty and no upload is in
    /// flight.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<LogEvent>) {
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.upload_delay, self.upload_delay);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!("{} timer set to {:?}", self.blueprint, self.upload_delay);

        let mut input_open = true;
        loop {
            tokio::select! {
                event = events.recv(), if input_open => match event {
                    Some(event) => self.enqueue(event),
                    None => {
                        debug!("{} input exhausted", self.blueprint);
                        input_open = false;
                    }
                },
                joined = wait_upload(&mut self.in_flight), if self.in_flight.is_some() => {
                    self.in_flight = None;
                    self.complete_upload(joined);
                },
                _ = ticker.tick() => {
                    debug!("{} tick", self.blueprint);
                    self.start_upload();
                },
            }

            if !input_open && self.queue.is_empty() && self.in_flight.is_none() {
                break;
            }
        }

        self.log_summary();
    }

    fn enqueue(&mut self, event: LogEvent) {
        let evicted = self.queue.add([event]);
        if evicted > 0 {
            FlowStats::add(&self.stats.evicted, evicted);
            warn!(
                "{} queue full ({} of {} bytes), dropped {} oldest events",
                self.blueprint,
                self.queue.size_bytes(),
                self.queue.max_bytes(),
                evicted
            );
        }
    }

    fn start_upload(&mut self) {
        if self.queue.is_empty() || self.in_flight.is_some() {
            return;
        }
        let Some(destination) = self.destination.take() else {
            return;
        };

        let batch = self.queue.get_batch();
        match batch.time_span() {
            Some((first, last)) => debug!(
                "{} sending {} messages ({}..{})",
                destination,
                batch.len(),
                first,
                last
            ),
            None => debug!("{} sending {} messages", destination, batch.len()),
        }
        self.in_flight_len = batch.len();
        self.in_flight = Some(tokio::spawn(upload_batch(destination, batch)));
    }

    fn complete_upload(&mut self, joined: Result<UploadOutcome, JoinError>) {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    "upload to {} aborted, dropping {} events: {}",
                    self.blueprint, self.in_flight_len, e
                );
                FlowStats::add(&self.stats.discarded, self.in_flight_len);
                self.destination = Some(self.blueprint.without_token());
                return;
            }
        };

        let len = outcome.batch.len();
        match outcome.disposition {
            BatchDisposition::Discard if outcome.succeeded => {
                FlowStats::add(&self.stats.uploaded, len);
            }
            BatchDisposition::Discard => {
                FlowStats::add(&self.stats.discarded, len);
            }
            BatchDisposition::Requeue => {
                FlowStats::add(&self.stats.requeued, len);
                let evicted = self.queue.requeue(outcome.batch);
                if evicted > 0 {
                    FlowStats::add(&self.stats.evicted, evicted);
                    warn!(
                        "{} queue full on requeue, dropped {} oldest events",
                        outcome.destination, evicted
                    );
                }
            }
        }
        self.destination = Some(outcome.destination);
    }

    fn log_summary(&self) {
        let stats = self.stats.snapshot();
        info!(
            "flow {} finished: received={} dropped={} evicted={} uploaded={} requeued={} discarded={}",
            self.name,
            stats.received,
            stats.dropped,
            stats.evicted,
            stats.uploaded,
            stats.requeued,
            stats.discarded
        );
    }
}
