use super::flow::{Flow, FlowStats};
use super::service::ServiceError;
use crate::collector::Receiver;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

/// Owns every receiver and tracks every flow task.
///
/// Shutdown closes the receivers, which closes each flow's input; the flows
/// then drain their queues and finish on their own.
pub struct Supervisor {
    receivers: Vec<Box<dyn Receiver>>,
    tracker: TaskTracker,
    stats: Vec<(String, Arc<FlowStats>)>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            receivers: Vec::new(),
            tracker: TaskTracker::new(),
            stats: Vec::new(),
        }
    }

    /// Starts listening and spawns the flow.
    ///
    /// The receiver is kept even when `listen` fails so that `close_all`
    /// releases whatever it did acquire.
    pub async fn start_flow(
        &mut self,
        mut receiver: Box<dyn Receiver>,
        flow: Flow,
    ) -> Result<(), ServiceError> {
        let listened = receiver.listen().await;
        let lines = receiver.receive();
        self.receivers.push(receiver);
        listened?;

        let lines = lines.ok_or_else(|| ServiceError::ReceiverUnavailable(flow.name.clone()))?;
        let name = flow.name.clone();
        let stats = flow.spawn(lines, &self.tracker);
        self.stats.push((name, stats));
        Ok(())
    }

    pub fn flow_count(&self) -> usize {
        self.stats.len()
    }

    pub fn close_all(&mut self) {
        info!("closing connections");
        for receiver in &mut self.receivers {
            receiver.close();
        }
    }

    /// Closes the receivers and waits for every flow to drain.
    pub async fn drain(&mut self) {
        self.close_all();
        self.tracker.close();
        debug!("waiting for upload to finish");
        self.tracker.wait().await;
    }

    /// Runs until `shutdown` is cancelled, then drains.
    pub async fn run(mut self, shutdown: CancellationToken) -> Vec<(String, Arc<FlowStats>)> {
        shutdown.cancelled().await;
        self.drain().await;
        self.stats
    }
}
