pub mod align;
pub mod clock;
pub mod filter;
pub mod fusion;
pub mod pipeline;
pub mod samplelog;
pub mod types;

use airmouse_input::PointerSink;
use anyhow::Result;
use pipeline::{Pipeline, PipelineStats};
use tokio::sync::{mpsc, watch};
use types::{Orientation, Sample};

/// Commands sent to the tracker task.
enum TrackerCommand {
    Reset,
}

/// Totals reported once the sample stream has ended.
#[derive(Debug, Clone, Copy)]
pub struct TrackerSummary {
    pub processed: u64,
    pub dropped: u64,
    pub pointer_events: u64,
    /// Sum of every emitted pointer delta.
    pub pointer_total: (i64, i64),
    pub final_orientation: Orientation,
}

/// Handle to the background tracking task.
///
/// The task consumes samples from a channel, runs them through the
/// [`Pipeline`], publishes the latest orientation and forwards pointer motion
/// to the sink. It ends when the sample sender is dropped.
pub struct TrackerClient {
    orientation_rx: watch::Receiver<Orientation>,
    command_tx: mpsc::UnboundedSender<TrackerCommand>,
    task: tokio::task::JoinHandle<TrackerSummary>,
}

impl TrackerClient {
    /// Start tracking. Must be called inside a tokio runtime.
    pub fn spawn(
        pipeline: Pipeline,
        samples: mpsc::Receiver<Sample>,
        sink: Box<dyn PointerSink>,
    ) -> Self {
        let (orientation_tx, orientation_rx) = watch::channel(Orientation::default());
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(tracker_loop(
            pipeline,
            samples,
            sink,
            orientation_tx,
            command_rx,
        ));

        Self {
            orientation_rx,
            command_tx,
            task,
        }
    }

    /// Latest published orientation (non-blocking).
    pub fn orientation(&self) -> Orientation {
        *self.orientation_rx.borrow()
    }

    /// Receiver notified on every orientation update.
    pub fn subscribe(&self) -> watch::Receiver<Orientation> {
        self.orientation_rx.clone()
    }

    /// Drop all filter state; the next usable sample re-initialises from gravity.
    pub fn reset(&self) {
        let _ = self.command_tx.send(TrackerCommand::Reset);
    }

    /// Wait for the sample stream to end and return the totals.
    pub async fn finish(self) -> Result<TrackerSummary> {
        Ok(self.task.await?)
    }
}

/// Background task: pull samples, run the pipeline, publish orientation, emit pointer motion.
async fn tracker_loop(
    mut pipeline: Pipeline,
    mut samples: mpsc::Receiver<Sample>,
    mut sink: Box<dyn PointerSink>,
    orientation_tx: watch::Sender<Orientation>,
    mut command_rx: mpsc::UnboundedReceiver<TrackerCommand>,
) -> TrackerSummary {
    let mut pointer_events: u64 = 0;
    let mut pointer_total: (i64, i64) = (0, 0);
    let mut sample_count: u64 = 0;

    loop {
        tokio::select! {
            // Apply pending commands before the next sample.
            biased;
            Some(cmd) = command_rx.recv() => {
                match cmd {
                    TrackerCommand::Reset => {
                        pipeline.reset();
                        orientation_tx.send_replace(Orientation::default());
                    }
                }
            }
            sample = samples.recv() => {
                let Some(sample) = sample else {
                    tracing::info!(sample_count, "Sample stream closed");
                    break;
                };
                sample_count += 1;

                let output = pipeline.process(&sample);
                if let Some(q) = output.orientation {
                    orientation_tx.send_replace(Orientation::from_unit(&q, sample_count));
                }
                if let Some(delta) = output.pointer.filter(|d| !d.is_zero()) {
                    match sink.emit(delta) {
                        Ok(()) => {
                            pointer_events += 1;
                            pointer_total.0 += i64::from(delta.dx);
                            pointer_total.1 += i64::from(delta.dy);
                        }
                        Err(e) => tracing::warn!(?e, "Pointer sink rejected motion"),
                    }
                }

                if sample_count % 1000 == 0 {
                    tracing::debug!(sample_count, "IMU samples processed");
                }
            }
        }
    }

    let PipelineStats { processed, dropped } = pipeline.stats();
    TrackerSummary {
        processed,
        dropped,
        pointer_events,
        pointer_total,
        final_orientation: *orientation_tx.borrow(),
    }
}
