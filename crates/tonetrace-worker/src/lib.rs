//! Background worker for tonetrace pipeline runs.
//!
//! A [`VectorizeWorker`] owns one pipeline run on a dedicated thread. The
//! caller hands over a [`WorkerRequest`] (pixels plus configuration) and
//! reads [`WorkerEvent`]s back: zero or more progress updates followed by
//! exactly one [`WorkerEvent::Finished`].
//!
//! Running the pipeline off the caller's thread keeps a UI or a CLI
//! progress display responsive. Dropping the handle cancels the run: the
//! event receiver goes away, the next progress send fails, and the
//! pipeline stops at that checkpoint.
//!
//! Requests and events derive serde so they can cross a process or
//! message-port boundary as JSON lines.

use std::io;
use std::ops::ControlFlow;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tonetrace_pipeline::diagnostics::SystemClock;
use tonetrace_pipeline::{
    Document, PipelineDiagnostics, PipelineError, Progress, RasterImage, VectorizeConfig,
    raster, vectorize_with_diagnostics,
};

/// Name given to every worker thread.
pub const THREAD_NAME: &str = "tonetrace-worker";

/// A single vectorization job.
///
/// Pixels travel as a flat RGBA8 buffer so the request serializes without
/// an image container format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    /// Caller-chosen counter echoed on every event, so a caller that
    /// restarts runs can discard events from stale ones.
    pub generation: u64,
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA8 pixels, already composited over white.
    pub pixels: Vec<u8>,
    pub config: VectorizeConfig,
}

impl WorkerRequest {
    /// Build a request from a decoded image.
    #[must_use]
    pub fn from_image(generation: u64, image: RasterImage, config: VectorizeConfig) -> Self {
        let (width, height) = image.dimensions();
        Self {
            generation,
            width,
            height,
            pixels: image.into_raw(),
            config,
        }
    }
}

/// The result of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorizeOutput {
    pub document: Document,
    pub diagnostics: PipelineDiagnostics,
}

/// Messages from the worker thread to its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkerEvent {
    Progress {
        generation: u64,
        progress: Progress,
    },
    /// Always the last event of a run that was not cancelled.
    Finished {
        generation: u64,
        result: Result<VectorizeOutput, PipelineError>,
    },
}

impl WorkerEvent {
    /// Generation of the request that produced this event.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        match self {
            Self::Progress { generation, .. } | Self::Finished { generation, .. } => *generation,
        }
    }

    /// Encode the event as a single JSON line (no trailing newline).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Errors surfaced by [`VectorizeWorker`].
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The OS refused to start the worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),

    /// The pipeline rejected the input or configuration.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The worker thread ended without reporting a result.
    #[error("worker thread exited without a result")]
    Disconnected,
}

/// How a worker thread ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    /// A [`WorkerEvent::Finished`] was produced, whether or not anyone
    /// was left to receive it.
    Finished,
    /// The owner went away and the pipeline stopped at a checkpoint.
    /// Carries the last progress percentage that was delivered.
    Cancelled { delivered: Option<u8> },
}

/// Handle to a running pipeline job.
///
/// Dropping the handle cancels the job at its next progress checkpoint.
#[derive(Debug)]
pub struct VectorizeWorker {
    generation: u64,
    events: Receiver<WorkerEvent>,
    thread: Option<JoinHandle<RunOutcome>>,
}

impl VectorizeWorker {
    /// Move `request` onto a new worker thread and start the run.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Spawn`] if the thread cannot be created.
    pub fn spawn(request: WorkerRequest) -> Result<Self, WorkerError> {
        let generation = request.generation;
        let (tx, events) = mpsc::channel();
        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_owned())
            .spawn(move || run(request, &tx))?;
        log::debug!("spawned worker for generation {generation}");
        Ok(Self {
            generation,
            events,
            thread: Some(thread),
        })
    }

    /// Generation of the request this worker is running.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Block for the next event. `None` once the worker has finished and
    /// every event has been read.
    pub fn recv(&self) -> Option<WorkerEvent> {
        self.events.recv().ok()
    }

    /// Blocking iterator over the remaining events.
    pub fn events(&self) -> impl Iterator<Item = WorkerEvent> + '_ {
        self.events.iter()
    }

    /// Drain events until the run finishes, passing each progress update
    /// to `on_progress`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Pipeline`] if the run failed and
    /// [`WorkerError::Disconnected`] if the thread ended without a result.
    pub fn wait(
        mut self,
        mut on_progress: impl FnMut(&Progress),
    ) -> Result<VectorizeOutput, WorkerError> {
        let mut outcome = None;
        for event in self.events.iter() {
            match event {
                WorkerEvent::Progress { progress, .. } => on_progress(&progress),
                WorkerEvent::Finished { result, .. } => {
                    outcome = Some(result);
                    break;
                }
            }
        }
        if let Some(handle) = self.thread.take() {
            match handle.join() {
                Ok(RunOutcome::Finished) => {}
                Ok(RunOutcome::Cancelled { delivered }) => log::warn!(
                    "generation {} stopped early, last progress {delivered:?}",
                    self.generation
                ),
                Err(_) => log::error!("worker thread for generation {} panicked", self.generation),
            }
        }
        outcome.ok_or(WorkerError::Disconnected)?.map_err(WorkerError::from)
    }
}

/// Body of the worker thread.
fn run(request: WorkerRequest, tx: &Sender<WorkerEvent>) -> RunOutcome {
    let generation = request.generation;
    let mut delivered = None;
    let result = raster::from_raw_rgba(request.width, request.height, request.pixels).and_then(
        |image| {
            let mut forward = |progress: Progress| {
                let percentage = progress.percentage;
                let event = WorkerEvent::Progress {
                    generation,
                    progress,
                };
                if tx.send(event).is_ok() {
                    delivered = Some(percentage);
                    ControlFlow::Continue(())
                } else {
                    ControlFlow::Break(())
                }
            };
            vectorize_with_diagnostics(&image, &request.config, &SystemClock, &mut forward)
        },
    );

    let result = match result {
        Err(PipelineError::Cancelled) => {
            log::debug!("generation {generation} cancelled");
            return RunOutcome::Cancelled { delivered };
        }
        other => other.map(|(document, diagnostics)| VectorizeOutput {
            document,
            diagnostics,
        }),
    };
    if tx.send(WorkerEvent::Finished { generation, result }).is_err() {
        log::debug!("generation {generation} finished after its owner went away");
    }
    RunOutcome::Finished
}
