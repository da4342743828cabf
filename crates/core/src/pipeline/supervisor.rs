use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use thiserror::Error;

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::capture::domain::capture_error::CaptureError;
use crate::capture::domain::frame_source::FrameSource;
use crate::detection::domain::region_detector::DetectorLoader;
use crate::pipeline::annotator::Annotator;
use crate::pipeline::cancellation::CancellationToken;
use crate::pipeline::capture_loop::{CaptureLoop, CaptureReport};
use crate::pipeline::pipeline_config::PipelineConfig;
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::pipeline::state_holder::StateHolder;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

/// Final counters once every pipeline thread has stopped.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub capture: CaptureReport,
    /// Documents the annotator published to the state holder.
    pub published: usize,
    pub fatal_errors: Vec<String>,
}

/// Wires the capture loop, the annotator and the error listener together
/// and starts each on its own named thread.
pub struct Supervisor {
    config: PipelineConfig,
    source: Box<dyn FrameSource>,
    loader: Box<dyn DetectorLoader>,
    drawer: Box<dyn FrameAnnotator>,
    logger: Box<dyn PipelineLogger>,
}

impl Supervisor {
    pub fn new(
        config: PipelineConfig,
        source: Box<dyn FrameSource>,
        loader: Box<dyn DetectorLoader>,
        drawer: Box<dyn FrameAnnotator>,
    ) -> Self {
        Self {
            config,
            source,
            loader,
            drawer,
            logger: Box::new(NullPipelineLogger),
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Starts the pipeline. Documents are published to `state`.
    ///
    /// A fatal capture error is logged by the listener thread, which then
    /// cancels the whole pipeline.
    pub fn start(self, state: Arc<StateHolder>) -> Result<PipelineHandle, PipelineError> {
        let cancel = CancellationToken::new();
        let (doc_tx, doc_rx) = crossbeam_channel::bounded(self.config.channel_capacity);
        let (err_tx, err_rx) = crossbeam_channel::bounded(1);

        let capture = CaptureLoop::new(self.source, self.loader, self.config)
            .with_logger(self.logger);
        let cycles = capture.cycle_counter();
        let annotator = Annotator::new(self.drawer, state);

        let listener = spawn_named("pipeline-supervisor", &cancel, {
            let cancel = cancel.clone();
            move || listen_for_errors(err_rx, &cancel)
        })?;

        let annotator = spawn_named("annotator", &cancel, {
            let cancel = cancel.clone();
            move || annotator.run(doc_rx, &cancel)
        })?;

        let capture = spawn_named("capture-loop", &cancel, {
            let cancel = cancel.clone();
            move || capture.run(&cancel, doc_tx, err_tx)
        })?;

        log::info!("Pipeline started");
        Ok(PipelineHandle {
            cancel,
            cycles,
            capture,
            annotator,
            listener,
        })
    }
}

fn spawn_named<T, F>(
    name: &'static str,
    cancel: &CancellationToken,
    body: F,
) -> Result<JoinHandle<T>, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|source| {
            // Threads already running observe this and exit.
            cancel.cancel();
            PipelineError::Spawn { name, source }
        })
}

/// Waits for fatal capture errors. Exits when the capture loop drops its
/// sender or the pipeline is cancelled.
fn listen_for_errors(errors: Receiver<CaptureError>, cancel: &CancellationToken) -> Vec<String> {
    let mut seen = Vec::new();
    loop {
        let received = crossbeam_channel::select! {
            recv(errors) -> msg => msg.ok(),
            recv(cancel.signal()) -> _ => None,
        };
        let Some(error) = received else {
            break;
        };
        log::error!("Capture stopped: {error}");
        seen.push(error.to_string());
        cancel.cancel();
    }
    // An error sent just before cancellation must not be lost.
    seen.extend(errors.try_iter().map(|e| {
        log::error!("Capture stopped: {e}");
        e.to_string()
    }));
    seen
}

/// Running pipeline. Dropping the handle detaches the threads.
pub struct PipelineHandle {
    cancel: CancellationToken,
    cycles: Arc<AtomicUsize>,
    capture: JoinHandle<CaptureReport>,
    annotator: JoinHandle<usize>,
    listener: JoinHandle<Vec<String>>,
}

impl PipelineHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Documents delivered to the annotator so far.
    pub fn cycles(&self) -> usize {
        self.cycles.load(Ordering::SeqCst)
    }

    /// True once the capture loop has exited, e.g. after a fatal error.
    pub fn is_finished(&self) -> bool {
        self.capture.is_finished()
    }

    /// Waits for every thread to stop. Does not cancel by itself.
    pub fn join(self) -> Result<PipelineReport, PipelineError> {
        let capture = self
            .capture
            .join()
            .map_err(|_| PipelineError::ThreadPanicked("capture-loop"))?;
        let published = self
            .annotator
            .join()
            .map_err(|_| PipelineError::ThreadPanicked("annotator"))?;
        // The error sender went away with the capture loop.
        let fatal_errors = self
            .listener
            .join()
            .map_err(|_| PipelineError::ThreadPanicked("pipeline-supervisor"))?;

        log::info!(
            "Pipeline stopped after {} cycles ({} published)",
            capture.cycles,
            published
        );
        Ok(PipelineReport {
            capture,
            published,
            fatal_errors,
        })
    }
}
