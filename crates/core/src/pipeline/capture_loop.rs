use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Sender;

use crate::capture::domain::capture_error::{CaptureError, ReadError};
use crate::capture::domain::frame_source::FrameSource;
use crate::detection::domain::region_detector::{DetectorLoader, RegionDetector};
use crate::pipeline::cancellation::CancellationToken;
use crate::pipeline::pipeline_config::PipelineConfig;
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::shared::document::Document;

/// Counters for one capture loop run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureReport {
    /// Documents handed to the annotator.
    pub cycles: usize,
    /// Frames skipped because the read or detection failed.
    pub transient_failures: usize,
}

/// Producer side of the pipeline: read a frame, detect regions, send one
/// document downstream, then sleep for the configured interval.
///
/// Only device and detector problems at startup are fatal; everything that
/// goes wrong with a single frame is logged and retried after one interval.
pub struct CaptureLoop {
    source: Box<dyn FrameSource>,
    loader: Box<dyn DetectorLoader>,
    config: PipelineConfig,
    logger: Box<dyn PipelineLogger>,
    cycles: Arc<AtomicUsize>,
}

impl CaptureLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        loader: Box<dyn DetectorLoader>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            loader,
            config,
            logger: Box::new(NullPipelineLogger),
            cycles: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Live count of delivered documents, updated after every handoff.
    pub fn cycle_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.cycles)
    }

    /// Runs until cancelled or until the receiving side hangs up.
    ///
    /// A startup failure is sent on `errors` exactly once and ends the run
    /// before any document is produced. Both senders are dropped on return.
    pub fn run(
        mut self,
        cancel: &CancellationToken,
        output: Sender<Document>,
        errors: Sender<CaptureError>,
    ) -> CaptureReport {
        let mut report = CaptureReport::default();

        let mut detector = match self.start() {
            Ok(detector) => detector,
            Err(e) => {
                // The listener may already be gone during shutdown.
                let _ = errors.send(e);
                return report;
            }
        };

        while !cancel.is_cancelled() {
            let frame = match self.source.read() {
                Ok(frame) if frame.is_empty() => Err(ReadError::EmptyFrame),
                other => other,
            };
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    report.transient_failures += 1;
                    self.logger.warn(&format!("Skipping frame: {e}"));
                    if cancel.sleep(self.config.interval) {
                        break;
                    }
                    continue;
                }
            };

            self.logger.cycle(report.cycles + 1, frame.sequence());

            let start = Instant::now();
            let regions = match detector.detect(&frame) {
                Ok(regions) => regions,
                Err(e) => {
                    report.transient_failures += 1;
                    self.logger
                        .warn(&format!("Detection failed on frame {}: {e}", frame.sequence()));
                    if cancel.sleep(self.config.interval) {
                        break;
                    }
                    continue;
                }
            };
            self.logger
                .timing("detect", start.elapsed().as_secs_f64() * 1000.0);
            self.logger.metric("regions", regions.len() as f64);
            self.logger.info(&format!("Found {} regions", regions.len()));

            let document = Document::capture(&frame, regions);

            let delivered = crossbeam_channel::select! {
                send(output, document) -> res => res.is_ok(),
                recv(cancel.signal()) -> _ => false,
            };
            if !delivered {
                break;
            }

            report.cycles += 1;
            self.cycles.store(report.cycles, Ordering::SeqCst);

            if cancel.sleep(self.config.interval) {
                break;
            }
        }

        self.source.close();
        self.logger.summary();
        report
    }

    fn start(&mut self) -> Result<Box<dyn RegionDetector>, CaptureError> {
        self.source.open(self.config.device_id)?;
        self.logger
            .info(&format!("Opened camera device {}", self.config.device_id));

        match self.loader.load(&self.config.detector_config) {
            Ok(detector) => {
                self.logger.info(&format!(
                    "Loaded detector from {}",
                    self.config.detector_config.display()
                ));
                Ok(detector)
            }
            Err(e) => {
                self.source.close();
                Err(CaptureError::DetectorLoad {
                    path: self.config.detector_config.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::frame::Frame;
    use crate::shared::region::Region;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    type ReadScript = VecDeque<Result<Frame, ReadError>>;

    struct ScriptedSource {
        script: ReadScript,
        next_sequence: u64,
        fail_open: bool,
        closed: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(script: ReadScript) -> Self {
            Self {
                script,
                next_sequence: 0,
                fail_open: false,
                closed: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn open(&mut self, device_id: u32) -> Result<(), CaptureError> {
            if self.fail_open {
                return Err(CaptureError::DeviceUnavailable {
                    device_id,
                    reason: "unplugged".into(),
                });
            }
            Ok(())
        }

        fn read(&mut self) -> Result<Frame, ReadError> {
            if let Some(next) = self.script.pop_front() {
                return next;
            }
            let seq = self.next_sequence;
            self.next_sequence += 1;
            Ok(Frame::new(vec![0u8; 8 * 6 * 3], 8, 6, 3, seq))
        }

        fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FixedDetector(Vec<Region>);

    impl RegionDetector for FixedDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
            Ok(self.0.clone())
        }
    }

    struct FlakyDetector {
        failures_left: usize,
    }

    impl RegionDetector for FlakyDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err("inference failed".into());
            }
            Ok(vec![Region::new(1, 1, 3, 3)])
        }
    }

    struct StubLoader {
        detector: Mutex<Option<Box<dyn RegionDetector>>>,
    }

    impl StubLoader {
        fn with(detector: impl RegionDetector + 'static) -> Self {
            Self {
                detector: Mutex::new(Some(Box::new(detector))),
            }
        }

        fn failing() -> Self {
            Self {
                detector: Mutex::new(None),
            }
        }
    }

    impl DetectorLoader for StubLoader {
        fn load(&self, path: &Path) -> Result<Box<dyn RegionDetector>, Box<dyn std::error::Error>> {
            self.detector
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| format!("cannot parse {}", path.display()).into())
        }
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig::new(0, "detector.onnx")
            .with_interval(Duration::from_millis(2))
            .unwrap()
    }

    /// Runs the loop on a thread, collects `count` documents, then cancels.
    fn collect(
        capture: CaptureLoop,
        count: usize,
    ) -> (Vec<Document>, CaptureReport, Vec<CaptureError>) {
        let cancel = CancellationToken::new();
        let (doc_tx, doc_rx) = crossbeam_channel::bounded(0);
        let (err_tx, err_rx) = crossbeam_channel::bounded(1);

        let worker = {
            let cancel = cancel.clone();
            thread::spawn(move || capture.run(&cancel, doc_tx, err_tx))
        };

        let docs: Vec<Document> = doc_rx.iter().take(count).collect();
        cancel.cancel();
        let report = worker.join().unwrap();
        let errors = err_rx.try_iter().collect();
        (docs, report, errors)
    }

    #[test]
    fn test_documents_carry_detector_output() {
        let regions = vec![Region::new(1, 1, 4, 4), Region::new(2, 2, 5, 5)];
        let capture = CaptureLoop::new(
            Box::new(ScriptedSource::new(VecDeque::new())),
            Box::new(StubLoader::with(FixedDetector(regions.clone()))),
            fast_config(),
        );

        let (docs, report, errors) = collect(capture, 3);
        assert_eq!(docs.len(), 3);
        for doc in &docs {
            assert_eq!(doc.items, regions);
            assert_eq!(doc.screen.width, 8);
            assert_eq!(doc.screen.height, 6);
        }
        assert!(errors.is_empty());
        assert!(report.cycles >= 3);
    }

    #[test]
    fn test_empty_frames_are_retried_without_error() {
        let script: ReadScript = vec![
            Ok(Frame::empty(100)),
            Err(ReadError::EmptyFrame),
            Err(ReadError::DeviceNotReady(0)),
        ]
        .into_iter()
        .collect();
        let interval = Duration::from_millis(20);
        let capture = CaptureLoop::new(
            Box::new(ScriptedSource::new(script)),
            Box::new(StubLoader::with(FixedDetector(Vec::new()))),
            PipelineConfig::new(0, "detector.onnx")
                .with_interval(interval)
                .unwrap(),
        );

        let start = Instant::now();
        let (docs, report, errors) = collect(capture, 1);
        // One interval of back-off after each of the three failures.
        assert!(start.elapsed() >= interval * 3);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].sequence(), 0);
        assert_eq!(report.transient_failures, 3);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_detection_failure_skips_frame() {
        let capture = CaptureLoop::new(
            Box::new(ScriptedSource::new(VecDeque::new())),
            Box::new(StubLoader::with(FlakyDetector { failures_left: 2 })),
            fast_config(),
        );

        let (docs, report, errors) = collect(capture, 1);
        assert_eq!(docs[0].sequence(), 2);
        assert_eq!(docs[0].items.len(), 1);
        assert_eq!(report.transient_failures, 2);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_detector_load_failure_reports_once() {
        let source = ScriptedSource::new(VecDeque::new());
        let closed = Arc::clone(&source.closed);
        let capture = CaptureLoop::new(Box::new(source), Box::new(StubLoader::failing()), fast_config());

        let (docs, report, errors) = collect(capture, 1);
        assert!(docs.is_empty());
        assert_eq!(report, CaptureReport::default());
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], CaptureError::DetectorLoad { .. }));
        assert!(errors[0].to_string().contains("detector.onnx"));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_device_open_failure_reports_once() {
        let mut source = ScriptedSource::new(VecDeque::new());
        source.fail_open = true;
        let capture = CaptureLoop::new(
            Box::new(source),
            Box::new(StubLoader::with(FixedDetector(Vec::new()))),
            fast_config(),
        );

        let (docs, _, errors) = collect(capture, 1);
        assert!(docs.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0],
            CaptureError::DeviceUnavailable { device_id: 0, .. }
        ));
    }

    #[test]
    fn test_sequences_strictly_increase() {
        let capture = CaptureLoop::new(
            Box::new(ScriptedSource::new(VecDeque::new())),
            Box::new(StubLoader::with(FixedDetector(Vec::new()))),
            fast_config(),
        );

        let (docs, _, _) = collect(capture, 5);
        assert!(docs.windows(2).all(|w| w[0].sequence() < w[1].sequence()));
    }

    #[test]
    fn test_cancel_while_blocked_on_send_terminates() {
        let source = ScriptedSource::new(VecDeque::new());
        let closed = Arc::clone(&source.closed);
        let capture = CaptureLoop::new(
            Box::new(source),
            Box::new(StubLoader::with(FixedDetector(Vec::new()))),
            fast_config(),
        );
        let cycles = capture.cycle_counter();

        let cancel = CancellationToken::new();
        // Receiver kept alive but never drained.
        let (doc_tx, _doc_rx) = crossbeam_channel::bounded(0);
        let (err_tx, _err_rx) = crossbeam_channel::bounded(1);
        let worker = {
            let cancel = cancel.clone();
            thread::spawn(move || capture.run(&cancel, doc_tx, err_tx))
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(cycles.load(Ordering::SeqCst), 0);

        cancel.cancel();
        let report = worker.join().unwrap();
        assert_eq!(report.cycles, 0);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_receiver_hangup_ends_loop() {
        let capture = CaptureLoop::new(
            Box::new(ScriptedSource::new(VecDeque::new())),
            Box::new(StubLoader::with(FixedDetector(Vec::new()))),
            fast_config(),
        );
        let cancel = CancellationToken::new();
        let (doc_tx, doc_rx) = crossbeam_channel::bounded::<Document>(0);
        let (err_tx, _err_rx) = crossbeam_channel::bounded(1);
        drop(doc_rx);

        let report = capture.run(&cancel, doc_tx, err_tx);
        assert_eq!(report.cycles, 0);
    }
}
