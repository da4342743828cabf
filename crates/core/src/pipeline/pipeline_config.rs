use std::path::PathBuf;
use std::time::Duration;

use crate::shared::constants::{DEFAULT_CAPTURE_INTERVAL, DEFAULT_CHANNEL_CAPACITY};

/// Configuration for one pipeline run.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    pub device_id: u32,
    pub detector_config: PathBuf,
    /// Fixed pause after every delivered document and after every transient failure.
    pub interval: Duration,
    /// Documents buffered between capture and annotation: 0 (rendezvous) or 1.
    pub channel_capacity: usize,
}

impl PipelineConfig {
    pub fn new(device_id: u32, detector_config: impl Into<PathBuf>) -> Self {
        Self {
            device_id,
            detector_config: detector_config.into(),
            interval: DEFAULT_CAPTURE_INTERVAL,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Result<Self, &'static str> {
        if interval.is_zero() {
            return Err("capture interval must be greater than zero");
        }
        self.interval = interval;
        Ok(self)
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Result<Self, &'static str> {
        if capacity > 1 {
            return Err("channel capacity must be 0 or 1");
        }
        self.channel_capacity = capacity;
        Ok(self)
    }
}
