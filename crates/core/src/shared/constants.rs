use std::time::Duration;

/// Port the JSON endpoint listens on unless overridden.
pub const DEFAULT_HTTP_PORT: u16 = 7777;
pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";

/// Pause between capture cycles, and between retries after a transient read failure.
pub const DEFAULT_CAPTURE_INTERVAL: Duration = Duration::from_secs(1);

/// Capacity of the capture → annotator channel. Zero makes every send a
/// rendezvous, so a slow annotator throttles capture instead of frames piling up.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 0;

/// Text drawn above every detected region.
pub const DEFAULT_LABEL: &str = "Human";
