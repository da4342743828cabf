pub mod annotator;
pub mod cancellation;
pub mod capture_loop;
pub mod pipeline_config;
pub mod pipeline_logger;
pub mod state_holder;
pub mod supervisor;
