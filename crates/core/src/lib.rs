//! Camera tracking pipeline: capture frames, detect regions, annotate them,
//! and expose the latest result as JSON over HTTP.

pub mod annotation;
pub mod capture;
pub mod detection;
pub mod pipeline;
pub mod serving;
pub mod shared;
