pub mod constants;
pub mod document;
pub mod frame;
pub mod region;
