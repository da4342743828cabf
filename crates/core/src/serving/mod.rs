pub mod document_body;
pub mod infrastructure;
pub mod serving_error;
