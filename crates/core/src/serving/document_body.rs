use serde::Serialize;

use crate::shared::document::{Dimensions, Document};
use crate::shared::region::Region;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Wire shape of the current state: frame size plus detected regions.
///
/// Borrows from the document so rendering never copies the region list.
#[derive(Debug, Serialize)]
pub struct DocumentBody<'a> {
    pub screen: Dimensions,
    pub items: &'a [Region],
}

impl<'a> DocumentBody<'a> {
    /// Before the first publication the body has zero dimensions and no items.
    pub fn from_document(document: Option<&'a Document>) -> Self {
        match document {
            Some(doc) => Self {
                screen: doc.screen,
                items: &doc.items,
            },
            None => Self {
                screen: Dimensions::ZERO,
                items: &[],
            },
        }
    }
}

/// Serializes the document returned to HTTP clients.
pub fn render_document(document: Option<&Document>) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&DocumentBody::from_document(document))
}
