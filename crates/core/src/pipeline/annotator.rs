use std::sync::Arc;

use crossbeam_channel::Receiver;

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::pipeline::cancellation::CancellationToken;
use crate::pipeline::state_holder::StateHolder;
use crate::shared::document::Document;

/// Consumer side of the pipeline: draws results onto each incoming
/// document's image and publishes it to the state holder.
pub struct Annotator {
    drawer: Box<dyn FrameAnnotator>,
    state: Arc<StateHolder>,
}

impl Annotator {
    pub fn new(drawer: Box<dyn FrameAnnotator>, state: Arc<StateHolder>) -> Self {
        Self { drawer, state }
    }

    /// Processes documents in arrival order until the channel closes or the
    /// token is cancelled. Returns the number of documents published.
    ///
    /// A drawing failure leaves the image as it was; the document is still
    /// published since its items are unaffected.
    pub fn run(&self, documents: Receiver<Document>, cancel: &CancellationToken) -> usize {
        let mut published = 0;
        loop {
            let received = crossbeam_channel::select! {
                recv(documents) -> msg => msg.ok(),
                recv(cancel.signal()) -> _ => None,
            };
            let Some(mut document) = received else {
                break;
            };

            log::debug!(
                "Found {} items in frame {}",
                document.items.len(),
                document.sequence()
            );
            if let Err(e) = self.drawer.annotate(&mut document.image, &document.items) {
                log::warn!("Annotation failed on frame {}: {e}", document.sequence());
            }

            self.state.set(document);
            published += 1;
        }
        published
    }
}
