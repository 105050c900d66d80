use crate::shared::bounding_box::BoundingBox;
use crate::shared::embedding::Embedding;
use crate::shared::frame::Frame;

/// Domain interface for face detection and embedding.
///
/// Implementations never fail their caller: inference errors are logged and
/// reported as empty results, which routes the image to the unclusterable
/// destination. Stateful backends (inference sessions) need `&mut self`.
pub trait FaceModel: Send {
    /// Bounding boxes of every face found in the frame, in frame pixels.
    fn detect(&mut self, frame: &Frame) -> Vec<BoundingBox>;

    /// One embedding per box, in box order. A shorter result covers a prefix
    /// of `boxes`: callers pair boxes and embeddings by position and leave
    /// the remaining boxes out.
    fn embed(&mut self, frame: &Frame, boxes: &[BoundingBox]) -> Vec<Embedding>;
}
