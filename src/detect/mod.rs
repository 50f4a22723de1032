mod geometry;
mod result;

pub use geometry::{BoundingBox, Point};
pub use result::{DetectionFrame, ObjectDetection};
