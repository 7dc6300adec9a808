pub mod batch;
pub mod thumbnailer;

pub use batch::{BatchActor, BatchArguments, BatchError, BatchMsg};
pub use thumbnailer::{ThumbnailerActor, ThumbnailerArguments, ThumbnailerMsg};
