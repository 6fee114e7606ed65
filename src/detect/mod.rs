mod result;
mod suppress;
mod validate;

pub use result::{DetectionError, RawDetection, TrackId, ValidatedDetection};
pub use suppress::{iou, suppress};
pub use validate::{validate, SizeFilter};

pub(crate) use validate::check_range;
