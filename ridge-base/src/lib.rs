mod bitmap;
mod error;
mod hostlist;
mod ids;
mod rle;
#[cfg(test)]
mod test;

pub use bitmap::{Bitmap, Bitmap256, DoubleBitmap256};
pub use error::{err, Error, Result};
pub use hostlist::{compact_hostlist, expand_hostlist};
pub use ids::{JobId, NodeIdx, StepId, StepIdent};
pub use rle::Rle;
