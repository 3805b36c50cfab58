//! Data handling: mini-batch partitioning and categorical encodings.

mod batches;
mod encoding;

pub use batches::*;
pub use encoding::*;
