mod batcher;
mod dataset;

pub use batcher::*;
pub use dataset::*;

#[cfg(test)]
pub(crate) use batcher::tests::fake_items;
#[cfg(test)]
pub(crate) use dataset::tests::{idx_images, idx_labels, write_split};
