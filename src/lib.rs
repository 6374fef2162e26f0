pub mod mosaic;

pub use mosaic::MosaicSystem;
pub use mosaic::cache::PyramidCache;
pub use mosaic::descriptor::GridDescriptor;
pub use mosaic::mailbox::{ViewportMailbox, ViewportSnapshot};
pub use mosaic::mirror::{DisplayMirror, SoftwareMirror};
