//! Multi-resolution tile pyramid manager for very large raster mosaics
//!
//! A mosaic is a grid of cells, each assembled from one or more source
//! rasters and held as a pyramid of power-of-two downsampled RGBA buffers.
//! The interactive thread publishes viewport snapshots through the mailbox;
//! the background loader drains them and runs scheduling passes against the
//! pyramid cache, which decodes and evicts pixel data as the view moves.

pub mod cache;
pub mod cell;
pub mod codec;
pub mod descriptor;
pub mod loader;
pub mod mailbox;
pub mod mirror;
pub mod resample;
pub mod spiral;

use std::sync::Arc;

use anyhow::Result;

use cache::PyramidCache;
use descriptor::GridDescriptor;
use loader::Loader;
use mailbox::ViewportMailbox;

/// Largest per-axis pixel footprint allowed for the coarsest pyramid level
pub const MIN_TILE_FOOTPRINT: u32 = 256;

/// Successful loads allowed per scheduling pass
pub const LOAD_BATCH: usize = 8;

/// Pixel budget for on-disk cache images
pub const MAX_CACHE_PIXELS: u32 = 512 * 512;

/// Largest supported window, used for the conservative visibility bound so a
/// resize never requires emergency reloads
pub const MAX_SCREEN_W: u32 = 3840;
pub const MAX_SCREEN_H: u32 = 2160;

/// Source filename denoting an intentionally empty cell
pub const PLACEHOLDER_FILENAME: &str = "EMPTY";

/// Sibling directory for downsampled cache images
pub const CACHE_DIR: &str = "__cache__";
pub const CACHE_EXT: &str = "png";

/// Internal member name suffix identifying the embedded raster in a container
pub const CONTAINER_RASTER_SUFFIX: &str = ".tif";

/// Integrated mosaic system: descriptor, pyramid cache, viewport mailbox,
/// and the background loader thread
pub struct MosaicSystem {
    cache: Arc<PyramidCache>,
    mailbox: Arc<ViewportMailbox>,
    loader: Loader,
}

impl MosaicSystem {
    /// Read grid headers, allocate the (empty) pyramid, and start the loader
    pub fn new(descriptor: GridDescriptor) -> Result<Self> {
        let cache = Arc::new(PyramidCache::read_grid_info(descriptor)?);
        let mailbox = Arc::new(ViewportMailbox::new());
        let loader = Loader::new(cache.clone(), mailbox.clone());
        Ok(Self {
            cache,
            mailbox,
            loader,
        })
    }

    pub fn cache(&self) -> &Arc<PyramidCache> {
        &self.cache
    }

    /// Publish the latest viewport (interactive thread, once per frame)
    pub fn update_viewport(&self, zoom: usize, pos: (f64, f64), screen: (u32, u32)) {
        self.mailbox
            .update(zoom, pos, self.cache.max_cell_px(), screen);
    }

    /// Stop the loader thread and wait for it to exit
    pub fn shutdown(&mut self) {
        self.loader.stop();
    }
}
