//! Grid coordinates, owned pixel buffers, and per-(cell, zoom) records

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Coordinate of a cell in the top-level grid
///
/// Signed so that viewport math and spiral traversal can reach outside the
/// grid; bounds are checked before indexing.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct GridIndex {
    pub i: i32,
    pub j: i32,
}

impl GridIndex {
    pub fn new(i: i32, j: i32) -> Self {
        Self { i, j }
    }

    /// Chebyshev (chessboard) distance to another cell
    pub fn chebyshev(&self, other: &GridIndex) -> i32 {
        (self.i - other.i).abs().max((self.j - other.j).abs())
    }

    /// True if this cell lies in `other`'s immediate 8-neighborhood
    /// (including `other` itself)
    pub fn is_neighbor_of(&self, other: &GridIndex) -> bool {
        self.chebyshev(other) <= 1
    }
}

/// Coordinate of a sub-tile within one cell
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct SubGridIndex {
    pub i: u32,
    pub j: u32,
}

impl SubGridIndex {
    pub fn new(i: u32, j: u32) -> Self {
        Self { i, j }
    }
}

/// Owned RGBA pixel storage with an explicit empty state
///
/// Unloading releases the allocation; `has_data` is the "currently holds
/// pixels" query that replaces null-pointer checks.
#[derive(Debug, Default)]
pub struct PixelBuffer {
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Allocate (or reallocate) zeroed storage for `w * h` RGBA pixels
    pub fn allocate(&mut self, w: u32, h: u32) {
        let len = w as usize * h as usize * 4;
        self.data.clear();
        self.data.resize(len, 0);
    }

    /// Drop the allocation, returning the buffer to the empty state
    pub fn release(&mut self) {
        self.data = Vec::new();
    }

    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// One sub-tile's decoded pixels at one zoom level
///
/// `origin_x`/`origin_y` give the packing position inside the cell canvas;
/// sub-tiles are packed on the cell's maximum sub-tile size as stride, reduced
/// by the level's shift.
#[derive(Debug, Default)]
pub struct SubTile {
    pub buffer: PixelBuffer,
    pub w: u32,
    pub h: u32,
    pub origin_x: u32,
    pub origin_y: u32,
}

/// Buffer family of one zoom-level record, guarded as a unit
#[derive(Debug, Default)]
pub struct LevelState {
    /// Row-major by SubGridIndex; empty vec when the level is unloaded.
    /// Sub-tiles without declared data keep a released buffer.
    pub subtiles: Vec<SubTile>,
}

impl LevelState {
    pub fn is_empty(&self) -> bool {
        self.subtiles.is_empty()
    }
}

/// One (cell, zoom) record: Empty -> Loading -> Loaded -> Empty
///
/// The mutex guards the (loaded flag, buffers) tuple together; "Loading" is
/// represented by the mutex being held while the flag is still false. Readers
/// and the loader only ever try-lock and skip on contention.
#[derive(Debug, Default)]
pub struct ZoomLevel {
    pub state: Mutex<LevelState>,
    loaded: AtomicBool,
}

impl ZoomLevel {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LevelState::default()),
            loaded: AtomicBool::new(false),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Only call while holding the state mutex
    pub fn set_loaded(&self, loaded: bool) {
        self.loaded.store(loaded, Ordering::Release);
    }
}
