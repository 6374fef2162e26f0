//! Sparse pyramid cache: per-(cell, zoom) pixel state and the scheduling pass
//!
//! Every cell owns `zoom_index_length` zoom-level records kept in one flat
//! arena. Records are allocated empty at descriptor-read time, populated by
//! the load pass, and freed by the unload pass. All cross-thread access goes
//! through each record's try-lock; a busy record is skipped for the pass.

use std::path::Path;
use std::sync::MutexGuard;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use log::debug;

use super::cell::{GridIndex, LevelState, PixelBuffer, SubGridIndex, SubTile, ZoomLevel};
use super::codec::{self, DecodeTarget};
use super::descriptor::GridDescriptor;
use super::mailbox::ViewportSnapshot;
use super::resample::reduced_dim;
use super::spiral::{CellBounds, SpiralOrder};
use super::{LOAD_BATCH, MAX_SCREEN_H, MAX_SCREEN_W, MIN_TILE_FOOTPRINT};

/// Per-cell dimensions, read once from source headers
#[derive(Debug, Default)]
struct CellInfo {
    sub_w: u32,
    sub_h: u32,
    /// Source pixel dims per sub-tile, row-major; (0, 0) where undeclared
    sub_dims: Vec<(u32, u32)>,
    /// Packing stride at full resolution: the cell's largest sub-tile
    max_sub_w: u32,
    max_sub_h: u32,
    has_data: bool,
}

/// The pyramid cache proper
pub struct PyramidCache {
    descriptor: GridDescriptor,
    cells: Vec<CellInfo>,
    levels: Vec<ZoomLevel>,
    zoom_len: usize,
    max_cell_px: u32,
}

/// Zoom-level count for the largest observed cell footprint: enough levels
/// that the coarsest footprint is at most `MIN_TILE_FOOTPRINT`, plus one
/// extra level to reduce aliasing at the coarsest view
fn zoom_index_length_for(max_dim: u32) -> usize {
    let tiles = max_dim.div_ceil(MIN_TILE_FOOTPRINT);
    let k = if tiles <= 1 {
        0
    } else {
        u32::BITS - (tiles - 1).leading_zeros()
    };
    k.max(1) as usize + 1
}

impl PyramidCache {
    /// Read header dimensions for every declared sub-tile (cheap, no pixel
    /// decode), derive the zoom hierarchy depth, and allocate every cell's
    /// zoom-level records empty
    pub fn read_grid_info(descriptor: GridDescriptor) -> Result<Self> {
        let (grid_w, grid_h) = (descriptor.grid_w(), descriptor.grid_h());
        let mut cells = Vec::with_capacity((grid_w * grid_h) as usize);
        let mut max_dim = 0u32;

        for j in 0..grid_h as i32 {
            for i in 0..grid_w as i32 {
                let idx = GridIndex::new(i, j);
                let sub_w = descriptor.subgrid_w(idx);
                let sub_h = descriptor.subgrid_h(idx);
                let mut info = CellInfo {
                    sub_w,
                    sub_h,
                    sub_dims: vec![(0, 0); (sub_w * sub_h) as usize],
                    ..CellInfo::default()
                };
                for sj in 0..sub_h {
                    for si in 0..sub_w {
                        let sub = SubGridIndex::new(si, sj);
                        let Some(file) = descriptor.filename(idx, sub) else {
                            continue;
                        };
                        let dims = codec::read_dimensions(Path::new(file))?;
                        info.sub_dims[(sj * sub_w + si) as usize] = dims;
                        info.max_sub_w = info.max_sub_w.max(dims.0);
                        info.max_sub_h = info.max_sub_h.max(dims.1);
                        info.has_data |= dims.0 > 0 && dims.1 > 0;
                    }
                }
                max_dim = max_dim
                    .max(info.max_sub_w.saturating_mul(sub_w))
                    .max(info.max_sub_h.saturating_mul(sub_h));
                cells.push(info);
            }
        }

        let zoom_len = zoom_index_length_for(max_dim);
        let levels = (0..cells.len() * zoom_len)
            .map(|_| ZoomLevel::new())
            .collect();
        let max_cell_px = cells
            .iter()
            .map(|c| {
                c.max_sub_w
                    .saturating_mul(c.sub_w)
                    .max(c.max_sub_h.saturating_mul(c.sub_h))
            })
            .max()
            .unwrap_or(0);

        debug!(
            "grid {grid_w}x{grid_h}, {zoom_len} zoom levels, max cell {max_cell_px}px"
        );
        Ok(Self {
            descriptor,
            cells,
            levels,
            zoom_len,
            max_cell_px,
        })
    }

    pub fn descriptor(&self) -> &GridDescriptor {
        &self.descriptor
    }

    pub fn zoom_index_length(&self) -> usize {
        self.zoom_len
    }

    pub fn max_cell_px(&self) -> u32 {
        self.max_cell_px
    }

    fn cell_index(&self, idx: GridIndex) -> usize {
        (idx.j as u32 * self.descriptor.grid_w() + idx.i as u32) as usize
    }

    fn level(&self, idx: GridIndex, zoom: usize) -> &ZoomLevel {
        &self.levels[self.cell_index(idx) * self.zoom_len + zoom]
    }

    pub fn is_loaded(&self, idx: GridIndex, zoom: usize) -> bool {
        self.descriptor.contains(idx) && zoom < self.zoom_len && self.level(idx, zoom).is_loaded()
    }

    /// Non-blocking read access for the display mirror: runs `f` on the level
    /// state if the record is loaded and not busy, otherwise skips
    pub fn with_level<R>(
        &self,
        idx: GridIndex,
        zoom: usize,
        f: impl FnOnce(&LevelState) -> R,
    ) -> Option<R> {
        if !self.descriptor.contains(idx) || zoom >= self.zoom_len {
            return None;
        }
        let level = self.level(idx, zoom);
        let state = level.state.try_lock().ok()?;
        if !level.is_loaded() {
            return None;
        }
        Some(f(&state))
    }

    /// Packing stride of a cell at a zoom level (sub-tile slot size)
    pub fn cell_stride(&self, idx: GridIndex, zoom: usize) -> (u32, u32) {
        let info = &self.cells[self.cell_index(idx)];
        (
            reduced_dim(info.max_sub_w, zoom as u32),
            reduced_dim(info.max_sub_h, zoom as u32),
        )
    }

    /// Conservative visible-region cell bounds at `zoom`, computed against
    /// the largest supported screen rather than the current one so a window
    /// resize never requires emergency reloads
    pub fn visible_bounds(&self, view: &ViewportSnapshot, zoom: usize) -> CellBounds {
        let cell_px = (view.max_cell_px >> zoom).max(1);
        let half_w = MAX_SCREEN_W.div_ceil(cell_px * 2) as i32 + 1;
        let half_h = MAX_SCREEN_H.div_ceil(cell_px * 2) as i32 + 1;
        let ci = view.pos.0.floor() as i32;
        let cj = view.pos.1.floor() as i32;
        CellBounds {
            left: ci - half_w,
            right: ci + half_w,
            top: cj - half_h,
            bottom: cj + half_h,
        }
    }

    /// Load/retain eligibility for one (cell, zoom) pair
    fn check_load(
        &self,
        idx: GridIndex,
        zoom: usize,
        view: &ViewportSnapshot,
        lower_limit: usize,
        load_all: bool,
    ) -> bool {
        // The coarsest level is always eligible and never evicted
        if zoom == self.zoom_len - 1 || load_all {
            return true;
        }
        if zoom >= lower_limit && self.visible_bounds(view, zoom).contains(idx) {
            return true;
        }
        // The 8-neighborhood keeps panning smooth even below the lower limit
        let center = GridIndex::new(view.pos.0.floor() as i32, view.pos.1.floor() as i32);
        idx.is_neighbor_of(&center)
    }

    /// One scheduling pass: bounded unload then load. Called repeatedly by
    /// the loader loop; returns the number of successful cell loads.
    pub fn load_grid(
        &self,
        view: &ViewportSnapshot,
        keep_running: &AtomicBool,
        acc: &mut Vec<u32>,
    ) -> usize {
        let (grid_w, grid_h) = (self.descriptor.grid_w(), self.descriptor.grid_h());
        let lower = view.zoom.min(self.zoom_len - 1);

        // Unload pass, second-coarsest level down to full resolution
        for zoom in (0..self.zoom_len.saturating_sub(1)).rev() {
            for j in 0..grid_h as i32 {
                for i in 0..grid_w as i32 {
                    if !keep_running.load(Ordering::Relaxed) {
                        return 0;
                    }
                    let idx = GridIndex::new(i, j);
                    if !self.check_load(idx, zoom, view, lower, false) {
                        self.unload_level(idx, zoom);
                    }
                }
            }
        }

        let center = GridIndex::new(view.pos.0.floor() as i32, view.pos.1.floor() as i32);
        let mut loaded = 0usize;

        // On-screen cells first
        let mut order =
            SpiralOrder::visible(center, self.visible_bounds(view, lower), grid_w, grid_h);
        while loaded < LOAD_BATCH {
            if !keep_running.load(Ordering::Relaxed) {
                return loaded;
            }
            let Some(idx) = order.next_cell() else { break };
            if self.load_square(idx, view, lower, false, true, acc) {
                loaded += 1;
            }
        }

        // Remaining quota goes to the rest of the grid
        if loaded < LOAD_BATCH {
            let mut order = SpiralOrder::full(center, grid_w, grid_h);
            while loaded < LOAD_BATCH {
                if !keep_running.load(Ordering::Relaxed) {
                    return loaded;
                }
                let Some(idx) = order.next_cell() else { break };
                if self.load_square(idx, view, lower, false, true, acc) {
                    loaded += 1;
                }
            }
        }

        loaded
    }

    /// Free one zoom-level record. Buffers are released before the loaded
    /// flag is cleared so a reader can never observe a stale pointer through
    /// the flag. A no-op on already-empty records and on contention.
    fn unload_level(&self, idx: GridIndex, zoom: usize) {
        let level = self.level(idx, zoom);
        let Ok(mut state) = level.state.try_lock() else {
            return;
        };
        if state.is_empty() {
            return;
        }
        for subtile in &mut state.subtiles {
            subtile.buffer.release();
        }
        state.subtiles = Vec::new();
        level.set_loaded(false);
        debug!("unloaded cell ({}, {}) zoom {zoom}", idx.i, idx.j);
    }

    /// Load every pending eligible zoom level of one cell with a single
    /// decode pass per sub-tile file. Returns true if anything was loaded.
    fn load_square(
        &self,
        idx: GridIndex,
        view: &ViewportSnapshot,
        lower_limit: usize,
        load_all: bool,
        use_cache: bool,
        acc: &mut Vec<u32>,
    ) -> bool {
        let info = &self.cells[self.cell_index(idx)];
        if !info.has_data {
            return false;
        }

        // Claim every not-yet-loaded eligible level; busy ones are skipped
        let mut pending: Vec<(usize, MutexGuard<'_, LevelState>)> = Vec::new();
        for zoom in 0..self.zoom_len {
            let level = self.level(idx, zoom);
            if level.is_loaded() || !self.check_load(idx, zoom, view, lower_limit, load_all) {
                continue;
            }
            if let Ok(state) = level.state.try_lock() {
                pending.push((zoom, state));
            }
        }
        if pending.is_empty() {
            return false;
        }

        for (zoom, state) in pending.iter_mut() {
            let shift = *zoom as u32;
            let (stride_x, stride_y) = (
                reduced_dim(info.max_sub_w, shift),
                reduced_dim(info.max_sub_h, shift),
            );
            state.subtiles = (0..info.sub_w * info.sub_h)
                .map(|k| {
                    let (si, sj) = (k % info.sub_w, k / info.sub_w);
                    let (sw, sh) = info.sub_dims[k as usize];
                    SubTile {
                        buffer: PixelBuffer::new(),
                        w: if sw > 0 { reduced_dim(sw, shift) } else { 0 },
                        h: if sh > 0 { reduced_dim(sh, shift) } else { 0 },
                        origin_x: si * stride_x,
                        origin_y: sj * stride_y,
                    }
                })
                .collect();
        }

        let mut ok = true;
        'subtiles: for sj in 0..info.sub_h {
            for si in 0..info.sub_w {
                let sub = SubGridIndex::new(si, sj);
                let Some(file) = self.descriptor.filename(idx, sub) else {
                    continue;
                };
                let path = Path::new(file);
                let k = (sj * info.sub_w + si) as usize;
                let src_dims = info.sub_dims[k];

                let mut targets: Vec<DecodeTarget<'_>> = pending
                    .iter_mut()
                    .map(|(zoom, state)| {
                        let subtile = &mut state.subtiles[k];
                        let (w, h) = (subtile.w, subtile.h);
                        DecodeTarget {
                            shift: *zoom as u32,
                            w,
                            h,
                            buffer: &mut subtile.buffer,
                        }
                    })
                    .collect();

                let cache_file = if use_cache && self.descriptor.use_cache() {
                    Some(codec::cache_path(path))
                } else {
                    None
                };
                if !codec::load_as_rgba(path, cache_file.as_deref(), sub, src_dims, &mut targets, acc)
                {
                    ok = false;
                    break 'subtiles;
                }
            }
        }

        if ok {
            for (zoom, _) in &pending {
                self.level(idx, *zoom).set_loaded(true);
            }
            debug!(
                "loaded cell ({}, {}) levels {:?}",
                idx.i,
                idx.j,
                pending.iter().map(|(z, _)| *z).collect::<Vec<_>>()
            );
            true
        } else {
            // Leave every claimed level fully empty; it stays eligible for a
            // retry on a later pass
            for (_, state) in pending.iter_mut() {
                state.subtiles = Vec::new();
            }
            false
        }
    }

    /// Offline cache generation: force-load every level of every cell, write
    /// each sub-tile's cache image at the alignment-schedule level, unload
    pub fn setup_grid_cache(&self, keep_running: &AtomicBool) -> Result<()> {
        let dummy = ViewportSnapshot::new(0, (0.0, 0.0), self.max_cell_px, (0, 0));
        let mut acc = Vec::new();

        for j in 0..self.descriptor.grid_h() as i32 {
            for i in 0..self.descriptor.grid_w() as i32 {
                if !keep_running.load(Ordering::Relaxed) {
                    return Ok(());
                }
                let idx = GridIndex::new(i, j);
                let info = &self.cells[self.cell_index(idx)];
                if !info.has_data {
                    continue;
                }
                self.load_square(idx, &dummy, 0, true, false, &mut acc);

                for sj in 0..info.sub_h {
                    for si in 0..info.sub_w {
                        let sub = SubGridIndex::new(si, sj);
                        let Some(file) = self.descriptor.filename(idx, sub) else {
                            continue;
                        };
                        let k = (sj * info.sub_w + si) as usize;
                        let (sw, sh) = info.sub_dims[k];
                        if sw == 0 || sh == 0 {
                            continue;
                        }
                        let shift = codec::cache_shift(sw, sh) as usize;
                        if let Ok(state) = self.level(idx, shift).state.try_lock() {
                            let subtile = &state.subtiles[k];
                            if subtile.buffer.has_data() {
                                codec::write_cache_image(
                                    Path::new(file),
                                    subtile.buffer.as_slice(),
                                    subtile.w,
                                    subtile.h,
                                )?;
                            }
                        }
                    }
                }

                for zoom in 0..self.zoom_len {
                    self.unload_level(idx, zoom);
                }
            }
        }
        Ok(())
    }
}
