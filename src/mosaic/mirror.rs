//! Display mirror: converts cached pixel data into a screen-resolution frame
//!
//! Only the contract with the pyramid cache is fixed: read whatever is
//! currently loaded through non-blocking peeks, never stall the loader. The
//! software implementation here composes a plain RGBA frame; an on-screen
//! compositor would implement the same trait against GPU surfaces.

use super::cache::PyramidCache;
use super::cell::GridIndex;
use super::mailbox::ViewportSnapshot;
use super::resample::{Region, expand, reduce};

pub trait DisplayMirror {
    /// Refresh the output from whatever the cache currently holds
    fn refresh(&mut self, cache: &PyramidCache, view: &ViewportSnapshot);
}

/// CPU compositor producing a packed RGBA frame at the viewport screen size
pub struct SoftwareMirror {
    frame: Vec<u8>,
    w: u32,
    h: u32,
    background: [u8; 4],
    acc: Vec<u32>,
}

impl SoftwareMirror {
    pub fn new() -> Self {
        Self {
            frame: Vec::new(),
            w: 0,
            h: 0,
            background: [24, 24, 24, 255],
            acc: Vec::new(),
        }
    }

    pub fn frame(&self) -> (&[u8], u32, u32) {
        (&self.frame, self.w, self.h)
    }

    /// Blit one loaded zoom level of one cell. `cell_origin` is the cell's
    /// top-left corner in (possibly negative) screen coordinates.
    fn blit_level(
        &mut self,
        cache: &PyramidCache,
        idx: GridIndex,
        zoom: usize,
        view_zoom: usize,
        cell_origin: (i64, i64),
    ) -> bool {
        let shift = (zoom - view_zoom) as u32;
        let block = 1i64 << shift;
        let (frame_w, frame_h) = (self.w, self.h);
        let frame = &mut self.frame;
        let acc = &mut self.acc;

        cache
            .with_level(idx, zoom, |state| {
                for subtile in &state.subtiles {
                    if !subtile.buffer.has_data() {
                        continue;
                    }
                    // Sub-tile origin in level pixels maps to screen pixels
                    // scaled by the zoom difference
                    let dst_x = cell_origin.0 + ((subtile.origin_x as i64) << shift);
                    let dst_y = cell_origin.1 + ((subtile.origin_y as i64) << shift);
                    if dst_x >= frame_w as i64 || dst_y >= frame_h as i64 {
                        continue;
                    }

                    // Clip negative destinations by whole source pixels so
                    // block alignment is preserved
                    let skip_x = if dst_x < 0 {
                        ((-dst_x) as u64).div_ceil(block as u64) as i64
                    } else {
                        0
                    };
                    let skip_y = if dst_y < 0 {
                        ((-dst_y) as u64).div_ceil(block as u64) as i64
                    } else {
                        0
                    };
                    if skip_x as u32 >= subtile.w || skip_y as u32 >= subtile.h {
                        continue;
                    }
                    let src = Region::new(
                        skip_x as u32,
                        skip_y as u32,
                        subtile.w - skip_x as u32,
                        subtile.h - skip_y as u32,
                    );
                    let out_x = (dst_x + skip_x * block) as u32;
                    let out_y = (dst_y + skip_y * block) as u32;

                    if shift == 0 {
                        reduce(
                            subtile.buffer.as_slice(),
                            subtile.w,
                            src,
                            frame,
                            frame_w,
                            out_x,
                            out_y,
                            frame_w,
                            frame_h,
                            0,
                            acc,
                        );
                    } else {
                        expand(
                            subtile.buffer.as_slice(),
                            subtile.w,
                            src,
                            frame,
                            frame_w,
                            out_x,
                            out_y,
                            frame_w,
                            frame_h,
                            shift,
                        );
                    }
                }
            })
            .is_some()
    }
}

impl Default for SoftwareMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayMirror for SoftwareMirror {
    fn refresh(&mut self, cache: &PyramidCache, view: &ViewportSnapshot) {
        let (w, h) = view.screen;
        self.w = w;
        self.h = h;
        self.frame.clear();
        self.frame.reserve(w as usize * h as usize * 4);
        for _ in 0..w as usize * h as usize {
            self.frame.extend_from_slice(&self.background);
        }
        if !view.valid || view.max_cell_px == 0 {
            return;
        }

        let zoom = view.zoom.min(cache.zoom_index_length() - 1);
        let cell_px = (view.max_cell_px >> zoom).max(1) as i64;

        // Cells overlapping the actual screen
        let first_i = (view.pos.0 - (w as f64 / 2.0) / cell_px as f64).floor() as i32;
        let first_j = (view.pos.1 - (h as f64 / 2.0) / cell_px as f64).floor() as i32;
        let count_i = (w as i64 / cell_px + 2) as i32;
        let count_j = (h as i64 / cell_px + 2) as i32;

        for j in first_j..first_j + count_j {
            for i in first_i..first_i + count_i {
                let idx = GridIndex::new(i, j);
                let origin = (
                    ((i as f64 - view.pos.0) * cell_px as f64 + w as f64 / 2.0).round() as i64,
                    ((j as f64 - view.pos.1) * cell_px as f64 + h as f64 / 2.0).round() as i64,
                );
                // Finest loaded level at or above the view zoom; coarser data
                // is expanded as interim filler
                for level in zoom..cache.zoom_index_length() {
                    if self.blit_level(cache, idx, level, zoom, origin) {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mosaic::descriptor::GridDescriptor;
    use std::sync::atomic::AtomicBool;

    fn one_cell_cache(dir: &std::path::Path, img: &image::RgbaImage) -> PyramidCache {
        let path = dir.join("cell.png");
        img.save(&path).unwrap();
        let files = [path.to_string_lossy().into_owned()];
        let desc = GridDescriptor::from_files(1, 1, &files, false, false).unwrap();
        PyramidCache::read_grid_info(desc).unwrap()
    }

    fn view_for(cache: &PyramidCache, zoom: usize, screen: (u32, u32)) -> ViewportSnapshot {
        ViewportSnapshot::new(zoom, (0.5, 0.5), cache.max_cell_px(), screen)
    }

    #[test]
    fn full_resolution_cell_fills_the_frame() {
        let dir = tempfile::tempdir().unwrap();
        let img = image::RgbaImage::from_fn(8, 8, |x, y| {
            image::Rgba([(x * 30) as u8, (y * 30) as u8, 0, 255])
        });
        let cache = one_cell_cache(dir.path(), &img);

        let view = view_for(&cache, 0, (8, 8));
        let keep = AtomicBool::new(true);
        let mut acc = Vec::new();
        cache.load_grid(&view, &keep, &mut acc);

        let mut mirror = SoftwareMirror::new();
        mirror.refresh(&cache, &view);
        let (frame, w, h) = mirror.frame();
        assert_eq!((w, h), (8, 8));
        assert_eq!(frame, img.as_raw().as_slice());
    }

    #[test]
    fn coarser_level_is_expanded_as_filler() {
        let dir = tempfile::tempdir().unwrap();
        let img = image::RgbaImage::from_pixel(8, 8, image::Rgba([10, 200, 30, 255]));
        let cache = one_cell_cache(dir.path(), &img);

        // Load everything, then evict full resolution so only the coarser
        // pyramid remains
        let view = view_for(&cache, 0, (8, 8));
        let keep = AtomicBool::new(true);
        let mut acc = Vec::new();
        cache.load_grid(&view, &keep, &mut acc);
        let far = ViewportSnapshot::new(0, (5000.5, 5000.5), cache.max_cell_px(), (8, 8));
        cache.load_grid(&far, &keep, &mut acc);
        assert!(!cache.is_loaded(GridIndex::new(0, 0), 0));

        let mut mirror = SoftwareMirror::new();
        mirror.refresh(&cache, &view);
        let (frame, _, _) = mirror.frame();
        // Uniform source, so the expanded filler matches the original color
        assert_eq!(&frame[0..4], &[10, 200, 30, 255]);
    }

    #[test]
    fn empty_cache_leaves_background() {
        let dir = tempfile::tempdir().unwrap();
        let img = image::RgbaImage::from_pixel(8, 8, image::Rgba([10, 200, 30, 255]));
        let cache = one_cell_cache(dir.path(), &img);

        let view = view_for(&cache, 0, (4, 4));
        let mut mirror = SoftwareMirror::new();
        mirror.refresh(&cache, &view);
        let (frame, _, _) = mirror.frame();
        assert_eq!(&frame[0..4], &[24, 24, 24, 255]);
    }
}
