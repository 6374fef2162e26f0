//! Power-of-two resampling kernels over packed RGBA buffers
//!
//! Both kernels take an independent source rectangle and destination
//! origin/clip so a sub-tile can be written into a sub-rectangle of a larger
//! canvas without disturbing the rest. Any index outside the visible
//! destination clip, or past the source bounds, is skipped, never
//! zero-written: sub-tiles individually cover only part of a cell's stride.

use bytemuck::cast_slice;

/// A pixel rectangle (origin + extent)
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }
}

/// Destination extent produced by reducing `dim` pixels by `shift`
pub fn reduced_dim(dim: u32, shift: u32) -> u32 {
    (dim >> shift).max(1)
}

fn rows_of(buf: &[u8], stride: u32) -> u32 {
    if stride == 0 {
        return 0;
    }
    (buf.len() / (stride as usize * 4)) as u32
}

/// Box-filter downsample by `2^shift` in each axis.
///
/// Each destination pixel is the per-channel sum over its `2^shift x 2^shift`
/// source block, shifted right by `2 * shift`. One source row-band is
/// processed at a time into `acc` (sized to the destination row width) so
/// working memory stays O(row), not O(image).
///
/// Destination pixels land at `(dst_x + ox, dst_y + oy)` and are written only
/// when inside the `clip_w x clip_h` visible extent of the destination buffer.
#[allow(clippy::too_many_arguments)]
pub fn reduce(
    src: &[u8],
    src_stride: u32,
    src_rect: Region,
    dst: &mut [u8],
    dst_stride: u32,
    dst_x: u32,
    dst_y: u32,
    clip_w: u32,
    clip_h: u32,
    shift: u32,
    acc: &mut Vec<u32>,
) {
    if shift == 0 {
        copy_region(src, src_stride, src_rect, dst, dst_stride, dst_x, dst_y, clip_w, clip_h);
        return;
    }
    if shift == 1 {
        halve(src, src_stride, src_rect, dst, dst_stride, dst_x, dst_y, clip_w, clip_h);
        return;
    }

    let src_rows = rows_of(src, src_stride);
    let dst_rows = rows_of(dst, dst_stride);
    let block = 1u32 << shift;
    let out_w = reduced_dim(src_rect.w, shift);
    let out_h = reduced_dim(src_rect.h, shift);

    acc.clear();
    acc.resize(out_w as usize * 4, 0);

    for oy in 0..out_h {
        let dy = dst_y + oy;
        if dy >= clip_h || dy >= dst_rows {
            continue;
        }

        acc.iter_mut().for_each(|v| *v = 0);

        // Accumulate one band of 2^shift source rows
        for by in 0..block {
            let sy = src_rect.y + (oy << shift) + by;
            if sy >= src_rect.y + src_rect.h || sy >= src_rows {
                continue;
            }
            let row_start = (sy * src_stride) as usize * 4;
            for ox in 0..out_w {
                let a = &mut acc[ox as usize * 4..ox as usize * 4 + 4];
                for bx in 0..block {
                    let sx = src_rect.x + (ox << shift) + bx;
                    if sx >= src_rect.x + src_rect.w || sx >= src_stride {
                        continue;
                    }
                    let p = row_start + sx as usize * 4;
                    a[0] += src[p] as u32;
                    a[1] += src[p + 1] as u32;
                    a[2] += src[p + 2] as u32;
                    a[3] += src[p + 3] as u32;
                }
            }
        }

        let out_row = (dy * dst_stride) as usize * 4;
        for ox in 0..out_w {
            let dx = dst_x + ox;
            if dx >= clip_w || dx >= dst_stride {
                continue;
            }
            let p = out_row + dx as usize * 4;
            let a = &acc[ox as usize * 4..ox as usize * 4 + 4];
            dst[p] = (a[0] >> (2 * shift)) as u8;
            dst[p + 1] = (a[1] >> (2 * shift)) as u8;
            dst[p + 2] = (a[2] >> (2 * shift)) as u8;
            dst[p + 3] = (a[3] >> (2 * shift)) as u8;
        }
    }
}

/// shift = 1: the dominant case during pyramid builds, done without the band
/// accumulator. Same clipping rules as the general path.
#[allow(clippy::too_many_arguments)]
fn halve(
    src: &[u8],
    src_stride: u32,
    src_rect: Region,
    dst: &mut [u8],
    dst_stride: u32,
    dst_x: u32,
    dst_y: u32,
    clip_w: u32,
    clip_h: u32,
) {
    let src_rows = rows_of(src, src_stride);
    let dst_rows = rows_of(dst, dst_stride);
    let out_w = reduced_dim(src_rect.w, 1);
    let out_h = reduced_dim(src_rect.h, 1);

    for oy in 0..out_h {
        let dy = dst_y + oy;
        if dy >= clip_h || dy >= dst_rows {
            continue;
        }
        let out_row = (dy * dst_stride) as usize * 4;
        for ox in 0..out_w {
            let dx = dst_x + ox;
            if dx >= clip_w || dx >= dst_stride {
                continue;
            }
            let mut sum = [0u32; 4];
            for by in 0..2 {
                let sy = src_rect.y + oy * 2 + by;
                if sy >= src_rect.y + src_rect.h || sy >= src_rows {
                    continue;
                }
                for bx in 0..2 {
                    let sx = src_rect.x + ox * 2 + bx;
                    if sx >= src_rect.x + src_rect.w || sx >= src_stride {
                        continue;
                    }
                    let p = (sy * src_stride + sx) as usize * 4;
                    sum[0] += src[p] as u32;
                    sum[1] += src[p + 1] as u32;
                    sum[2] += src[p + 2] as u32;
                    sum[3] += src[p + 3] as u32;
                }
            }
            let p = out_row + dx as usize * 4;
            dst[p] = (sum[0] >> 2) as u8;
            dst[p + 1] = (sum[1] >> 2) as u8;
            dst[p + 2] = (sum[2] >> 2) as u8;
            dst[p + 3] = (sum[3] >> 2) as u8;
        }
    }
}

/// shift = 0: verbatim copy with the same clipping rules
#[allow(clippy::too_many_arguments)]
fn copy_region(
    src: &[u8],
    src_stride: u32,
    src_rect: Region,
    dst: &mut [u8],
    dst_stride: u32,
    dst_x: u32,
    dst_y: u32,
    clip_w: u32,
    clip_h: u32,
) {
    let src_rows = rows_of(src, src_stride);
    let dst_rows = rows_of(dst, dst_stride);

    for oy in 0..src_rect.h {
        let sy = src_rect.y + oy;
        let dy = dst_y + oy;
        if sy >= src_rows || dy >= clip_h || dy >= dst_rows {
            continue;
        }
        let copy_w = src_rect
            .w
            .min(src_stride.saturating_sub(src_rect.x))
            .min(clip_w.saturating_sub(dst_x))
            .min(dst_stride.saturating_sub(dst_x));
        if copy_w == 0 {
            continue;
        }
        let s = (sy * src_stride + src_rect.x) as usize * 4;
        let d = (dy * dst_stride + dst_x) as usize * 4;
        let n = copy_w as usize * 4;
        dst[d..d + n].copy_from_slice(&src[s..s + n]);
    }
}

/// Block-replicate upsample by `2^shift`; no interpolation.
///
/// Each source pixel in `src_rect` fills a `2^shift x 2^shift` block whose
/// top-left lands at `(dst_x + (sx - rect.x) << shift, ...)`.
#[allow(clippy::too_many_arguments)]
pub fn expand(
    src: &[u8],
    src_stride: u32,
    src_rect: Region,
    dst: &mut [u8],
    dst_stride: u32,
    dst_x: u32,
    dst_y: u32,
    clip_w: u32,
    clip_h: u32,
    shift: u32,
) {
    let src_rows = rows_of(src, src_stride);
    let dst_rows = rows_of(dst, dst_stride);
    let block = 1u32 << shift;
    let src_px: &[[u8; 4]] = cast_slice(src);

    for oy in 0..src_rect.h {
        let sy = src_rect.y + oy;
        if sy >= src_rows {
            continue;
        }
        for ox in 0..src_rect.w {
            let sx = src_rect.x + ox;
            if sx >= src_stride {
                continue;
            }
            let pixel = src_px[(sy * src_stride + sx) as usize];
            for by in 0..block {
                let dy = dst_y + (oy << shift) + by;
                if dy >= clip_h || dy >= dst_rows {
                    continue;
                }
                let row = (dy * dst_stride) as usize * 4;
                for bx in 0..block {
                    let dx = dst_x + (ox << shift) + bx;
                    if dx >= clip_w || dx >= dst_stride {
                        continue;
                    }
                    let p = row + dx as usize * 4;
                    dst[p..p + 4].copy_from_slice(&pixel);
                }
            }
        }
    }
}
