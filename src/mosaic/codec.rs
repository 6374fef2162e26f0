//! Codec adapter: decodes one source file into every pending zoom level
//!
//! Three source kinds are supported: a direct raster (PNG/JPEG/TIFF), a zip
//! container holding exactly one embedded raster, and the placeholder
//! filename for intentionally empty cells. A previously written downsampled
//! cache image is substituted for the full decode when every pending
//! destination fits under the cache pixel budget.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::{debug, warn};

use super::cell::{PixelBuffer, SubGridIndex};
use super::resample::{Region, reduce, reduced_dim};
use super::{CACHE_DIR, CACHE_EXT, CONTAINER_RASTER_SUFFIX, MAX_CACHE_PIXELS, PLACEHOLDER_FILENAME};

/// One pending (zoom level, target buffer) pair for a decode pass
pub struct DecodeTarget<'a> {
    pub shift: u32,
    pub w: u32,
    pub h: u32,
    pub buffer: &'a mut PixelBuffer,
}

/// Source kind, resolved by extension
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SourceKind {
    Raster,
    Container,
    Placeholder,
}

impl SourceKind {
    pub fn of(path: &Path) -> SourceKind {
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n == PLACEHOLDER_FILENAME)
        {
            return SourceKind::Placeholder;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("zip") => SourceKind::Container,
            _ => SourceKind::Raster,
        }
    }
}

/// Header-only dimension read; the placeholder reports zero size
pub fn read_dimensions(path: &Path) -> Result<(u32, u32)> {
    match SourceKind::of(path) {
        SourceKind::Placeholder => Ok((0, 0)),
        SourceKind::Raster => image::image_dimensions(path)
            .with_context(|| format!("reading header of {}", path.display())),
        SourceKind::Container => {
            let tmp = extract_container_member(path)?;
            image::image_dimensions(tmp.path())
                .with_context(|| format!("reading embedded raster of {}", path.display()))
        }
    }
}

/// Cache file path: `<parent>/__cache__/<ext>_<stem>.<cache-ext>`
pub fn cache_path(source: &Path) -> PathBuf {
    let parent = source.parent().unwrap_or_else(|| Path::new("."));
    let ext = source
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("raw");
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unnamed");
    parent
        .join(CACHE_DIR)
        .join(format!("{ext}_{stem}.{CACHE_EXT}"))
}

/// Cache alignment schedule: the finest shift whose footprint fits the cache
/// pixel budget. Written and read with the same computation; a dimension
/// cross-check at read time catches drift between the two (see DESIGN.md).
pub fn cache_shift(w: u32, h: u32) -> u32 {
    // Footprints in u64: gigapixel sheets overflow a u32 product
    let mut shift = 0;
    while reduced_dim(w, shift) as u64 * reduced_dim(h, shift) as u64 > MAX_CACHE_PIXELS as u64 {
        shift += 1;
    }
    shift
}

/// Write one reduced sub-tile image to the on-disk cache, creating the cache
/// directory on demand
pub fn write_cache_image(source: &Path, pixels: &[u8], w: u32, h: u32) -> Result<()> {
    let path = cache_path(source);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let img = image::RgbaImage::from_raw(w, h, pixels.to_vec())
        .context("cache pixel buffer does not match its dimensions")?;
    img.save(&path)
        .with_context(|| format!("writing cache image {}", path.display()))?;
    debug!("wrote cache image {} ({w}x{h})", path.display());
    Ok(())
}

/// Decode `path` once and fill every pending destination.
///
/// Returns false on failure; the caller leaves the affected levels unloaded
/// and they stay eligible for retry on a later pass.
pub fn load_as_rgba(
    path: &Path,
    cache: Option<&Path>,
    sub: SubGridIndex,
    src_dims: (u32, u32),
    targets: &mut [DecodeTarget<'_>],
    acc: &mut Vec<u32>,
) -> bool {
    if SourceKind::of(path) == SourceKind::Placeholder {
        // Trivially successful, zero-sized output
        for t in targets {
            t.buffer.release();
        }
        return true;
    }

    if let Some(cache_file) = cache {
        match try_cache_decode(path, cache_file, src_dims, targets, acc) {
            Ok(true) => return true,
            Ok(false) => {} // cache miss, fall back to full decode
            Err(e) => {
                warn!(
                    "cache decode of {} failed, falling back: {e:#}",
                    cache_file.display()
                );
            }
        }
    }

    match full_decode(path, targets, acc) {
        Ok(()) => true,
        Err(e) => {
            warn!(
                "decode of {} (sub-tile {},{}) failed: {e:#}",
                path.display(),
                sub.i,
                sub.j
            );
            false
        }
    }
}

/// Cache fast path. Ok(false) means "not applicable", not an error.
fn try_cache_decode(
    source: &Path,
    cache_file: &Path,
    src_dims: (u32, u32),
    targets: &mut [DecodeTarget<'_>],
    acc: &mut Vec<u32>,
) -> Result<bool> {
    if !cache_file.exists() {
        return Ok(false);
    }
    let shift = cache_shift(src_dims.0, src_dims.1);
    if targets
        .iter()
        .any(|t| t.shift < shift || t.w as u64 * t.h as u64 > MAX_CACHE_PIXELS as u64)
    {
        return Ok(false);
    }

    let img = image::open(cache_file)?.to_rgba8();
    let (cw, ch) = img.dimensions();
    let expected = (reduced_dim(src_dims.0, shift), reduced_dim(src_dims.1, shift));
    if (cw, ch) != expected {
        bail!(
            "cache image is {cw}x{ch} but the alignment schedule expects {}x{}",
            expected.0,
            expected.1
        );
    }

    fill_targets(img.as_raw(), cw, ch, shift, targets, acc);
    debug!("served {} from cache ({cw}x{ch})", source.display());
    Ok(true)
}

fn full_decode(path: &Path, targets: &mut [DecodeTarget<'_>], acc: &mut Vec<u32>) -> Result<()> {
    let img = match SourceKind::of(path) {
        SourceKind::Raster => image::open(path)
            .with_context(|| format!("decoding {}", path.display()))?
            .to_rgba8(),
        SourceKind::Container => {
            let tmp = extract_container_member(path)?;
            // The temporary file is removed when `tmp` drops
            image::open(tmp.path())
                .with_context(|| format!("decoding embedded raster of {}", path.display()))?
                .to_rgba8()
        }
        SourceKind::Placeholder => unreachable!("handled by the caller"),
    };

    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        bail!("{} decoded to zero size", path.display());
    }
    fill_targets(img.as_raw(), w, h, 0, targets, acc);
    Ok(())
}

/// Reduce decoded pixels (already at `src_shift`) into every target buffer
fn fill_targets(
    pixels: &[u8],
    w: u32,
    h: u32,
    src_shift: u32,
    targets: &mut [DecodeTarget<'_>],
    acc: &mut Vec<u32>,
) {
    for t in targets {
        t.buffer.allocate(t.w, t.h);
        reduce(
            pixels,
            w,
            Region::new(0, 0, w, h),
            t.buffer.as_mut_slice(),
            t.w,
            0,
            0,
            t.w,
            t.h,
            t.shift - src_shift,
            acc,
        );
    }
}

/// Extract the single embedded raster of a zip container to a temporary file
fn extract_container_member(path: &Path) -> Result<tempfile::NamedTempFile> {
    let file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut archive =
        zip::ZipArchive::new(file).with_context(|| format!("reading {}", path.display()))?;

    let matches: Vec<String> = archive
        .file_names()
        .filter(|n| n.ends_with(CONTAINER_RASTER_SUFFIX))
        .map(|n| n.to_string())
        .collect();
    let member = match matches.as_slice() {
        [one] => one.clone(),
        [] => bail!(
            "{} holds no member matching *{CONTAINER_RASTER_SUFFIX}",
            path.display()
        ),
        _ => bail!(
            "{} holds {} members matching *{CONTAINER_RASTER_SUFFIX}, expected one",
            path.display(),
            matches.len()
        ),
    };

    let mut entry = archive.by_name(&member)?;
    let mut tmp = tempfile::Builder::new()
        .suffix(CONTAINER_RASTER_SUFFIX)
        .tempfile()
        .context("creating temporary extraction file")?;
    io::copy(&mut entry, &mut tmp)
        .with_context(|| format!("extracting {member} from {}", path.display()))?;
    Ok(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn checker_image(w: u32, h: u32) -> image::RgbaImage {
        image::RgbaImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgba([255, 0, 0, 255])
            } else {
                image::Rgba([0, 0, 255, 255])
            }
        })
    }

    #[test]
    fn cache_path_naming() {
        let p = cache_path(Path::new("/maps/row3/sheet_07.tif"));
        assert_eq!(
            p,
            Path::new("/maps/row3/__cache__/tif_sheet_07.png")
        );
    }

    #[test]
    fn cache_shift_fits_budget() {
        assert_eq!(cache_shift(512, 512), 0);
        let s = cache_shift(8192, 8192);
        assert!(reduced_dim(8192, s) * reduced_dim(8192, s) <= MAX_CACHE_PIXELS);
        assert!(reduced_dim(8192, s - 1) * reduced_dim(8192, s - 1) > MAX_CACHE_PIXELS);
    }

    #[test]
    fn cache_shift_handles_gigapixel_sources() {
        // 65536x65536 exceeds u32 as a pixel count; the schedule must still
        // land on the finest level that fits the budget
        let s = cache_shift(65536, 65536);
        assert_eq!(s, 7);
        assert_eq!(reduced_dim(65536, s) * reduced_dim(65536, s), MAX_CACHE_PIXELS);
    }

    #[test]
    fn source_kind_by_extension() {
        assert_eq!(SourceKind::of(Path::new("a/b.png")), SourceKind::Raster);
        assert_eq!(SourceKind::of(Path::new("a/b.ZIP")), SourceKind::Container);
        assert_eq!(SourceKind::of(Path::new("a/EMPTY")), SourceKind::Placeholder);
    }

    #[test]
    fn placeholder_loads_trivially() {
        let mut buffer = PixelBuffer::new();
        buffer.allocate(2, 2);
        let mut targets = [DecodeTarget {
            shift: 0,
            w: 2,
            h: 2,
            buffer: &mut buffer,
        }];
        let mut acc = Vec::new();
        assert!(load_as_rgba(
            Path::new("EMPTY"),
            None,
            SubGridIndex::new(0, 0),
            (0, 0),
            &mut targets,
            &mut acc,
        ));
        assert!(!buffer.has_data());
    }

    #[test]
    fn container_decode_matches_direct() {
        let dir = tempfile::tempdir().unwrap();
        let img = checker_image(6, 4);

        let direct = dir.path().join("sheet.tif");
        img.save(&direct).unwrap();

        let container = dir.path().join("sheet.zip");
        let zip_file = fs::File::create(&container).unwrap();
        let mut writer = zip::ZipWriter::new(zip_file);
        writer
            .start_file("nested/sheet.tif", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(&fs::read(&direct).unwrap()).unwrap();
        writer.finish().unwrap();

        let mut acc = Vec::new();
        let mut from_direct = PixelBuffer::new();
        let mut targets = [DecodeTarget {
            shift: 0,
            w: 6,
            h: 4,
            buffer: &mut from_direct,
        }];
        assert!(load_as_rgba(
            &direct,
            None,
            SubGridIndex::new(0, 0),
            (6, 4),
            &mut targets,
            &mut acc,
        ));

        let mut from_container = PixelBuffer::new();
        let mut targets = [DecodeTarget {
            shift: 0,
            w: 6,
            h: 4,
            buffer: &mut from_container,
        }];
        assert!(load_as_rgba(
            &container,
            None,
            SubGridIndex::new(0, 0),
            (6, 4),
            &mut targets,
            &mut acc,
        ));

        assert_eq!(from_direct.as_slice(), from_container.as_slice());
        assert_eq!(from_direct.as_slice(), img.as_raw().as_slice());
    }

    #[test]
    fn stale_cache_image_falls_back_to_full_decode() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("sheet.png");
        checker_image(8, 8).save(&source).unwrap();

        // A cache image whose dimensions do not match the alignment schedule
        // (schedule says shift 0 for an 8x8 source, so 8x8 is expected)
        let cache = cache_path(&source);
        fs::create_dir_all(cache.parent().unwrap()).unwrap();
        checker_image(3, 3).save(&cache).unwrap();

        let mut buffer = PixelBuffer::new();
        let mut targets = [DecodeTarget {
            shift: 0,
            w: 8,
            h: 8,
            buffer: &mut buffer,
        }];
        let mut acc = Vec::new();
        assert!(load_as_rgba(
            &source,
            Some(&cache),
            SubGridIndex::new(0, 0),
            (8, 8),
            &mut targets,
            &mut acc,
        ));
        // Cross-check rejected the cache; pixels came from the full decode
        assert_eq!(buffer.as_slice(), checker_image(8, 8).as_raw().as_slice());
    }

    #[test]
    fn matching_cache_image_is_substituted() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("sheet.png");
        checker_image(8, 8).save(&source).unwrap();

        // Valid cache at shift 0, but green so substitution is observable
        let cache = cache_path(&source);
        fs::create_dir_all(cache.parent().unwrap()).unwrap();
        let green = image::RgbaImage::from_pixel(8, 8, image::Rgba([0, 200, 0, 255]));
        green.save(&cache).unwrap();

        let mut buffer = PixelBuffer::new();
        let mut targets = [DecodeTarget {
            shift: 1,
            w: 4,
            h: 4,
            buffer: &mut buffer,
        }];
        let mut acc = Vec::new();
        assert!(load_as_rgba(
            &source,
            Some(&cache),
            SubGridIndex::new(0, 0),
            (8, 8),
            &mut targets,
            &mut acc,
        ));
        assert_eq!(&buffer.as_slice()[0..4], &[0, 200, 0, 255]);
    }
}
