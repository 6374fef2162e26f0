//! Cross-format decode equivalence: the same 5x4 pixel content stored as PNG
//! and as TIFF must come out of the codec adapter byte-identical, matching a
//! fixed reference sequence.

use std::path::Path;

use mosaicview::mosaic::cell::{PixelBuffer, SubGridIndex};
use mosaicview::mosaic::codec::{self, DecodeTarget};

/// 5x4 packed RGBA reference, row-major
#[rustfmt::skip]
const REFERENCE: [u8; 80] = [
    255, 0, 0, 255,    0, 255, 0, 255,    0, 0, 255, 255,    255, 255, 0, 255,    0, 255, 255, 255,
    128, 0, 0, 255,    0, 128, 0, 255,    0, 0, 128, 255,    128, 128, 0, 255,    0, 128, 128, 255,
    64, 64, 64, 255,   192, 192, 192, 255, 255, 255, 255, 255, 0, 0, 0, 255,     32, 16, 8, 255,
    10, 20, 30, 40,    50, 60, 70, 80,    90, 100, 110, 120,  130, 140, 150, 160, 170, 180, 190, 200,
];

fn decode_full(path: &Path) -> Vec<u8> {
    let mut buffer = PixelBuffer::new();
    let mut targets = [DecodeTarget {
        shift: 0,
        w: 5,
        h: 4,
        buffer: &mut buffer,
    }];
    let mut acc = Vec::new();
    assert!(
        codec::load_as_rgba(
            path,
            None,
            SubGridIndex::new(0, 0),
            (5, 4),
            &mut targets,
            &mut acc,
        ),
        "decode of {} failed",
        path.display()
    );
    buffer.as_slice().to_vec()
}

#[test]
fn png_and_tiff_sources_decode_identically() {
    let dir = tempfile::tempdir().unwrap();
    let img = image::RgbaImage::from_raw(5, 4, REFERENCE.to_vec()).unwrap();

    let png = dir.path().join("sheet.png");
    let tiff = dir.path().join("sheet.tif");
    img.save(&png).unwrap();
    img.save(&tiff).unwrap();

    assert_eq!(codec::read_dimensions(&png).unwrap(), (5, 4));
    assert_eq!(codec::read_dimensions(&tiff).unwrap(), (5, 4));

    let from_png = decode_full(&png);
    let from_tiff = decode_full(&tiff);

    assert_eq!(from_png.as_slice(), REFERENCE.as_slice());
    assert_eq!(from_tiff.as_slice(), REFERENCE.as_slice());
    assert_eq!(from_png, from_tiff);
}
