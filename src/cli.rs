//! Command-line surface of the viewer binary

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;

use mosaicview::mosaic::descriptor::GridDescriptor;

pub const USAGE: &str =
    "usage: mosaicview -w WIDTH -h HEIGHT [-c] [-d] PATH|FILES... | mosaicview [-c] [-d] -f TEXTFILE";

#[derive(Parser, Debug)]
#[command(name = "mosaicview", disable_help_flag = true)]
pub struct Args {
    /// Grid width in cells
    #[arg(short = 'w')]
    pub width: Option<u32>,

    /// Grid height in cells
    #[arg(short = 'h')]
    pub height: Option<u32>,

    /// Generate the on-disk downsampled cache, then exit
    #[arg(short = 'c')]
    pub build_cache: bool,

    /// Use the on-disk downsampled cache when loading
    #[arg(short = 'd')]
    pub use_cache: bool,

    /// Structured grid descriptor file (replaces -w/-h and the file list)
    #[arg(short = 'f')]
    pub descriptor: Option<PathBuf>,

    /// Source rasters in row-major order, or one directory holding them
    pub inputs: Vec<PathBuf>,

    #[arg(long, action = clap::ArgAction::Help, help = "Print help")]
    help: Option<bool>,
}

/// Raster extensions accepted when expanding a directory argument
const RASTER_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "tif", "tiff", "zip"];

pub fn build_descriptor(args: &Args) -> Result<GridDescriptor> {
    if let Some(descriptor) = &args.descriptor {
        if args.width.is_some() || args.height.is_some() || !args.inputs.is_empty() {
            bail!("-f cannot be combined with -w/-h or a file list");
        }
        return GridDescriptor::from_descriptor_file(descriptor, args.build_cache, args.use_cache);
    }

    let (Some(width), Some(height)) = (args.width, args.height) else {
        bail!("either -f TEXTFILE or both -w and -h are required");
    };
    if width == 0 || height == 0 {
        bail!("grid dimensions must be positive");
    }

    let files = expand_inputs(&args.inputs)?;
    GridDescriptor::from_files(width, height, &files, args.build_cache, args.use_cache)
}

/// A single directory argument expands to its sorted raster files; anything
/// else is taken verbatim, in order
fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<String>> {
    if inputs.is_empty() {
        bail!("no input files given");
    }
    if inputs.len() == 1 && inputs[0].is_dir() {
        let dir = &inputs[0];
        let mut files: Vec<String> = std::fs::read_dir(dir)
            .with_context(|| format!("reading directory {}", dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| {
                        RASTER_EXTENSIONS.iter().any(|r| ext.eq_ignore_ascii_case(r))
                    })
            })
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        files.sort();
        return Ok(files);
    }
    Ok(inputs
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_grid_arguments() {
        let args = Args::parse_from(["mosaicview", "-w", "2", "-h", "1", "a.png", "b.png"]);
        let desc = build_descriptor(&args).unwrap();
        assert_eq!(desc.grid_w(), 2);
        assert_eq!(desc.grid_h(), 1);
        assert!(!desc.do_cache());
        assert!(!desc.use_cache());
    }

    #[test]
    fn cache_flags_reach_the_descriptor() {
        let args = Args::parse_from(["mosaicview", "-c", "-d", "-w", "1", "-h", "1", "a.png"]);
        let desc = build_descriptor(&args).unwrap();
        assert!(desc.do_cache());
        assert!(desc.use_cache());
    }

    #[test]
    fn mismatched_count_aborts() {
        let args = Args::parse_from(["mosaicview", "-w", "3", "-h", "2", "a.png"]);
        assert!(build_descriptor(&args).is_err());
    }

    #[test]
    fn directory_argument_expands_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.tif", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let files = expand_inputs(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.tif"));
        assert!(files[1].ends_with("b.png"));
    }
}
