mod cli;

use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use mosaicview::MosaicSystem;
use mosaicview::mosaic::cache::PyramidCache;
use mosaicview::mosaic::mirror::{DisplayMirror, SoftwareMirror};

/// Screen size used by the headless snapshot mode
const SNAPSHOT_SCREEN: (u32, u32) = (1280, 960);

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        eprintln!("{}", cli::USAGE);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = cli::Args::parse();
    let descriptor = cli::build_descriptor(&args)?;

    if args.build_cache {
        let cache = PyramidCache::read_grid_info(descriptor)?;
        let keep_running = AtomicBool::new(true);
        cache.setup_grid_cache(&keep_running)?;
        info!("cache generation finished");
        return Ok(());
    }

    // Window, input handling, and on-screen compositing live in an embedding
    // application; standalone, the binary loads the view around the grid
    // center and writes one composed frame.
    let mut system = MosaicSystem::new(descriptor)?;
    let cache = system.cache().clone();
    let center = (
        cache.descriptor().grid_w() as f64 / 2.0,
        cache.descriptor().grid_h() as f64 / 2.0,
    );
    system.update_viewport(0, center, SNAPSHOT_SCREEN);

    let center_cell = mosaicview::mosaic::cell::GridIndex::new(
        center.0.floor() as i32,
        center.1.floor() as i32,
    );
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cache.is_loaded(center_cell, 0) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    // Grace period so neighbors settle too
    std::thread::sleep(Duration::from_millis(250));

    let view =
        mosaicview::ViewportSnapshot::new(0, center, cache.max_cell_px(), SNAPSHOT_SCREEN);
    let mut mirror = SoftwareMirror::new();
    mirror.refresh(&cache, &view);
    let (frame, w, h) = mirror.frame();
    let img = image::RgbaImage::from_raw(w, h, frame.to_vec())
        .context("mirror frame does not match its dimensions")?;
    img.save("view.png").context("writing view.png")?;
    info!("wrote view.png ({w}x{h})");

    system.shutdown();
    Ok(())
}
