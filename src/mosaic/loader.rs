//! Background loader thread driving the scheduling passes

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use log::warn;

use super::cache::PyramidCache;
use super::mailbox::ViewportMailbox;

/// Owns the loader thread and its shutdown flag
///
/// The loop is cooperative polling: one scheduling pass per iteration, a
/// yield in between, last-value-wins viewport reads from the mailbox. All
/// decode work happens on this thread; the interactive thread never blocks
/// on it.
pub struct Loader {
    keep_running: Arc<AtomicBool>,
    worker_handle: Option<JoinHandle<()>>,
}

impl Loader {
    pub fn new(cache: Arc<PyramidCache>, mailbox: Arc<ViewportMailbox>) -> Self {
        let keep_running = Arc::new(AtomicBool::new(true));
        let worker_handle = {
            let keep_running = keep_running.clone();
            Some(std::thread::spawn(move || {
                Self::worker_thread(cache, mailbox, keep_running);
            }))
        };
        Self {
            keep_running,
            worker_handle,
        }
    }

    /// Request shutdown and wait for the worker to exit. The cancellation
    /// flag is polled inside the pass too, so this does not wait for a whole
    /// grid sweep.
    pub fn stop(&mut self) {
        self.keep_running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.worker_handle.take() {
            if handle.join().is_err() {
                warn!("loader thread panicked before shutdown");
            }
        }
    }

    fn worker_thread(
        cache: Arc<PyramidCache>,
        mailbox: Arc<ViewportMailbox>,
        keep_running: Arc<AtomicBool>,
    ) {
        let mut acc = Vec::new();
        while keep_running.load(Ordering::Relaxed) {
            let (view, _changed) = mailbox.read();
            if view.valid {
                cache.load_grid(&view, &keep_running, &mut acc);
            }
            std::thread::yield_now();
        }
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mosaic::descriptor::GridDescriptor;

    #[test]
    fn loader_loads_published_viewport_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = Vec::new();
        for k in 0..4 {
            let path = dir.path().join(format!("cell_{k}.png"));
            image::RgbaImage::from_pixel(32, 32, image::Rgba([k as u8, 0, 0, 255]))
                .save(&path)
                .unwrap();
            files.push(path.to_string_lossy().into_owned());
        }
        let desc = GridDescriptor::from_files(2, 2, &files, false, false).unwrap();
        let cache = Arc::new(PyramidCache::read_grid_info(desc).unwrap());
        let mailbox = Arc::new(ViewportMailbox::new());

        let mut loader = Loader::new(cache.clone(), mailbox.clone());
        mailbox.update(0, (0.5, 0.5), cache.max_cell_px(), (640, 480));

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while !cache.is_loaded(crate::mosaic::cell::GridIndex::new(0, 0), 0) {
            assert!(std::time::Instant::now() < deadline, "loader made no progress");
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        loader.stop();
        // A second stop has no handle left to join
        loader.stop();
    }
}
