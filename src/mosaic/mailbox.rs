//! Single-slot, last-value-wins viewport handoff between threads
//!
//! The interactive thread writes a snapshot every frame; the loader reads the
//! latest one whenever it starts a pass. Intermediate updates are coalesced,
//! never queued: the loader only ever needs "where is the viewport now."

use std::sync::Mutex;

/// Immutable viewport state, passed by value
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportSnapshot {
    /// Zoom-level index (0 = full resolution)
    pub zoom: usize,
    /// Viewport position in fractional grid coordinates
    pub pos: (f64, f64),
    /// Largest cell pixel footprint at full resolution
    pub max_cell_px: u32,
    /// Current screen size in pixels
    pub screen: (u32, u32),
    /// False until the mailbox has been written at least once
    pub valid: bool,
}

impl ViewportSnapshot {
    pub fn new(zoom: usize, pos: (f64, f64), max_cell_px: u32, screen: (u32, u32)) -> Self {
        Self {
            zoom,
            pos,
            max_cell_px,
            screen,
            valid: true,
        }
    }

    fn invalid() -> Self {
        Self {
            zoom: 0,
            pos: (0.0, 0.0),
            max_cell_px: 0,
            screen: (0, 0),
            valid: false,
        }
    }
}

#[derive(Debug)]
struct Slot {
    snapshot: ViewportSnapshot,
    version: u64,
    read_version: u64,
}

/// Versioned single-slot mailbox; the version advances only when the stored
/// value actually changes, which deduplicates redundant updates while the
/// viewport is stationary
#[derive(Debug)]
pub struct ViewportMailbox {
    slot: Mutex<Slot>,
}

impl ViewportMailbox {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                snapshot: ViewportSnapshot::invalid(),
                version: 0,
                read_version: 0,
            }),
        }
    }

    /// Writer side: store the latest snapshot, marking it changed only if any
    /// field differs from the last pushed value
    pub fn update(&self, zoom: usize, pos: (f64, f64), max_cell_px: u32, screen: (u32, u32)) {
        let snapshot = ViewportSnapshot::new(zoom, pos, max_cell_px, screen);
        let mut slot = self.slot.lock().unwrap();
        if slot.snapshot != snapshot {
            slot.snapshot = snapshot;
            slot.version += 1;
        }
    }

    /// Reader side: latest snapshot plus whether it changed since the last
    /// read; clears the changed state
    pub fn read(&self) -> (ViewportSnapshot, bool) {
        let mut slot = self.slot.lock().unwrap();
        let changed = slot.version != slot.read_version;
        slot.read_version = slot.version;
        (slot.snapshot, changed)
    }
}

impl Default for ViewportMailbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_mailbox_reads_invalid() {
        let mailbox = ViewportMailbox::new();
        let (snap, changed) = mailbox.read();
        assert!(!snap.valid);
        assert!(!changed);
    }

    #[test]
    fn identical_updates_deduplicate() {
        let mailbox = ViewportMailbox::new();
        mailbox.update(2, (1.5, 3.25), 4096, (1280, 720));
        mailbox.update(2, (1.5, 3.25), 4096, (1280, 720));

        let (snap, changed) = mailbox.read();
        assert!(changed);
        assert!(snap.valid);
        assert_eq!(snap.zoom, 2);

        // The changed state was cleared and the duplicate never set it again
        let (_, changed) = mailbox.read();
        assert!(!changed);

        mailbox.update(2, (1.5, 3.25), 4096, (1280, 720));
        let (_, changed) = mailbox.read();
        assert!(!changed);
    }

    #[test]
    fn intermediate_updates_are_coalesced() {
        let mailbox = ViewportMailbox::new();
        mailbox.update(0, (0.0, 0.0), 4096, (800, 600));
        mailbox.update(1, (5.0, 5.0), 4096, (800, 600));
        mailbox.update(2, (9.0, 9.0), 4096, (800, 600));

        let (snap, changed) = mailbox.read();
        assert!(changed);
        assert_eq!(snap.zoom, 2);
        assert_eq!(snap.pos, (9.0, 9.0));
    }
}
