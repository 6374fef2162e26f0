//! Ring-by-ring cell visitation orders centered on the viewport
//!
//! Both variants precompute the complete order at construction and serve it
//! via a plain dequeue; the loader consumes one order per scheduling pass.

use std::collections::VecDeque;

use super::cell::GridIndex;

/// Inclusive cell-index bounds of a (conservative) visible region
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CellBounds {
    pub left: i32,
    pub right: i32,
    pub top: i32,
    pub bottom: i32,
}

impl CellBounds {
    pub fn contains(&self, idx: GridIndex) -> bool {
        idx.i >= self.left && idx.i <= self.right && idx.j >= self.top && idx.j <= self.bottom
    }

    /// Chebyshev distance from `center` to the farthest corner
    pub fn farthest_chebyshev(&self, center: GridIndex) -> i32 {
        let di = (center.i - self.left).abs().max((center.i - self.right).abs());
        let dj = (center.j - self.top).abs().max((center.j - self.bottom).abs());
        di.max(dj)
    }
}

/// Precomputed concentric-ring visitation order
pub struct SpiralOrder {
    order: VecDeque<GridIndex>,
}

impl SpiralOrder {
    /// Order covering every cell of a `grid_w x grid_h` grid, centered on the
    /// viewport cell clamped into grid bounds
    pub fn full(center: GridIndex, grid_w: u32, grid_h: u32) -> Self {
        let clamped = GridIndex::new(
            center.i.clamp(0, grid_w as i32 - 1),
            center.j.clamp(0, grid_h as i32 - 1),
        );
        let max_radius = grid_w.max(grid_h) as i32;
        let mut order = VecDeque::new();
        for r in 0..=max_radius {
            push_ring(&mut order, clamped, r, |idx| in_grid(idx, grid_w, grid_h));
        }
        Self { order }
    }

    /// Order covering the conservative visible region, centered on the
    /// (unclamped) viewport cell; out-of-bounds entries are dropped here, at
    /// construction
    pub fn visible(center: GridIndex, bounds: CellBounds, grid_w: u32, grid_h: u32) -> Self {
        let max_radius = bounds.farthest_chebyshev(center);
        let mut order = VecDeque::new();
        for r in 0..=max_radius {
            push_ring(&mut order, center, r, |idx| {
                bounds.contains(idx) && in_grid(idx, grid_w, grid_h)
            });
        }
        Self { order }
    }

    pub fn next_cell(&mut self) -> Option<GridIndex> {
        self.order.pop_front()
    }

    pub fn remaining(&self) -> usize {
        self.order.len()
    }
}

fn in_grid(idx: GridIndex, grid_w: u32, grid_h: u32) -> bool {
    idx.i >= 0 && idx.j >= 0 && (idx.i as u32) < grid_w && (idx.j as u32) < grid_h
}

/// One ring at Chebyshev radius `r`: top edge, right edge, bottom edge, left
/// edge, corners visited once
fn push_ring<F: Fn(GridIndex) -> bool>(
    order: &mut VecDeque<GridIndex>,
    center: GridIndex,
    r: i32,
    keep: F,
) {
    let mut push = |i, j| {
        let idx = GridIndex::new(i, j);
        if keep(idx) {
            order.push_back(idx);
        }
    };

    if r == 0 {
        push(center.i, center.j);
        return;
    }
    for i in (center.i - r)..=(center.i + r) {
        push(i, center.j - r);
    }
    for j in (center.j - r + 1)..=(center.j + r) {
        push(center.i + r, j);
    }
    for i in ((center.i - r)..=(center.i + r - 1)).rev() {
        push(i, center.j + r);
    }
    for j in ((center.j - r + 1)..=(center.j + r - 1)).rev() {
        push(center.i - r, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn full_order_visits_every_cell_once_in_ring_order() {
        let (w, h) = (7u32, 5u32);
        // Center deliberately outside the grid; it must be clamped
        let mut order = SpiralOrder::full(GridIndex::new(9, -2), w, h);
        let center = GridIndex::new(6, 0);

        let mut seen = HashSet::new();
        let mut last_distance = 0;
        while let Some(idx) = order.next_cell() {
            assert!(in_grid(idx, w, h), "{idx:?} out of bounds");
            assert!(seen.insert(idx), "{idx:?} visited twice");
            let d = idx.chebyshev(&center);
            assert!(d >= last_distance, "distance decreased at {idx:?}");
            last_distance = d;
        }
        assert_eq!(seen.len(), (w * h) as usize);
    }

    #[test]
    fn full_order_starts_at_center() {
        let mut order = SpiralOrder::full(GridIndex::new(2, 2), 5, 5);
        assert_eq!(order.next_cell(), Some(GridIndex::new(2, 2)));
    }

    #[test]
    fn visible_order_drops_out_of_bounds_entries() {
        let bounds = CellBounds {
            left: -2,
            right: 1,
            top: -1,
            bottom: 2,
        };
        let mut order = SpiralOrder::visible(GridIndex::new(-1, 0), bounds, 4, 4);
        let mut seen = HashSet::new();
        while let Some(idx) = order.next_cell() {
            assert!(bounds.contains(idx));
            assert!(in_grid(idx, 4, 4));
            assert!(seen.insert(idx));
        }
        // Intersection of bounds and grid: i in 0..=1, j in 0..=2
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn farthest_chebyshev_reaches_all_corners() {
        let bounds = CellBounds {
            left: 0,
            right: 10,
            top: 0,
            bottom: 4,
        };
        assert_eq!(bounds.farthest_chebyshev(GridIndex::new(2, 2)), 8);
        assert_eq!(bounds.farthest_chebyshev(GridIndex::new(-3, 0)), 13);
    }
}
