//! Turns a ledger's ordered `(address, size)` walk into positions in 3D
//! space. Drawing them is the front-end's business, this only does the
//! arithmetic.
//!
//! Blocks are laid out in rows of [`LayoutParams::row_width`] along `z`, rows
//! stack up along `y`, and `x` is the block's distance in address space from
//! the first address the layout ever saw. Each block's width is its size, so
//! with the right `distance_scale` neighbouring blocks in memory line up.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::alloc::ledger::Entry;

pub const MIN_DISTANCE_SCALE: f64 = 0.000_000_01;
pub const MAX_DISTANCE_SCALE: f64 = 1. / MIN_DISTANCE_SCALE;

/// Multiplier for each zoom/grow/shrink step
pub const SCALE_STEP: f64 = 1.1;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutParams {
    /// Blocks per row, at least 1
    pub row_width: usize,
    /// World units per byte of address distance
    pub distance_scale: f64,
    /// Edge length of a block's cell
    pub cube_scale: f64,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            row_width: 10,
            distance_scale: MIN_DISTANCE_SCALE,
            cube_scale: 1.,
        }
    }
}

impl LayoutParams {
    pub fn widen(&mut self) {
        self.row_width = self.row_width.saturating_add(1);
    }

    pub fn narrow(&mut self) {
        self.row_width = self.row_width.saturating_sub(1).max(1);
    }

    pub fn zoom_in(&mut self) {
        self.distance_scale = (self.distance_scale * SCALE_STEP).min(MAX_DISTANCE_SCALE);
    }

    pub fn zoom_out(&mut self) {
        self.distance_scale = (self.distance_scale / SCALE_STEP).max(MIN_DISTANCE_SCALE);
    }

    pub fn grow(&mut self) {
        self.cube_scale *= SCALE_STEP;
    }

    pub fn shrink(&mut self) {
        self.cube_scale /= SCALE_STEP;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0., 0., 0.);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

/// Where one block goes
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// Position in the walk
    pub index: usize,
    pub entry: Entry,
    pub position: Vec3,
    /// Width (`x`), height (`y`) and depth (`z`) of the block
    pub extent: Vec3,
    /// Start of the line joining this block to the previous one
    pub link_from: Vec3,
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:<5} {:#018x} {:>6} B at {} width {:.3}",
            self.index, self.entry.address, self.entry.size, self.position, self.extent.x
        )
    }
}

#[derive(Clone, Debug, Default)]
pub struct Layout {
    pub params: LayoutParams,
    origin: Option<usize>,
}

impl Layout {
    pub const fn new(params: LayoutParams) -> Self {
        Self {
            params,
            origin: None,
        }
    }

    /// The first address this layout ever placed, if any. It survives ledger
    /// drains, so successive runs are drawn against the same reference.
    pub const fn origin(&self) -> Option<usize> {
        self.origin
    }

    pub fn reset_origin(&mut self) {
        self.origin = None;
    }

    /// Lay out one frame's worth of entries, in the order given
    pub fn place<I>(&mut self, entries: I) -> Vec<Placement>
    where
        I: IntoIterator<Item = Entry>,
    {
        let LayoutParams {
            row_width,
            distance_scale,
            cube_scale,
        } = self.params;
        let row_width = row_width.max(1);

        let mut link_from = Vec3::ZERO;
        let mut placements = Vec::new();
        for (index, entry) in entries.into_iter().enumerate() {
            let origin = *self.origin.get_or_insert(entry.address);
            let distance = origin as i128 - entry.address as i128;
            let position = Vec3::new(
                distance as f64 * distance_scale * cube_scale,
                (index / row_width) as f64 * cube_scale,
                (index % row_width) as f64 * cube_scale,
            );
            placements.push(Placement {
                index,
                entry,
                position,
                extent: Vec3::new(
                    cube_scale * entry.size as f64 * distance_scale,
                    cube_scale,
                    cube_scale,
                ),
                link_from,
            });
            link_from = position;
        }
        placements
    }
}

/// Wrap a free-running selection counter onto `count` placements
pub fn select(index: usize, count: usize) -> Option<usize> {
    (count != 0).then(|| index % count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(address: usize, size: usize) -> Entry {
        Entry { address, size }
    }

    #[test]
    fn blocks_wrap_into_rows() {
        let mut layout = Layout::new(LayoutParams {
            row_width: 2,
            distance_scale: 1.,
            cube_scale: 2.,
        });
        let placements = layout.place([
            entry(1000, 10),
            entry(1010, 20),
            entry(990, 5),
        ]);
        assert_eq!(layout.origin(), Some(1000));

        assert_eq!(placements[0].position, Vec3::new(0., 0., 0.));
        assert_eq!(placements[1].position, Vec3::new(-20., 0., 2.));
        assert_eq!(placements[2].position, Vec3::new(20., 2., 0.));

        assert_eq!(placements[1].extent, Vec3::new(40., 2., 2.));
        assert_eq!(placements[0].link_from, Vec3::ZERO);
        assert_eq!(placements[2].link_from, placements[1].position);
    }

    #[test]
    fn origin_survives_between_frames() {
        let mut layout = Layout::new(LayoutParams {
            distance_scale: 1.,
            ..LayoutParams::default()
        });
        layout.place([entry(500, 1)]);
        let placements = layout.place([entry(400, 1)]);
        assert_eq!(placements[0].position.x, 100.);

        layout.reset_origin();
        let placements = layout.place([entry(400, 1)]);
        assert_eq!(placements[0].position.x, 0.);
    }

    #[test]
    fn empty_frames_leave_the_origin_alone() {
        let mut layout = Layout::default();
        assert!(layout.place(Vec::new()).is_empty());
        assert_eq!(layout.origin(), None);
    }

    #[test]
    fn params_stay_in_range() {
        let mut params = LayoutParams {
            row_width: 1,
            ..LayoutParams::default()
        };
        params.narrow();
        assert_eq!(params.row_width, 1);
        params.widen();
        assert_eq!(params.row_width, 2);

        params.zoom_out();
        assert_eq!(params.distance_scale, MIN_DISTANCE_SCALE);
        params.distance_scale = MAX_DISTANCE_SCALE;
        params.zoom_in();
        assert_eq!(params.distance_scale, MAX_DISTANCE_SCALE);

        params.grow();
        params.shrink();
        assert!((params.cube_scale - 1.).abs() < 1e-12);
    }

    #[test]
    fn selection_wraps() {
        assert_eq!(select(7, 3), Some(1));
        assert_eq!(select(3, 3), Some(0));
        assert_eq!(select(0, 0), None);
    }

    #[test]
    fn zero_row_width_is_treated_as_one() {
        let mut layout = Layout::new(LayoutParams {
            row_width: 0,
            ..LayoutParams::default()
        });
        let placements = layout.place([entry(8, 1), entry(16, 1)]);
        assert_eq!(placements[1].position.y, 1.);
        assert_eq!(placements[1].position.z, 0.);
    }
}
