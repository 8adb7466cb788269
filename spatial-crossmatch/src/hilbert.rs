//! Hilbert ordering for packing index pages.
//!
//! Entries whose centers are close in space land close together along the
//! curve, so consecutive runs of the ordering make tight leaf pages. Only the
//! first two dimensions take part; a one dimensional extent is placed on the
//! horizontal midline.

use crate::extent::Extent;

/// Curve order used by the index builder.
pub const DEFAULT_HILBERT_ORDER: u32 = 16;

const MAX_HILBERT_ORDER: u32 = 31;

/// Maps a point of the unit square to its distance along the curve.
///
/// Coordinates are clamped to `[0, 1]`; `order` is clamped to `1..=31`.
pub fn hilbert_index(x: f64, y: f64, order: u32) -> u64 {
    let order = order.clamp(1, MAX_HILBERT_ORDER);
    let side = 1u64 << order;
    let cell = |v: f64| ((v.clamp(0.0, 1.0) * side as f64) as u64).min(side - 1);

    xy2d(side, cell(x), cell(y))
}

/// Maps the center of `extent` into `bounds` and returns its curve distance.
pub fn hilbert_key(extent: &Extent, bounds: &Extent, order: u32) -> u64 {
    let center = extent.center();
    let normalize = |dim: usize| {
        let Some(value) = center.get(dim) else {
            return 0.5;
        };
        let range = bounds.max(dim) - bounds.min(dim);
        if range > 0.0 {
            (value - bounds.min(dim)) / range
        } else {
            0.5
        }
    };

    hilbert_index(normalize(0), normalize(1), order)
}

fn xy2d(side: u64, mut x: u64, mut y: u64) -> u64 {
    let mut d = 0u64;
    let mut s = side / 2;

    while s > 0 {
        let rx = u64::from(x & s > 0);
        let ry = u64::from(y & s > 0);
        d += s * s * ((3 * rx) ^ ry);

        // rotate the quadrant so the sub-curve keeps its orientation
        if ry == 0 {
            if rx == 1 {
                x = s - 1 - (x & (s - 1));
                y = s - 1 - (y & (s - 1));
            }
            std::mem::swap(&mut x, &mut y);
        }
        s /= 2;
    }
    d
}
