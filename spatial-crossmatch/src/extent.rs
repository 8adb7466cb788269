use std::hash::Hash;

use crate::errors::{CrossmatchError, CrossmatchResult};

/// An axis-aligned box in N-dimensional space.
///
/// `Extent` is the key stored in both trees: leaf entries carry the extent of
/// one record, internal entries carry a bounding extent of their whole
/// subtree. A point is an extent whose lower and upper corners coincide.
///
/// Corners are normalized on construction, so `min(d) <= max(d)` holds for
/// every dimension.
///
/// # Examples
///
/// ```rust
/// use spatial_crossmatch::Extent;
///
/// let cell = Extent::rect(0.0, 0.0, 1.0, 1.0);
/// let star = Extent::point(vec![0.5, 0.5]).unwrap();
/// assert!(cell.overlaps(&star));
/// ```
#[derive(Clone, PartialEq, Debug, serde::Deserialize, serde::Serialize)]
pub struct Extent {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl Eq for Extent {}

impl Hash for Extent {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for v in self.min.iter().chain(self.max.iter()) {
            v.to_bits().hash(state);
        }
    }
}

impl std::fmt::Display for Extent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let join = |values: &[f64]| {
            values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        if self.is_point() {
            write!(f, "({})", join(&self.min))
        } else {
            write!(f, "({}),({})", join(&self.min), join(&self.max))
        }
    }
}

impl Extent {
    /// Creates an extent from two opposite corners.
    ///
    /// The corners may be given in any order per dimension. Fails when the
    /// corners have different or zero dimensionality, or when a coordinate is
    /// not finite.
    pub fn new(a: Vec<f64>, b: Vec<f64>) -> CrossmatchResult<Extent> {
        if a.is_empty() || a.len() != b.len() {
            return Err(CrossmatchError::InvalidOperation(format!(
                "extent corners must share a non-zero dimension ({} vs {})",
                a.len(),
                b.len()
            )));
        }
        if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
            return Err(CrossmatchError::InvalidOperation(
                "extent coordinates must be finite".into(),
            ));
        }

        let (min, max) = a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x.min(*y), x.max(*y)))
            .unzip();
        Ok(Extent { min, max })
    }

    /// Creates a degenerate extent covering a single point.
    pub fn point(coords: Vec<f64>) -> CrossmatchResult<Extent> {
        Extent::new(coords.clone(), coords)
    }

    /// Creates a two dimensional box.
    pub fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Extent {
        Extent {
            min: vec![min_x.min(max_x), min_y.min(max_y)],
            max: vec![min_x.max(max_x), min_y.max(max_y)],
        }
    }

    /// Number of dimensions.
    pub fn dimensions(&self) -> usize {
        self.min.len()
    }

    /// Lower bound along `dim`, zero when `dim` is beyond this extent.
    pub fn min(&self, dim: usize) -> f64 {
        self.min.get(dim).copied().unwrap_or(0.0)
    }

    /// Upper bound along `dim`, zero when `dim` is beyond this extent.
    pub fn max(&self, dim: usize) -> f64 {
        self.max.get(dim).copied().unwrap_or(0.0)
    }

    pub fn lower(&self) -> &[f64] {
        &self.min
    }

    pub fn upper(&self) -> &[f64] {
        &self.max
    }

    /// Checks if this extent overlaps another one, boundaries included.
    ///
    /// When the extents differ in dimensionality the missing dimensions of the
    /// smaller one are taken as zero, so the larger extent must straddle zero
    /// there.
    pub fn overlaps(&self, other: &Extent) -> bool {
        let (small, large) = if self.dimensions() <= other.dimensions() {
            (self, other)
        } else {
            (other, self)
        };

        for d in 0..small.dimensions() {
            if small.min[d] > large.max[d] || small.max[d] < large.min[d] {
                return false;
            }
        }
        for d in small.dimensions()..large.dimensions() {
            if large.min[d] > 0.0 || large.max[d] < 0.0 {
                return false;
            }
        }
        true
    }

    /// Returns the smallest extent covering both.
    pub fn union(&self, other: &Extent) -> Extent {
        let dims = self.dimensions().max(other.dimensions());
        Extent {
            min: (0..dims).map(|d| self.min(d).min(other.min(d))).collect(),
            max: (0..dims).map(|d| self.max(d).max(other.max(d))).collect(),
        }
    }

    /// Grows this extent in place to cover `other`.
    pub fn expand(&mut self, other: &Extent) {
        *self = self.union(other);
    }

    /// Returns the center point.
    pub fn center(&self) -> Vec<f64> {
        self.min
            .iter()
            .zip(self.max.iter())
            .map(|(lo, hi)| (lo + hi) / 2.0)
            .collect()
    }

    /// Checks if this extent is a point (zero volume along every axis).
    pub fn is_point(&self) -> bool {
        self.min == self.max
    }

    /// Folds a sequence of optional extents into their union, skipping nulls.
    pub fn union_all<'a, I>(extents: I) -> Option<Extent>
    where
        I: IntoIterator<Item = &'a Extent>,
    {
        extents.into_iter().fold(None, |acc: Option<Extent>, e| match acc {
            Some(mut acc) => {
                acc.expand(e);
                Some(acc)
            }
            None => Some(e.clone()),
        })
    }
}

/// The overlap predicate used at every pairing decision.
///
/// Pure and symmetric; see [`Extent::overlaps`].
#[inline]
pub fn overlaps(a: &Extent, b: &Extent) -> bool {
    a.overlaps(b)
}
