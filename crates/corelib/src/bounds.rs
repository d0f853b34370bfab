//! Axis-aligned extents over model positions.

use crate::Vec3;

/// Min/max corners of a set of points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Extents {
    pub min: Vec3,
    pub max: Vec3,
}

impl Extents {
    /// Extents of a single point.
    #[inline]
    pub fn point(p: Vec3) -> Self {
        Self { min: p, max: p }
    }

    /// Returns `None` for an empty iterator.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        points.into_iter().fold(None, |acc: Option<Self>, p| {
            Some(match acc {
                Some(e) => e.include(p),
                None => Self::point(p),
            })
        })
    }

    /// Extents of flat `[x, y, z, x, y, z, ...]` data. Trailing partial tuples are ignored.
    pub fn from_flat(values: &[f32]) -> Option<Self> {
        Self::from_points(values.chunks_exact(3).map(Vec3::from_slice))
    }

    #[inline]
    pub fn include(self, p: Vec3) -> Self {
        Self {
            min: self.min.min(p),
            max: self.max.max(p),
        }
    }

    #[inline]
    pub fn union(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    #[inline]
    pub fn range(&self) -> Vec3 {
        self.max - self.min
    }

    /// Translation that moves the box center to the origin.
    #[inline]
    pub fn center_offset(&self) -> Vec3 {
        -(self.min + self.range() * 0.5)
    }

    /// The eight box corners, `min` first and `max` last.
    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            lo,
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            hi,
        ]
    }

    /// Length of the box diagonal scaled by `padding`.
    #[inline]
    pub fn bounding_radius(&self, padding: f32) -> f32 {
        self.range().length() * padding
    }
}
