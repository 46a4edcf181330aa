//! Bounding volumes, rays and geometry purposes.

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box.
///
/// Two "nothing" states exist:
/// - [`BBox3::EMPTY`]: inverted infinite box, identity for `union`.
///   Used while accumulating extents.
/// - [`BBox3::ZERO`]: degenerate box at the origin. This is what the host
///   sees for a shape with nothing drawable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox3 {
    pub min: DVec3,
    pub max: DVec3,
}

impl BBox3 {
    pub const EMPTY: BBox3 = BBox3 {
        min: DVec3::INFINITY,
        max: DVec3::NEG_INFINITY,
    };

    pub const ZERO: BBox3 = BBox3 {
        min: DVec3::ZERO,
        max: DVec3::ZERO,
    };

    /// Box from two corners, reordered so min <= max per axis.
    pub fn new(a: DVec3, b: DVec3) -> Self {
        Self { min: a.min(b), max: a.max(b) }
    }

    pub fn from_arrays(min: [f64; 3], max: [f64; 3]) -> Self {
        Self::new(DVec3::from_array(min), DVec3::from_array(max))
    }

    /// True if any axis is inverted (nothing enclosed).
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// True for a zero-volume box collapsed to a point.
    pub fn is_degenerate(&self) -> bool {
        !self.is_empty() && self.min == self.max
    }

    pub fn union(&self, other: &BBox3) -> BBox3 {
        BBox3 {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> DVec3 {
        if self.is_empty() { DVec3::ZERO } else { self.max - self.min }
    }

    /// Per-corner linear interpolation between two boxes.
    pub fn lerp(&self, other: &BBox3, alpha: f64) -> BBox3 {
        BBox3 {
            min: self.min.lerp(other.min, alpha),
            max: self.max.lerp(other.max, alpha),
        }
    }

    pub fn contains(&self, p: DVec3) -> bool {
        !self.is_empty()
            && p.x >= self.min.x && p.x <= self.max.x
            && p.y >= self.min.y && p.y <= self.max.y
            && p.z >= self.min.z && p.z <= self.max.z
    }

    /// Slab test. Returns the entry distance along the ray and the normal
    /// of the face that was hit. A ray starting inside reports the exit face.
    pub fn intersect(&self, ray: &Ray) -> Option<(f64, DVec3)> {
        if self.is_empty() {
            return None;
        }
        let dir = ray.direction;
        let mut t_near = f64::NEG_INFINITY;
        let mut t_far = f64::INFINITY;
        let mut near_axis = 0usize;
        let mut far_axis = 0usize;

        for axis in 0..3 {
            let o = ray.origin[axis];
            let d = dir[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);
            if d.abs() < f64::EPSILON {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }
            let mut t0 = (lo - o) / d;
            let mut t1 = (hi - o) / d;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            if t0 > t_near {
                t_near = t0;
                near_axis = axis;
            }
            if t1 < t_far {
                t_far = t1;
                far_axis = axis;
            }
            if t_near > t_far {
                return None;
            }
        }

        if t_far < 0.0 {
            return None;
        }
        let (t, axis) = if t_near >= 0.0 { (t_near, near_axis) } else { (t_far, far_axis) };
        let mut normal = DVec3::ZERO;
        // Entry faces point against the ray, exit faces along it.
        normal[axis] = if t_near >= 0.0 { -dir[axis].signum() } else { dir[axis].signum() };
        Some((t, normal))
    }
}

impl Default for BBox3 {
    fn default() -> Self {
        BBox3::ZERO
    }
}

/// Ray in the shape's local space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: DVec3,
    pub direction: DVec3,
}

impl Ray {
    pub fn new(origin: DVec3, direction: DVec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    pub fn at(&self, t: f64) -> DVec3 {
        self.origin + self.direction * t
    }
}

/// Geometry purpose of a prim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    #[default]
    Default,
    Render,
    Proxy,
    Guide,
}

/// Which purposes participate in traversal. `Default` always does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PurposeFilter {
    pub render: bool,
    pub proxy: bool,
    pub guide: bool,
}

impl PurposeFilter {
    pub fn includes(&self, purpose: Purpose) -> bool {
        match purpose {
            Purpose::Default => true,
            Purpose::Render => self.render,
            Purpose::Proxy => self.proxy,
            Purpose::Guide => self.guide,
        }
    }
}

impl Default for PurposeFilter {
    fn default() -> Self {
        Self {
            render: crate::config::DEFAULT_DRAW_RENDER_PURPOSE,
            proxy: crate::config::DEFAULT_DRAW_PROXY_PURPOSE,
            guide: crate::config::DEFAULT_DRAW_GUIDE_PURPOSE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> BBox3 {
        BBox3::from_arrays([-1.0, -1.0, -1.0], [1.0, 1.0, 1.0])
    }

    #[test]
    fn test_empty_union_identity() {
        let b = unit();
        assert!(BBox3::EMPTY.is_empty());
        assert_eq!(BBox3::EMPTY.union(&b), b);
        assert!(BBox3::ZERO.is_degenerate());
        assert_eq!(BBox3::EMPTY.size(), DVec3::ZERO);
    }

    #[test]
    fn test_ray_hits_front_face() {
        let ray = Ray::new(DVec3::new(0.0, 0.0, 5.0), DVec3::new(0.0, 0.0, -1.0));
        let (t, n) = unit().intersect(&ray).unwrap();
        assert!((t - 4.0).abs() < 1e-9);
        assert_eq!(n, DVec3::Z);
        assert_eq!(ray.at(t), DVec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_ray_miss_and_behind() {
        let miss = Ray::new(DVec3::new(3.0, 0.0, 5.0), DVec3::new(0.0, 0.0, -1.0));
        assert!(unit().intersect(&miss).is_none());
        let behind = Ray::new(DVec3::new(0.0, 0.0, 5.0), DVec3::new(0.0, 0.0, 1.0));
        assert!(unit().intersect(&behind).is_none());
    }

    #[test]
    fn test_purpose_filter() {
        let f = PurposeFilter { render: false, proxy: true, guide: false };
        assert!(f.includes(Purpose::Default));
        assert!(f.includes(Purpose::Proxy));
        assert!(!f.includes(Purpose::Guide));
    }
}
