//! Segment vs. oriented-box intersection.

use sightline_shared::constants::PARALLEL_EPSILON;
use sightline_shared::Vec3;

use crate::occlusion::WorldPart;

/// A finite segment from `origin` along unit `direction`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    /// Start point.
    pub origin: Vec3,
    /// Unit direction.
    pub direction: Vec3,
    /// Segment length.
    pub length: f32,
}

impl Ray {
    /// The segment from `origin` to `target`. `None` when the two coincide.
    #[must_use]
    pub fn between(origin: Vec3, target: Vec3) -> Option<Self> {
        let delta = target - origin;
        let length = delta.length();
        let direction = delta.try_normalize()?;
        Some(Self {
            origin,
            direction,
            length,
        })
    }

    /// Point at parameter `t`.
    #[inline]
    #[must_use]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Result of [`ray_box_test`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RayBoxTest {
    /// Rejected by the bounding-sphere check; no slab work done.
    Culled,
    /// Slab test ran and found no intersection within the segment.
    Miss,
    /// The segment enters the box.
    Hit {
        /// Entry parameter along the ray, clamped to zero when the origin is
        /// inside the box.
        distance: f32,
    },
}

impl RayBoxTest {
    /// True for [`RayBoxTest::Hit`].
    #[inline]
    #[must_use]
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit { .. })
    }
}

/// Intersects `ray` with `part`.
///
/// A bounding-sphere reject runs first. Survivors are moved into the part's
/// local frame and tested with the slab method; an axis the ray runs
/// parallel to must already contain the origin.
#[must_use]
pub fn ray_box_test(ray: &Ray, part: &WorldPart) -> RayBoxTest {
    let reach = part.bounding_radius() + ray.length;
    if ray.origin.distance_squared(part.position) > reach * reach {
        return RayBoxTest::Culled;
    }

    let to_local = part.rotation.transpose();
    let origin = to_local.mul_vec3(ray.origin - part.position);
    let direction = to_local.mul_vec3(ray.direction);
    let half = part.half_extents();

    let mut t_min = f32::MIN;
    let mut t_max = f32::MAX;

    for axis in 0..3 {
        let o = origin.axis(axis);
        let d = direction.axis(axis);
        let h = half.axis(axis);

        if d.abs() < PARALLEL_EPSILON {
            if o < -h || o > h {
                return RayBoxTest::Miss;
            }
            continue;
        }

        let inv = 1.0 / d;
        let mut near = (-h - o) * inv;
        let mut far = (h - o) * inv;
        if near > far {
            std::mem::swap(&mut near, &mut far);
        }
        t_min = t_min.max(near);
        t_max = t_max.min(far);

        if t_min > t_max || t_max < 0.0 || t_min > ray.length {
            return RayBoxTest::Miss;
        }
    }

    if (t_min > 0.0 || t_max > 0.0) && t_min <= ray.length && t_min <= t_max {
        RayBoxTest::Hit {
            distance: t_min.max(0.0),
        }
    } else {
        RayBoxTest::Miss
    }
}
