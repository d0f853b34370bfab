use crate::{Mat4, Vec3, bounds::Extents};

/// Camera placement hints derived from a model's extents.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Framing {
    /// Translation that recenters the model on the origin.
    pub center_offset: Vec3,
    pub bounding_radius: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Framing {
    /// Empty models get a zero offset and zero radius.
    pub fn from_extents(extents: Option<Extents>, padding: f32) -> Self {
        let (center_offset, bounding_radius) = match extents {
            Some(e) => (e.center_offset(), e.bounding_radius(padding)),
            None => (Vec3::ZERO, 0.0),
        };
        Self {
            center_offset,
            bounding_radius,
            z_near: bounding_radius / 100.0,
            z_far: bounding_radius * 3.0,
        }
    }

    /// World matrix placing the recentered model, spun around Y by `angle_y` radians.
    #[inline]
    pub fn world(&self, angle_y: f32) -> Mat4 {
        Mat4::from_rotation_y(angle_y) * Mat4::from_translation(self.center_offset)
    }
}

/// Simple perspective camera (right-handed).
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_rad: f32,
    pub z_near: f32,
    pub z_far: f32,
    pub aspect: f32,
}

impl Camera {
    /// Camera on +Z at `bounding_radius`, looking at the origin.
    pub fn framing(framing: &Framing, fov_y_rad: f32, aspect: f32) -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, framing.bounding_radius),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y_rad,
            // Degenerate (empty or single-point) models still need a valid frustum.
            z_near: framing.z_near.max(1e-4),
            z_far: framing.z_far.max(1e-3),
            aspect,
        }
    }

    #[inline]
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    #[inline]
    pub fn proj(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_y_rad,
            self.aspect.max(1e-6),
            self.z_near,
            self.z_far.max(self.z_near * 2.0),
        )
    }

    #[inline]
    pub fn proj_view(&self) -> Mat4 {
        self.proj() * self.view()
    }

    /// Whether `point`, placed by `world`, lands inside the view frustum
    /// (depth in `0..=w`, as `perspective_rh` produces).
    pub fn sees(&self, world: Mat4, point: Vec3) -> bool {
        let clip = self.proj_view() * world * point.extend(1.0);
        clip.w > 0.0
            && clip.x.abs() <= clip.w
            && clip.y.abs() <= clip.w
            && (0.0..=clip.w).contains(&clip.z)
    }
}
