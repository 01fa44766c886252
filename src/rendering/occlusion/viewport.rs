//! # Viewport
//!
//! Camera, projection and the view frustum derived from them. The culler only
//! needs the camera position and a box test, so both are exposed through
//! [`Viewport`].

use cgmath::*;

use crate::core::position::world_to_section;

/// Transformation matrix to convert from OpenGL's clip space to WGPU's.
///
/// Scales Z from [-1, 1] to [-0.5, 0.5] and translates it to [0, 1].
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// A first-person camera.
#[derive(Copy, Clone, Debug)]
pub struct Camera {
    /// Position in world space
    pub position: Point3<f32>,
    /// Horizontal rotation around Y
    pub yaw: Rad<f32>,
    /// Vertical rotation around X
    pub pitch: Rad<f32>,
}

impl Camera {
    /// Creates a camera.
    ///
    /// # Arguments
    /// * `position` - Position in world space
    /// * `yaw` - Horizontal rotation; zero looks along +X
    /// * `pitch` - Vertical rotation; zero is level
    pub fn new<V: Into<Point3<f32>>, Y: Into<Rad<f32>>, P: Into<Rad<f32>>>(position: V, yaw: Y, pitch: P) -> Self {
        Self {
            position: position.into(),
            yaw: yaw.into(),
            pitch: pitch.into(),
        }
    }

    /// Normalized view direction.
    pub fn direction(&self) -> Vector3<f32> {
        let (yaw_sin, yaw_cos) = self.yaw.0.sin_cos();
        let (pitch_sin, pitch_cos) = self.pitch.0.sin_cos();
        Vector3::new(yaw_cos * pitch_cos, pitch_sin, yaw_sin * pitch_cos).normalize()
    }

    /// World-to-view matrix.
    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(self.position, self.direction(), Vector3::unit_y())
    }
}

/// Perspective projection settings.
#[derive(Copy, Clone, Debug)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    /// Creates a projection for a `width`×`height` target.
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    /// Updates the aspect ratio after a resize.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    /// View-to-clip matrix in WGPU clip space.
    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

/// Six clip planes as `(a, b, c, d)` with the inside where `a·x + b·y + c·z + d >= 0`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Frustum {
    planes: [Vector4<f32>; 6],
}

impl Frustum {
    /// Extracts the planes of a view-projection matrix with [0, 1] depth.
    pub fn from_matrix(view_projection: Matrix4<f32>) -> Self {
        let r0 = view_projection.row(0);
        let r1 = view_projection.row(1);
        let r2 = view_projection.row(2);
        let r3 = view_projection.row(3);
        Self {
            planes: [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2],
        }
    }

    /// Whether any part of the box is inside every plane.
    pub fn intersects_box(&self, min: Point3<f32>, max: Point3<f32>) -> bool {
        self.planes.iter().all(|plane| {
            let x = if plane.x >= 0.0 { max.x } else { min.x };
            let y = if plane.y >= 0.0 { max.y } else { min.y };
            let z = if plane.z >= 0.0 { max.z } else { min.z };
            plane.x * x + plane.y * y + plane.z * z + plane.w >= 0.0
        })
    }
}

/// What the camera can see this frame.
#[derive(Copy, Clone, Debug)]
pub struct Viewport {
    camera: Point3<f32>,
    frustum: Option<Frustum>,
}

impl Viewport {
    /// A viewport clipped by the frustum of `view_projection`.
    pub fn new(camera: Point3<f32>, view_projection: Matrix4<f32>) -> Self {
        Self {
            camera,
            frustum: Some(Frustum::from_matrix(view_projection)),
        }
    }

    /// A viewport that sees in every direction.
    pub fn unbounded(camera: Point3<f32>) -> Self {
        Self { camera, frustum: None }
    }

    pub fn from_camera(camera: &Camera, projection: &Projection) -> Self {
        Self::new(camera.position, projection.calc_matrix() * camera.calc_matrix())
    }

    /// Camera position in world space.
    pub fn camera(&self) -> Point3<f32> {
        self.camera
    }

    /// Section containing the camera.
    pub fn camera_section(&self) -> Point3<i32> {
        world_to_section(self.camera)
    }

    /// Camera position floored to block coordinates.
    pub fn camera_block(&self) -> Point3<i32> {
        Point3::new(
            self.camera.x.floor() as i32,
            self.camera.y.floor() as i32,
            self.camera.z.floor() as i32,
        )
    }

    /// Whether an axis-aligned box may be on screen.
    pub fn is_box_visible(&self, min: Point3<f32>, max: Point3<f32>) -> bool {
        self.frustum
            .as_ref()
            .map_or(true, |frustum| frustum.intersects_box(min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> Viewport {
        let camera = Camera::new((0.0, 0.0, 0.0), Deg(0.0), Deg(0.0));
        let projection = Projection::new(800, 600, Deg(70.0), 0.1, 1000.0);
        Viewport::from_camera(&camera, &projection)
    }

    #[test]
    fn boxes_in_front_are_visible() {
        let viewport = viewport();
        assert!(viewport.is_box_visible(Point3::new(10.0, -1.0, -1.0), Point3::new(12.0, 1.0, 1.0)));
        assert!(!viewport.is_box_visible(Point3::new(-12.0, -1.0, -1.0), Point3::new(-10.0, 1.0, 1.0)));
        assert!(!viewport.is_box_visible(Point3::new(2000.0, -1.0, -1.0), Point3::new(2001.0, 1.0, 1.0)));
    }

    #[test]
    fn boxes_around_the_camera_are_visible() {
        let viewport = viewport();
        assert!(viewport.is_box_visible(Point3::new(-8.0, -8.0, -8.0), Point3::new(8.0, 8.0, 8.0)));
        assert!(Viewport::unbounded(Point3::new(0.0, 0.0, 0.0))
            .is_box_visible(Point3::new(-12.0, 0.0, 0.0), Point3::new(-10.0, 1.0, 1.0)));
    }

    #[test]
    fn camera_section_floors_negative_positions() {
        let viewport = Viewport::unbounded(Point3::new(-0.5, 17.0, 33.0));
        assert_eq!(viewport.camera_section(), Point3::new(-1, 1, 2));
        assert_eq!(viewport.camera_block(), Point3::new(-1, 17, 33));
    }
}
