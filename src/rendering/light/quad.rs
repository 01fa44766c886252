//! Quad geometry as seen by the light pipelines.

use cgmath::{InnerSpace, Vector3};

use crate::world::facing::ModelQuadFacing;

/// Every vertex lies on the block boundary plane of the light face.
pub const IS_ALIGNED: u32 = 0b001;
/// Every vertex has the same coordinate along the light face axis.
pub const IS_PARALLEL: u32 = 0b010;
/// The quad does not span the whole face of the block.
pub const IS_PARTIAL: u32 = 0b100;

const EPSILON: f32 = 1.0e-5;

/// A quad in block-local coordinates (`0.0..=1.0` on each axis).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ModelQuad {
    positions: [[f32; 3]; 4],
    normal: Vector3<f32>,
    normal_face: ModelQuadFacing,
    light_face: ModelQuadFacing,
    flags: u32,
}

impl ModelQuad {
    /// Builds a quad from counter-clockwise vertices and classifies it.
    pub fn new(positions: [[f32; 3]; 4]) -> Self {
        let normal = compute_normal(&positions);
        let normal_face = ModelQuadFacing::from_normal(normal);
        let light_face = nearest_direction(normal);
        let flags = compute_flags(&positions, light_face);
        Self {
            positions,
            normal,
            normal_face,
            light_face,
            flags,
        }
    }

    pub fn positions(&self) -> &[[f32; 3]; 4] {
        &self.positions
    }

    #[inline]
    pub fn x(&self, vertex: usize) -> f32 {
        self.positions[vertex][0]
    }

    #[inline]
    pub fn y(&self, vertex: usize) -> f32 {
        self.positions[vertex][1]
    }

    #[inline]
    pub fn z(&self, vertex: usize) -> f32 {
        self.positions[vertex][2]
    }

    /// Unit normal.
    pub fn normal(&self) -> Vector3<f32> {
        self.normal
    }

    /// Facing of the normal, `Unassigned` when it is not axis-aligned.
    pub fn normal_face(&self) -> ModelQuadFacing {
        self.normal_face
    }

    /// Axis direction closest to the normal. Never `Unassigned`.
    pub fn light_face(&self) -> ModelQuadFacing {
        self.light_face
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    #[inline]
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }
}

/// Lightmap coordinate and brightness per vertex.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct QuadLightData {
    /// Packed lightmap per vertex, `sky << 16 | block`.
    pub lm: [u32; 4],
    /// Brightness per vertex.
    pub br: [f32; 4],
}

fn compute_normal(positions: &[[f32; 3]; 4]) -> Vector3<f32> {
    let p = |i: usize| Vector3::new(positions[i][0], positions[i][1], positions[i][2]);
    let normal = (p(2) - p(0)).cross(p(3) - p(1));
    if normal.magnitude2() <= f32::EPSILON {
        return Vector3::new(0.0, 1.0, 0.0);
    }
    normal.normalize()
}

fn nearest_direction(normal: Vector3<f32>) -> ModelQuadFacing {
    let (ax, ay, az) = (normal.x.abs(), normal.y.abs(), normal.z.abs());
    if ax >= ay && ax >= az {
        if normal.x >= 0.0 {
            ModelQuadFacing::PosX
        } else {
            ModelQuadFacing::NegX
        }
    } else if ay >= az {
        if normal.y >= 0.0 {
            ModelQuadFacing::PosY
        } else {
            ModelQuadFacing::NegY
        }
    } else if normal.z >= 0.0 {
        ModelQuadFacing::PosZ
    } else {
        ModelQuadFacing::NegZ
    }
}

fn compute_flags(positions: &[[f32; 3]; 4], light_face: ModelQuadFacing) -> u32 {
    let Some(axis) = light_face.axis() else {
        return 0;
    };

    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for position in positions {
        for i in 0..3 {
            min[i] = min[i].min(position[i]);
            max[i] = max[i].max(position[i]);
        }
    }

    let mut flags = 0;

    let partial = (0..3)
        .filter(|&i| i != axis)
        .any(|i| min[i] > EPSILON || max[i] < 1.0 - EPSILON);
    if partial {
        flags |= IS_PARTIAL;
    }

    if (max[axis] - min[axis]).abs() < EPSILON {
        flags |= IS_PARALLEL;
        let boundary = if light_face.is_positive() { 1.0 } else { 0.0 };
        if (min[axis] - boundary).abs() < EPSILON {
            flags |= IS_ALIGNED;
        }
    }

    flags
}

/// Directional shading applied on top of light and occlusion.
pub fn diffuse(face: ModelQuadFacing, shade: bool) -> f32 {
    if !shade {
        return 1.0;
    }
    match face {
        ModelQuadFacing::NegY => 0.5,
        ModelQuadFacing::PosY => 1.0,
        ModelQuadFacing::NegZ | ModelQuadFacing::PosZ => 0.8,
        ModelQuadFacing::NegX | ModelQuadFacing::PosX => 0.6,
        ModelQuadFacing::Unassigned => 1.0,
    }
}

/// Directional shading of an arbitrary normal, blending the per-axis values.
pub fn diffuse_normal(normal: Vector3<f32>, shade: bool) -> f32 {
    if !shade {
        return 1.0;
    }
    let up = if normal.y >= 0.0 { 1.0 } else { 0.5 };
    (normal.x * normal.x * 0.6 + normal.y * normal.y * up + normal.z * normal.z * 0.8).min(1.0)
}
