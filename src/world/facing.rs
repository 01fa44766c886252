//! # Quad Facing Module
//!
//! This module defines the facings a mesh quad can have. Six facings correspond
//! to the axis-aligned block faces and are used for per-facing draw ranges and
//! face culling; a seventh, `Unassigned`, collects quads whose normal is not
//! axis-aligned (cross-shaped plants, for example) and is always drawn.

use cgmath::{Point3, Vector3};

/// The facing of a mesh quad.
///
/// The discriminants are the index of the facing inside per-section draw
/// ranges, so they must stay dense and stable.
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug, PartialOrd, Ord)]
pub enum ModelQuadFacing {
    /// Facing positive X
    PosX = 0,
    /// Facing positive Y
    PosY = 1,
    /// Facing positive Z
    PosZ = 2,
    /// Facing negative X
    NegX = 3,
    /// Facing negative Y
    NegY = 4,
    /// Facing negative Z
    NegZ = 5,
    /// Not axis-aligned
    Unassigned = 6,
}

impl ModelQuadFacing {
    /// Number of facings including `Unassigned`.
    pub const COUNT: usize = 7;
    /// Number of axis-aligned facings.
    pub const DIRECTION_COUNT: usize = 6;
    /// Bitmask with every facing set.
    pub const ALL_MASK: u32 = (1 << Self::COUNT) - 1;

    /// Returns all facings in index order.
    pub fn all() -> [ModelQuadFacing; 7] {
        [
            ModelQuadFacing::PosX,
            ModelQuadFacing::PosY,
            ModelQuadFacing::PosZ,
            ModelQuadFacing::NegX,
            ModelQuadFacing::NegY,
            ModelQuadFacing::NegZ,
            ModelQuadFacing::Unassigned,
        ]
    }

    /// Returns the six axis-aligned facings in index order.
    pub fn directions() -> [ModelQuadFacing; 6] {
        [
            ModelQuadFacing::PosX,
            ModelQuadFacing::PosY,
            ModelQuadFacing::PosZ,
            ModelQuadFacing::NegX,
            ModelQuadFacing::NegY,
            ModelQuadFacing::NegZ,
        ]
    }

    /// Returns the facing with the given index, if any.
    pub fn from_index(index: usize) -> Option<ModelQuadFacing> {
        Self::all().get(index).copied()
    }

    /// Index of this facing in per-facing tables.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Single-bit mask for this facing.
    #[inline]
    pub fn bit(self) -> u32 {
        1 << self as u32
    }

    /// Returns the opposite facing. `Unassigned` is its own opposite.
    pub fn opposite(self) -> ModelQuadFacing {
        match self {
            ModelQuadFacing::PosX => ModelQuadFacing::NegX,
            ModelQuadFacing::PosY => ModelQuadFacing::NegY,
            ModelQuadFacing::PosZ => ModelQuadFacing::NegZ,
            ModelQuadFacing::NegX => ModelQuadFacing::PosX,
            ModelQuadFacing::NegY => ModelQuadFacing::PosY,
            ModelQuadFacing::NegZ => ModelQuadFacing::PosZ,
            ModelQuadFacing::Unassigned => ModelQuadFacing::Unassigned,
        }
    }

    /// Unit step towards the neighbour on this side. Zero for `Unassigned`.
    pub fn step(self) -> Vector3<i32> {
        match self {
            ModelQuadFacing::PosX => Vector3::new(1, 0, 0),
            ModelQuadFacing::PosY => Vector3::new(0, 1, 0),
            ModelQuadFacing::PosZ => Vector3::new(0, 0, 1),
            ModelQuadFacing::NegX => Vector3::new(-1, 0, 0),
            ModelQuadFacing::NegY => Vector3::new(0, -1, 0),
            ModelQuadFacing::NegZ => Vector3::new(0, 0, -1),
            ModelQuadFacing::Unassigned => Vector3::new(0, 0, 0),
        }
    }

    /// Axis index (0 = X, 1 = Y, 2 = Z). `None` for `Unassigned`.
    pub fn axis(self) -> Option<usize> {
        match self {
            ModelQuadFacing::PosX | ModelQuadFacing::NegX => Some(0),
            ModelQuadFacing::PosY | ModelQuadFacing::NegY => Some(1),
            ModelQuadFacing::PosZ | ModelQuadFacing::NegZ => Some(2),
            ModelQuadFacing::Unassigned => None,
        }
    }

    /// Whether the facing points along the positive direction of its axis.
    pub fn is_positive(self) -> bool {
        matches!(
            self,
            ModelQuadFacing::PosX | ModelQuadFacing::PosY | ModelQuadFacing::PosZ
        )
    }

    /// Classifies a quad normal. Normals that are not axis-aligned map to `Unassigned`.
    pub fn from_normal(normal: Vector3<f32>) -> ModelQuadFacing {
        const EPSILON: f32 = 1.0e-4;
        let axis_aligned = |a: f32, b: f32| a.abs() < EPSILON && b.abs() < EPSILON;

        if axis_aligned(normal.y, normal.z) && normal.x.abs() > EPSILON {
            if normal.x > 0.0 {
                ModelQuadFacing::PosX
            } else {
                ModelQuadFacing::NegX
            }
        } else if axis_aligned(normal.x, normal.z) && normal.y.abs() > EPSILON {
            if normal.y > 0.0 {
                ModelQuadFacing::PosY
            } else {
                ModelQuadFacing::NegY
            }
        } else if axis_aligned(normal.x, normal.y) && normal.z.abs() > EPSILON {
            if normal.z > 0.0 {
                ModelQuadFacing::PosZ
            } else {
                ModelQuadFacing::NegZ
            }
        } else {
            ModelQuadFacing::Unassigned
        }
    }

    /// Computes which facings of a section can face the camera.
    ///
    /// A facing is potentially visible when the camera block position lies on
    /// its outward side of the section's opposite boundary. `Unassigned` is
    /// always included.
    ///
    /// # Arguments
    /// * `camera_block` - Camera position in block coordinates (floored)
    /// * `section_min` - Minimum block corner of the section
    /// * `section_max` - Maximum block corner of the section (exclusive)
    ///
    /// # Returns
    /// A bitmask of visible facings, indexed by [`ModelQuadFacing::index`]
    pub fn visible_mask(
        camera_block: Point3<i32>,
        section_min: Point3<i32>,
        section_max: Point3<i32>,
    ) -> u32 {
        let mut mask = ModelQuadFacing::Unassigned.bit();

        if camera_block.x > section_min.x {
            mask |= ModelQuadFacing::PosX.bit();
        }
        if camera_block.x < section_max.x {
            mask |= ModelQuadFacing::NegX.bit();
        }
        if camera_block.y > section_min.y {
            mask |= ModelQuadFacing::PosY.bit();
        }
        if camera_block.y < section_max.y {
            mask |= ModelQuadFacing::NegY.bit();
        }
        if camera_block.z > section_min.z {
            mask |= ModelQuadFacing::PosZ.bit();
        }
        if camera_block.z < section_max.z {
            mask |= ModelQuadFacing::NegZ.bit();
        }

        mask
    }
}
