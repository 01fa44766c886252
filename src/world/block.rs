//! # Block Type Module
//!
//! This module defines the block types of the world and the render-relevant
//! properties the mesher queries: shape, render pass, opacity and light emission.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::rendering::compile::render_pass::TerrainRenderPass;

/// Compact storage type for block ids.
pub type BlockTypeSize = u8;

/// Geometry a block contributes to its section mesh.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlockShape {
    /// No geometry.
    Empty,
    /// A full unit cube.
    FullCube,
    /// The bottom half of a cube.
    Slab,
    /// Two diagonal quads crossing through the block centre.
    Cross,
}

/// Enumerates all block types in the voxel world.
///
/// The `FromPrimitive` derive allows conversion from the compact id stored in
/// sections.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u8)]
pub enum BlockType {
    /// Non-solid, transparent.
    AIR,
    /// Plain opaque stone.
    STONE,
    /// Opaque dirt.
    DIRT,
    /// Opaque grass.
    GRASS,
    /// Opaque wood.
    WOOD,
    /// Cutout leaves, does not occlude neighbours.
    LEAVES,
    /// Translucent glass.
    GLASS,
    /// Translucent water.
    WATER,
    /// Opaque light source.
    LAMP,
    /// Half-height stone slab.
    SLAB,
    /// Cross-shaped cutout plant.
    FLOWER,
}

impl BlockType {
    /// Converts a stored id to a `BlockType`.
    ///
    /// # Returns
    /// `None` if the id does not name a block type
    pub fn get_block_type_from_int(btype: BlockTypeSize) -> Option<Self> {
        FromPrimitive::from_u8(btype)
    }

    /// Generates a random opaque terrain block type.
    ///
    /// Used by procedural generation and tests.
    pub fn get_random_type() -> Self {
        Self::get_block_type_from_int(fastrand::u8(1..5)).unwrap_or(BlockType::STONE)
    }

    /// Compact id of this block type.
    #[inline]
    pub fn id(self) -> BlockTypeSize {
        self as BlockTypeSize
    }

    /// Geometry this block contributes.
    pub fn shape(self) -> BlockShape {
        match self {
            BlockType::AIR => BlockShape::Empty,
            BlockType::SLAB => BlockShape::Slab,
            BlockType::FLOWER => BlockShape::Cross,
            _ => BlockShape::FullCube,
        }
    }

    /// Render pass the block's quads are placed in, `None` for air.
    pub fn render_pass(self) -> Option<TerrainRenderPass> {
        match self {
            BlockType::AIR => None,
            BlockType::LEAVES | BlockType::FLOWER => Some(TerrainRenderPass::Cutout),
            BlockType::GLASS | BlockType::WATER => Some(TerrainRenderPass::Translucent),
            _ => Some(TerrainRenderPass::Solid),
        }
    }

    /// Whether the block is a full cube that hides every neighbour face behind it.
    pub fn is_opaque_full_cube(self) -> bool {
        self.shape() == BlockShape::FullCube
            && self.render_pass() == Some(TerrainRenderPass::Solid)
    }

    /// Whether the block fully blocks light.
    pub fn is_opaque(self) -> bool {
        self.is_opaque_full_cube()
    }

    /// Whether the block has a full cube collision/render shape.
    pub fn is_full_cube(self) -> bool {
        self.shape() == BlockShape::FullCube
    }

    /// Light level emitted by the block.
    pub fn light_emission(self) -> u8 {
        match self {
            BlockType::LAMP => 15,
            _ => 0,
        }
    }

    /// Whether the block is rendered at full brightness regardless of light.
    pub fn is_emissive(self) -> bool {
        self == BlockType::LAMP
    }

    /// Whether ambient occlusion darkens the block's neighbours.
    pub fn casts_ambient_occlusion(self) -> bool {
        self.is_opaque_full_cube()
    }

    /// Whether a face of this block towards `neighbour` can be skipped.
    ///
    /// Opaque cubes hide everything, and a translucent block hides a touching
    /// face of the same type so water bodies and glass panes do not render
    /// internal faces.
    pub fn is_face_hidden_by(self, neighbour: BlockType) -> bool {
        if neighbour.is_opaque_full_cube() {
            return true;
        }
        neighbour == self && self.render_pass() == Some(TerrainRenderPass::Translucent)
    }

    /// Base vertex colour as RGBA8.
    pub fn color(self) -> [u8; 4] {
        match self {
            BlockType::AIR => [0, 0, 0, 0],
            BlockType::STONE => [125, 125, 125, 255],
            BlockType::DIRT => [134, 96, 67, 255],
            BlockType::GRASS => [95, 159, 53, 255],
            BlockType::WOOD => [102, 81, 51, 255],
            BlockType::LEAVES => [60, 120, 40, 255],
            BlockType::GLASS => [200, 220, 255, 96],
            BlockType::WATER => [50, 90, 220, 160],
            BlockType::LAMP => [255, 230, 160, 255],
            BlockType::SLAB => [150, 150, 150, 255],
            BlockType::FLOWER => [220, 40, 60, 255],
        }
    }
}
