//! # Smooth Lighting
//!
//! Per-vertex light and ambient occlusion interpolated from the blocks around
//! each face.
//!
//! ## Face Samples
//!
//! For a block and a direction, an [`AoFaceData`] holds four corner values
//! built from the centre block on that side, its four edge neighbours and the
//! four diagonal neighbours. It is sampled either on the neighbouring block
//! (offset) or on the block itself (inset). Quads that do not lie on the block
//! boundary blend the two by their depth into the block.
//!
//! ## Quad Classes
//!
//! * Aligned full faces take the corner values directly.
//! * Aligned partial faces interpolate the corners bilinearly per vertex.
//! * Inset faces additionally blend offset and inset samples by depth.
//! * Irregular faces (normal off every axis) combine the three axes weighted
//!   by the squared normal components.

use crate::core::position::pack_block;
use crate::world::facing::ModelQuadFacing;

use super::data::{self, ArrayLightDataCache};
use super::quad::{self, ModelQuad, QuadLightData, IS_ALIGNED, IS_PARALLEL, IS_PARTIAL};

/// Share of the weighted mean in irregular faces; the rest comes from the maximum.
const BLENDED_WEIGHT: f32 = 0.75;

const HAS_LIGHT_DATA: u8 = 0b01;
const HAS_UNPACKED_LIGHT_DATA: u8 = 0b10;

/// Neighbour layout of one face: the two tangent axes and the four edge directions.
#[derive(Copy, Clone, Debug)]
struct AoNeighborInfo {
    /// Edges in order `-u, +u, -v, +v`.
    faces: [ModelQuadFacing; 4],
    u: usize,
    v: usize,
    axis: usize,
    positive: bool,
}

impl AoNeighborInfo {
    fn get(face: ModelQuadFacing) -> Self {
        let axis = face.axis().unwrap_or(1);
        let (u, v) = match axis {
            0 => (1, 2),
            1 => (0, 2),
            _ => (0, 1),
        };
        Self {
            faces: [
                axis_facing(u, false),
                axis_facing(u, true),
                axis_facing(v, false),
                axis_facing(v, true),
            ],
            u,
            v,
            axis,
            positive: face.is_positive(),
        }
    }

    /// Bilinear weights of corners `(-u,-v), (-u,+v), (+u,+v), (+u,-v)`.
    fn corner_weights(&self, position: [f32; 3]) -> [f32; 4] {
        let pu = position[self.u];
        let pv = position[self.v];
        [
            (1.0 - pu) * (1.0 - pv),
            (1.0 - pu) * pv,
            pu * pv,
            pu * (1.0 - pv),
        ]
    }

    /// Corner a vertex on the face boundary sits on.
    fn corner(&self, position: [f32; 3]) -> usize {
        match (position[self.u] > 0.5, position[self.v] > 0.5) {
            (false, false) => 0,
            (false, true) => 1,
            (true, true) => 2,
            (true, false) => 3,
        }
    }

    /// Distance of a point from the face plane into the block.
    fn depth(&self, position: [f32; 3]) -> f32 {
        let d = position[self.axis];
        if self.positive {
            1.0 - d
        } else {
            d
        }
    }
}

fn axis_facing(axis: usize, positive: bool) -> ModelQuadFacing {
    match (axis, positive) {
        (0, true) => ModelQuadFacing::PosX,
        (0, false) => ModelQuadFacing::NegX,
        (1, true) => ModelQuadFacing::PosY,
        (1, false) => ModelQuadFacing::NegY,
        (_, true) => ModelQuadFacing::PosZ,
        (_, false) => ModelQuadFacing::NegZ,
    }
}

/// Corner light and occlusion of one side of a block.
#[derive(Copy, Clone, Debug, Default)]
struct AoFaceData {
    lm: [u32; 4],
    ao: [f32; 4],
    bl: [f32; 4],
    sl: [f32; 4],
    flags: u8,
}

impl AoFaceData {
    fn init(&mut self, cache: &mut ArrayLightDataCache, x: i32, y: i32, z: i32, dir: ModelQuadFacing, offset: bool) {
        let (ax, ay, az) = if offset {
            let step = dir.step();
            (x + step.x, y + step.y, z + step.z)
        } else {
            (x, y, z)
        };

        let adj_word = cache.get(ax, ay, az);
        let (calm, caem) = if offset && data::unpack_fo(adj_word) {
            let origin_word = cache.get(x, y, z);
            (data::lightmap(origin_word), data::unpack_em(origin_word))
        } else {
            (data::lightmap(adj_word), data::unpack_em(adj_word))
        };
        let caao = data::unpack_ao(adj_word);

        let faces = AoNeighborInfo::get(dir).faces;
        let edges = faces.map(|face| cache.get_offset(ax, ay, az, face));
        let edge_lm = edges.map(data::lightmap);
        let edge_ao = edges.map(data::unpack_ao);
        let edge_op = edges.map(data::unpack_op);
        let edge_em = edges.map(data::unpack_em);

        // Corner k lies between edges CORNER_EDGES[k].
        const CORNER_EDGES: [(usize, usize); 4] = [(0, 2), (0, 3), (1, 3), (1, 2)];

        for (corner, &(a, b)) in CORNER_EDGES.iter().enumerate() {
            // Both edges opaque hides the diagonal block entirely.
            let (clm, cao, cem) = if edge_op[a] && edge_op[b] {
                (edge_lm[a], edge_ao[a], edge_em[a])
            } else {
                let diagonal = cache.get_diagonal(ax, ay, az, faces[a], faces[b]);
                (
                    data::lightmap(diagonal),
                    data::unpack_ao(diagonal),
                    data::unpack_em(diagonal),
                )
            };

            self.ao[corner] = (edge_ao[a] + edge_ao[b] + cao + caao) * 0.25;
            self.lm[corner] = blend(
                light_or_full(edge_lm[a], edge_em[a]),
                light_or_full(edge_lm[b], edge_em[b]),
                light_or_full(clm, cem),
                light_or_full(calm, caem),
            );
        }

        self.flags |= HAS_LIGHT_DATA;
    }

    fn unpack(&mut self) {
        for i in 0..4 {
            self.bl[i] = (self.lm[i] & 0xFF) as f32;
            self.sl[i] = ((self.lm[i] >> 16) & 0xFF) as f32;
        }
        self.flags |= HAS_UNPACKED_LIGHT_DATA;
    }

    fn blended(values: &[f32; 4], w: &[f32; 4]) -> f32 {
        values[0] * w[0] + values[1] * w[1] + values[2] * w[2] + values[3] * w[3]
    }

    fn has_light_data(&self) -> bool {
        self.flags & HAS_LIGHT_DATA != 0
    }

    fn has_unpacked_light_data(&self) -> bool {
        self.flags & HAS_UNPACKED_LIGHT_DATA != 0
    }

    fn reset(&mut self) {
        self.flags = 0;
    }
}

fn light_or_full(lightmap: u32, emissive: bool) -> u32 {
    if emissive {
        data::FULL_BRIGHT
    } else {
        lightmap
    }
}

/// Averages four lightmaps per channel. Dark samples take the centre value.
fn blend(a: u32, b: u32, c: u32, center: u32) -> u32 {
    let or_center = |value: u32| if value == 0 { center } else { value };
    ((or_center(a) + or_center(b) + or_center(c) + center) >> 2) & 0x00FF_00FF
}

/// Packs sky and block light (both in `0..=240` units) into a lightmap coordinate.
fn light_map_coord(sl: f32, bl: f32) -> u32 {
    (((sl as i32) & 0xFF) << 16 | ((bl as i32) & 0xFF)) as u32
}

#[derive(Copy, Clone, Default)]
struct VertexLight {
    ao: f32,
    sl: f32,
    bl: f32,
}

/// Interpolating light pipeline with ambient occlusion.
///
/// Face samples are cached per block: the first six slots hold offset samples
/// per direction, the last six inset samples. The cache is dropped whenever the
/// pipeline moves to another block.
pub struct SmoothLightPipeline {
    cached_face_data: [AoFaceData; 12],
    cached_pos: Option<u64>,
}

impl SmoothLightPipeline {
    pub fn new() -> Self {
        Self {
            cached_face_data: [AoFaceData::default(); 12],
            cached_pos: None,
        }
    }

    /// Forgets cached samples.
    pub fn reset(&mut self) {
        self.cached_pos = None;
        for data in self.cached_face_data.iter_mut() {
            data.reset();
        }
    }

    /// # Arguments
    /// * `cache` - Light words of the section being built
    /// * `quad` - Quad in block-local coordinates
    /// * `(x, y, z)` - Block position in slice coordinates
    /// * `cull_face` - Face the quad is culled against, if any
    /// * `shade` - Apply directional shading
    #[allow(clippy::too_many_arguments)]
    pub fn calculate(
        &mut self,
        cache: &mut ArrayLightDataCache,
        quad: &ModelQuad,
        x: i32,
        y: i32,
        z: i32,
        _cull_face: Option<ModelQuadFacing>,
        shade: bool,
        out: &mut QuadLightData,
    ) {
        self.update_cached_data(pack_block(x, y, z));

        let flags = quad.flags();
        let light_face = quad.light_face();

        if flags & IS_ALIGNED != 0 || (flags & IS_PARALLEL != 0 && data::unpack_fc(cache.get(x, y, z))) {
            if flags & IS_PARTIAL == 0 {
                self.apply_aligned_full_face(cache, quad, x, y, z, light_face, out);
            } else {
                self.apply_aligned_partial_face(cache, quad, x, y, z, light_face, out);
            }
        } else if quad.normal_face() != ModelQuadFacing::Unassigned {
            self.apply_non_parallel_face(cache, quad, x, y, z, light_face, out);
        } else {
            self.apply_irregular_face(cache, quad, x, y, z, out);
        }

        let diffuse = if quad.normal_face() == ModelQuadFacing::Unassigned {
            quad::diffuse_normal(quad.normal(), shade)
        } else {
            quad::diffuse(light_face, shade)
        };
        for br in out.br.iter_mut() {
            *br *= diffuse;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_aligned_full_face(
        &mut self,
        cache: &mut ArrayLightDataCache,
        quad: &ModelQuad,
        x: i32,
        y: i32,
        z: i32,
        dir: ModelQuadFacing,
        out: &mut QuadLightData,
    ) {
        let info = AoNeighborInfo::get(dir);
        let face = *self.face_data(cache, x, y, z, dir, true);
        for (i, position) in quad.positions().iter().enumerate() {
            let corner = info.corner(*position);
            out.lm[i] = face.lm[corner];
            out.br[i] = face.ao[corner];
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_aligned_partial_face(
        &mut self,
        cache: &mut ArrayLightDataCache,
        quad: &ModelQuad,
        x: i32,
        y: i32,
        z: i32,
        dir: ModelQuadFacing,
        out: &mut QuadLightData,
    ) {
        let info = AoNeighborInfo::get(dir);
        for (i, position) in quad.positions().iter().enumerate() {
            let weights = info.corner_weights(clamp(*position));
            let light = self.sample(cache, x, y, z, dir, true, &weights);
            out.br[i] = light.ao;
            out.lm[i] = light_map_coord(light.sl, light.bl);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_non_parallel_face(
        &mut self,
        cache: &mut ArrayLightDataCache,
        quad: &ModelQuad,
        x: i32,
        y: i32,
        z: i32,
        dir: ModelQuadFacing,
        out: &mut QuadLightData,
    ) {
        for (i, position) in quad.positions().iter().enumerate() {
            let light = self.vertex_light(cache, x, y, z, dir, clamp(*position));
            out.br[i] = light.ao;
            out.lm[i] = light_map_coord(light.sl, light.bl);
        }
    }

    fn apply_irregular_face(
        &mut self,
        cache: &mut ArrayLightDataCache,
        quad: &ModelQuad,
        x: i32,
        y: i32,
        z: i32,
        out: &mut QuadLightData,
    ) {
        let normal = quad.normal();
        let components = [normal.x, normal.y, normal.z];

        for (i, position) in quad.positions().iter().enumerate() {
            let position = clamp(*position);
            let mut weighted = VertexLight::default();
            let mut max = VertexLight::default();

            for (axis, &component) in components.iter().enumerate() {
                if component == 0.0 {
                    continue;
                }
                let dir = axis_facing(axis, component > 0.0);
                let light = self.vertex_light(cache, x, y, z, dir, position);
                let weight = component * component;

                weighted.ao += light.ao * weight;
                weighted.sl += light.sl * weight;
                weighted.bl += light.bl * weight;
                max.ao = max.ao.max(light.ao);
                max.sl = max.sl.max(light.sl);
                max.bl = max.bl.max(light.bl);
            }

            let mix = |w: f32, m: f32| w * BLENDED_WEIGHT + m * (1.0 - BLENDED_WEIGHT);
            out.br[i] = mix(weighted.ao, max.ao);
            out.lm[i] = light_map_coord(mix(weighted.sl, max.sl), mix(weighted.bl, max.bl));
        }
    }

    /// Light of a vertex, blending offset and inset samples by its depth.
    fn vertex_light(
        &mut self,
        cache: &mut ArrayLightDataCache,
        x: i32,
        y: i32,
        z: i32,
        dir: ModelQuadFacing,
        position: [f32; 3],
    ) -> VertexLight {
        let info = AoNeighborInfo::get(dir);
        let weights = info.corner_weights(position);
        let depth = info.depth(position);

        if roughly_equal(depth, 0.0) {
            self.sample(cache, x, y, z, dir, true, &weights)
        } else if roughly_equal(depth, 1.0) {
            self.sample(cache, x, y, z, dir, false, &weights)
        } else {
            let inset = self.sample(cache, x, y, z, dir, false, &weights);
            let offset = self.sample(cache, x, y, z, dir, true, &weights);
            let n1d = depth;
            let n2d = 1.0 - depth;
            VertexLight {
                ao: inset.ao * n1d + offset.ao * n2d,
                sl: inset.sl * n1d + offset.sl * n2d,
                bl: inset.bl * n1d + offset.bl * n2d,
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn sample(
        &mut self,
        cache: &mut ArrayLightDataCache,
        x: i32,
        y: i32,
        z: i32,
        dir: ModelQuadFacing,
        offset: bool,
        weights: &[f32; 4],
    ) -> VertexLight {
        let face = self.face_data(cache, x, y, z, dir, offset);
        if !face.has_unpacked_light_data() {
            face.unpack();
        }
        VertexLight {
            ao: AoFaceData::blended(&face.ao, weights),
            sl: AoFaceData::blended(&face.sl, weights),
            bl: AoFaceData::blended(&face.bl, weights),
        }
    }

    fn face_data(
        &mut self,
        cache: &mut ArrayLightDataCache,
        x: i32,
        y: i32,
        z: i32,
        dir: ModelQuadFacing,
        offset: bool,
    ) -> &mut AoFaceData {
        let slot = if offset { dir.index() } else { dir.index() + 6 };
        let face = &mut self.cached_face_data[slot];
        if !face.has_light_data() {
            face.init(cache, x, y, z, dir, offset);
        }
        face
    }

    fn update_cached_data(&mut self, key: u64) {
        if self.cached_pos != Some(key) {
            for data in self.cached_face_data.iter_mut() {
                data.reset();
            }
            self.cached_pos = Some(key);
        }
    }
}

impl Default for SmoothLightPipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp(position: [f32; 3]) -> [f32; 3] {
    position.map(|value| value.clamp(0.0, 1.0))
}

fn roughly_equal(a: f32, b: f32) -> bool {
    (a - b).abs() < 1.0e-5
}
