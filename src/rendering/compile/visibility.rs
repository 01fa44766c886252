//! Face-to-face connectivity of a section, found by flood filling open space.

use bitvec::prelude::*;

use crate::core::position::{SECTION_SIZE, SECTION_VOLUME};
use crate::rendering::section::VisibilityEncoding;
use crate::world::facing::ModelQuadFacing;
use crate::world::world_slice::WorldSlice;

/// Below this many opaque blocks a section cannot separate any two faces.
const MIN_OPAQUE_BLOCKS: usize = SECTION_SIZE as usize * SECTION_SIZE as usize;

/// Reusable flood fill state.
pub struct VisibilityGraph {
    opaque: BitVec,
    visited: BitVec,
    stack: Vec<usize>,
    opaque_count: usize,
}

impl VisibilityGraph {
    pub fn new() -> Self {
        Self {
            opaque: bitvec![0; SECTION_VOLUME],
            visited: bitvec![0; SECTION_VOLUME],
            stack: Vec::new(),
            opaque_count: 0,
        }
    }

    /// Clears the graph before a new section.
    pub fn reset(&mut self) {
        self.opaque.fill(false);
        self.visited.fill(false);
        self.opaque_count = 0;
    }

    /// Marks a block as blocking sight.
    pub fn mark_opaque(&mut self, x: i32, y: i32, z: i32) {
        let index = index(x, y, z);
        if !self.opaque[index] {
            self.opaque.set(index, true);
            self.opaque_count += 1;
        }
    }

    /// Marks every opaque full cube of the centre section of `slice`.
    pub fn mark_slice(&mut self, slice: &WorldSlice) {
        for y in 0..SECTION_SIZE {
            for z in 0..SECTION_SIZE {
                for x in 0..SECTION_SIZE {
                    if slice.get_block(x, y, z).is_opaque_full_cube() {
                        self.mark_opaque(x, y, z);
                    }
                }
            }
        }
    }

    /// Connectivity of the marked section.
    pub fn compute(&mut self) -> VisibilityEncoding {
        if self.opaque_count < MIN_OPAQUE_BLOCKS {
            return VisibilityEncoding::EVERYTHING;
        }
        if self.opaque_count == SECTION_VOLUME {
            return VisibilityEncoding::NOTHING;
        }

        let mut encoding = VisibilityEncoding::NOTHING;
        self.visited.fill(false);

        for start in 0..SECTION_VOLUME {
            if self.opaque[start] || self.visited[start] {
                continue;
            }
            let faces = self.flood_fill(start);
            encoding.connect_all(faces);
        }

        encoding
    }

    /// Faces touched by the open region containing `start`.
    fn flood_fill(&mut self, start: usize) -> u32 {
        let mut faces = 0;
        self.stack.clear();
        self.stack.push(start);
        self.visited.set(start, true);

        while let Some(current) = self.stack.pop() {
            let (x, y, z) = coordinates(current);
            faces |= boundary_faces(x, y, z);

            for direction in ModelQuadFacing::directions() {
                let step = direction.step();
                let (nx, ny, nz) = (x + step.x, y + step.y, z + step.z);
                if !(0..SECTION_SIZE).contains(&nx)
                    || !(0..SECTION_SIZE).contains(&ny)
                    || !(0..SECTION_SIZE).contains(&nz)
                {
                    continue;
                }
                let neighbour = index(nx, ny, nz);
                if self.opaque[neighbour] || self.visited[neighbour] {
                    continue;
                }
                self.visited.set(neighbour, true);
                self.stack.push(neighbour);
            }
        }

        faces
    }
}

impl Default for VisibilityGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn index(x: i32, y: i32, z: i32) -> usize {
    ((y * SECTION_SIZE + z) * SECTION_SIZE + x) as usize
}

#[inline]
fn coordinates(index: usize) -> (i32, i32, i32) {
    let index = index as i32;
    (
        index % SECTION_SIZE,
        index / (SECTION_SIZE * SECTION_SIZE),
        (index / SECTION_SIZE) % SECTION_SIZE,
    )
}

fn boundary_faces(x: i32, y: i32, z: i32) -> u32 {
    let last = SECTION_SIZE - 1;
    let mut faces = 0;
    if x == 0 {
        faces |= ModelQuadFacing::NegX.bit();
    }
    if x == last {
        faces |= ModelQuadFacing::PosX.bit();
    }
    if y == 0 {
        faces |= ModelQuadFacing::NegY.bit();
    }
    if y == last {
        faces |= ModelQuadFacing::PosY.bit();
    }
    if z == 0 {
        faces |= ModelQuadFacing::NegZ.bit();
    }
    if z == last {
        faces |= ModelQuadFacing::PosZ.bit();
    }
    faces
}
