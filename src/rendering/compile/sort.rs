//! Back-to-front ordering of translucent quads.

use cgmath::Point3;

/// How much sorting a translucent mesh needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SortLevel {
    None,
    /// Sorted once at build time; the order cannot change with the camera.
    Static,
    Dynamic,
}

/// Quad centres of one translucent mesh, relative to its section origin.
#[derive(Clone, Debug, PartialEq)]
pub struct SortState {
    centres: Vec<[f32; 3]>,
}

impl SortState {
    /// Creates a sort state from quad centres.
    pub fn new(centres: Vec<[f32; 3]>) -> Self {
        Self { centres }
    }

    /// Computes quad centres from vertex positions, four vertices per quad.
    pub fn from_quad_vertices(positions: &[[f32; 3]]) -> Self {
        let centres = positions
            .chunks_exact(4)
            .map(|quad| {
                let mut centre = [0.0; 3];
                for vertex in quad {
                    for axis in 0..3 {
                        centre[axis] += vertex[axis] * 0.25;
                    }
                }
                centre
            })
            .collect();
        Self { centres }
    }

    pub fn quad_count(&self) -> usize {
        self.centres.len()
    }

    pub fn sort_level(&self) -> SortLevel {
        match self.centres.len() {
            0 => SortLevel::None,
            1 => SortLevel::Static,
            _ => SortLevel::Dynamic,
        }
    }

    /// Quad order from farthest to nearest. Ties keep mesh order.
    ///
    /// # Arguments
    /// * `camera` - Camera position relative to the section origin
    pub fn sorted_quads(&self, camera: Point3<f32>) -> Vec<u32> {
        let distances: Vec<f32> = self
            .centres
            .iter()
            .map(|centre| {
                let dx = centre[0] - camera.x;
                let dy = centre[1] - camera.y;
                let dz = centre[2] - camera.z;
                dx * dx + dy * dy + dz * dz
            })
            .collect();

        let mut order: Vec<u32> = (0..self.centres.len() as u32).collect();
        order.sort_by(|&a, &b| distances[b as usize].total_cmp(&distances[a as usize]));
        order
    }

    /// Index buffer drawing the quads back to front.
    pub fn sorted_indices(&self, camera: Point3<f32>) -> Vec<u32> {
        let mut indices = Vec::with_capacity(self.centres.len() * 6);
        for quad in self.sorted_quads(camera) {
            let base = quad * 4;
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }
        indices
    }

    /// [`Self::sorted_indices`] as raw bytes for upload.
    pub fn sorted_index_bytes(&self, camera: Point3<f32>) -> Vec<u8> {
        bytemuck::cast_slice(&self.sorted_indices(camera)).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn farthest_quads_come_first() {
        let state = SortState::new(vec![[1.0, 0.0, 0.0], [10.0, 0.0, 0.0], [5.0, 0.0, 0.0]]);
        assert_eq!(state.sorted_quads(Point3::new(0.0, 0.0, 0.0)), vec![1, 2, 0]);
        assert_eq!(state.sorted_quads(Point3::new(12.0, 0.0, 0.0)), vec![0, 2, 1]);
    }

    #[test]
    fn equal_distances_keep_mesh_order() {
        let state = SortState::new(vec![[1.0, 0.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        assert_eq!(state.sorted_quads(Point3::new(0.0, 0.0, 0.0)), vec![0, 1, 2]);
    }

    #[test]
    fn indices_follow_the_quad_pattern() {
        let state = SortState::from_quad_vertices(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ]);
        assert_eq!(state.quad_count(), 1);
        assert_eq!(state.sorted_indices(Point3::new(0.0, 0.0, 5.0)), vec![0, 1, 2, 2, 3, 0]);
        assert_eq!(state.sorted_index_bytes(Point3::new(0.0, 0.0, 5.0)).len(), 24);
    }
}
