//! # Occlusion Culling
//!
//! Breadth-first walk of the section graph from the camera outward. Every
//! reachable section is reported to an [`OcclusionVisitor`] exactly once per
//! traversal, in traversal order, together with whether it is visible.
//!
//! ## Traversal Rules
//!
//! * Only visible sections (within the search distance and inside the
//!   frustum) are expanded.
//! * Steps only move away from the camera section along their axis, so the
//!   walk never doubles back.
//! * With occlusion culling enabled a section is left only through faces its
//!   [`VisibilityEncoding`](crate::rendering::section::VisibilityEncoding)
//!   connects to a face it was entered through. Unbuilt sections connect
//!   every face.

pub mod viewport;

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};

use cgmath::Point3;
use log::trace;

use crate::core::position::pack_section;
use crate::rendering::section::RenderSection;
use crate::world::facing::ModelQuadFacing;

pub use viewport::Viewport;

const ALL_DIRECTIONS: u32 = (1 << ModelQuadFacing::DIRECTION_COUNT) - 1;
/// Incoming mask of traversal start points, which may leave through any face.
const SEED: u32 = u32::MAX;

/// Receives the sections reached by a traversal.
pub trait OcclusionVisitor {
    fn visit(&mut self, section: &RenderSection, visible: bool);
}

/// Counts from one traversal.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TraversalStats {
    pub visited: usize,
    pub visible: usize,
}

/// Walks the loaded sections.
pub struct OcclusionCuller<'a> {
    sections: &'a HashMap<u64, RenderSection>,
}

impl<'a> OcclusionCuller<'a> {
    /// # Arguments
    /// * `sections` - Loaded sections keyed by [`pack_section`]
    pub fn new(sections: &'a HashMap<u64, RenderSection>) -> Self {
        Self { sections }
    }

    /// Visits every section reachable from the camera.
    ///
    /// When the camera section is not loaded, every loaded section is a start
    /// point, nearest first.
    ///
    /// # Arguments
    /// * `visitor` - Receives each reached section once
    /// * `viewport` - Camera position and frustum
    /// * `search_distance` - Horizontal distance limit in blocks
    /// * `use_occlusion_culling` - Follow face connectivity
    /// * `frame` - Frame number, for tracing
    pub fn find_visible(
        &self,
        visitor: &mut dyn OcclusionVisitor,
        viewport: &Viewport,
        search_distance: f32,
        use_occlusion_culling: bool,
        frame: i64,
    ) -> TraversalStats {
        let origin = viewport.camera_section();
        let camera = viewport.camera();

        let mut incoming: HashMap<u64, u32> = HashMap::new();
        let mut queue: VecDeque<Point3<i32>> = VecDeque::new();
        let origin_key = pack_section(origin.x, origin.y, origin.z);

        if self.sections.contains_key(&origin_key) {
            incoming.insert(origin_key, SEED);
            queue.push_back(origin);
        } else {
            let mut seeds: Vec<&RenderSection> = self.sections.values().collect();
            seeds.sort_by(|a, b| {
                a.squared_distance(camera)
                    .total_cmp(&b.squared_distance(camera))
                    .then_with(|| {
                        let (a, b) = (a.position(), b.position());
                        (a.x, a.y, a.z).cmp(&(b.x, b.y, b.z))
                    })
            });
            for section in seeds {
                let position = section.position();
                incoming.insert(pack_section(position.x, position.y, position.z), SEED);
                queue.push_back(position);
            }
        }

        let mut stats = TraversalStats::default();
        while let Some(position) = queue.pop_front() {
            let key = pack_section(position.x, position.y, position.z);
            let Some(section) = self.sections.get(&key) else {
                continue;
            };

            let visible = is_within_distance(section, camera, search_distance)
                && viewport.is_box_visible(section.min_block(), section.max_block());
            visitor.visit(section, visible);
            stats.visited += 1;
            if !visible {
                continue;
            }
            stats.visible += 1;

            let entered = incoming.get(&key).copied().unwrap_or(SEED);
            let mut outgoing = if entered == SEED || !use_occlusion_culling {
                ALL_DIRECTIONS
            } else {
                section.visibility().outgoing(entered)
            };
            outgoing &= outward_directions(position, origin);

            for direction in ModelQuadFacing::directions() {
                if outgoing & direction.bit() == 0 {
                    continue;
                }
                let neighbour = position + direction.step();
                let neighbour_key = pack_section(neighbour.x, neighbour.y, neighbour.z);
                if !self.sections.contains_key(&neighbour_key) {
                    continue;
                }
                match incoming.entry(neighbour_key) {
                    Entry::Vacant(entry) => {
                        entry.insert(direction.opposite().bit());
                        queue.push_back(neighbour);
                    }
                    Entry::Occupied(mut entry) => {
                        *entry.get_mut() |= direction.opposite().bit();
                    }
                }
            }
        }

        trace!(
            "Frame {}: visited {} sections, {} visible",
            frame,
            stats.visited,
            stats.visible
        );
        stats
    }
}

/// Directions that do not lead back toward the camera section.
fn outward_directions(position: Point3<i32>, origin: Point3<i32>) -> u32 {
    let mut mask = 0;
    if position.x >= origin.x {
        mask |= ModelQuadFacing::PosX.bit();
    }
    if position.x <= origin.x {
        mask |= ModelQuadFacing::NegX.bit();
    }
    if position.y >= origin.y {
        mask |= ModelQuadFacing::PosY.bit();
    }
    if position.y <= origin.y {
        mask |= ModelQuadFacing::NegY.bit();
    }
    if position.z >= origin.z {
        mask |= ModelQuadFacing::PosZ.bit();
    }
    if position.z <= origin.z {
        mask |= ModelQuadFacing::NegZ.bit();
    }
    mask
}

fn axis_distance(value: f32, min: f32, max: f32) -> f32 {
    if value < min {
        min - value
    } else if value > max {
        value - max
    } else {
        0.0
    }
}

/// Cylindrical distance test against the nearest point of the section.
fn is_within_distance(section: &RenderSection, camera: Point3<f32>, distance: f32) -> bool {
    let min = section.min_block();
    let max = section.max_block();
    let dx = axis_distance(camera.x, min.x, max.x);
    let dy = axis_distance(camera.y, min.y, max.y);
    let dz = axis_distance(camera.z, min.z, max.z);
    dx * dx + dz * dz <= distance * distance && dy <= distance
}
