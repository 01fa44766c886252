//! Summary of a built section: which passes have geometry and how its faces
//! connect through open space.

use crate::world::facing::ModelQuadFacing;

const DIRECTIONS: usize = ModelQuadFacing::DIRECTION_COUNT;
const ROW_MASK: u64 = (1 << DIRECTIONS) - 1;

/// Face-to-face connectivity of a section as a 6×6 bit matrix.
///
/// Bit `from * 6 + to` is set when open space connects face `from` to face
/// `to`. The matrix is kept symmetric.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VisibilityEncoding(u64);

impl VisibilityEncoding {
    /// No face sees any other.
    pub const NOTHING: VisibilityEncoding = VisibilityEncoding(0);
    /// Every face sees every other.
    pub const EVERYTHING: VisibilityEncoding = VisibilityEncoding((1 << (DIRECTIONS * DIRECTIONS)) - 1);

    /// Raw matrix bits.
    pub fn bits(self) -> u64 {
        self.0
    }

    /// Connects two faces in both directions.
    pub fn connect(&mut self, a: ModelQuadFacing, b: ModelQuadFacing) {
        let (a, b) = (a.index(), b.index());
        if a >= DIRECTIONS || b >= DIRECTIONS {
            return;
        }
        self.0 |= 1 << (a * DIRECTIONS + b);
        self.0 |= 1 << (b * DIRECTIONS + a);
    }

    /// Connects every pair of faces in `face_mask`.
    pub fn connect_all(&mut self, face_mask: u32) {
        for a in ModelQuadFacing::directions() {
            if face_mask & a.bit() == 0 {
                continue;
            }
            for b in ModelQuadFacing::directions() {
                if face_mask & b.bit() != 0 {
                    self.connect(a, b);
                }
            }
        }
    }

    /// Whether open space connects two faces.
    pub fn is_connected(self, a: ModelQuadFacing, b: ModelQuadFacing) -> bool {
        let (a, b) = (a.index(), b.index());
        a < DIRECTIONS && b < DIRECTIONS && self.0 & (1 << (a * DIRECTIONS + b)) != 0
    }

    /// Faces reachable from any face in `incoming`.
    pub fn outgoing(self, incoming: u32) -> u32 {
        let mut outgoing = 0;
        for face in 0..DIRECTIONS {
            if incoming & (1 << face) != 0 {
                outgoing |= ((self.0 >> (face * DIRECTIONS)) & ROW_MASK) as u32;
            }
        }
        outgoing
    }
}

/// What a finished build produced for one section.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BuiltRenderSectionData {
    pass_mask: u32,
    visibility: VisibilityEncoding,
}

impl BuiltRenderSectionData {
    /// A section without geometry. Sees through every face so it never
    /// occludes anything.
    pub const EMPTY: BuiltRenderSectionData = BuiltRenderSectionData {
        pass_mask: 0,
        visibility: VisibilityEncoding::EVERYTHING,
    };

    /// Creates build data; a zero pass mask always yields [`Self::EMPTY`].
    pub fn new(pass_mask: u32, visibility: VisibilityEncoding) -> Self {
        if pass_mask == 0 {
            return Self::EMPTY;
        }
        Self { pass_mask, visibility }
    }

    /// Bit per render pass with geometry.
    pub fn pass_mask(&self) -> u32 {
        self.pass_mask
    }

    /// Whether any pass has geometry.
    pub fn has_block_geometry(&self) -> bool {
        self.pass_mask != 0
    }

    /// Face connectivity.
    pub fn visibility(&self) -> VisibilityEncoding {
        self.visibility
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ModelQuadFacing::*;

    #[test]
    fn zero_geometry_always_uses_the_empty_sentinel() {
        let data = BuiltRenderSectionData::new(0, VisibilityEncoding::NOTHING);
        assert_eq!(data, BuiltRenderSectionData::EMPTY);
        assert_eq!(data.visibility(), VisibilityEncoding::EVERYTHING);
        assert!(!data.has_block_geometry());
    }

    #[test]
    fn connections_are_symmetric() {
        let mut encoding = VisibilityEncoding::NOTHING;
        encoding.connect(PosX, NegZ);
        assert!(encoding.is_connected(NegZ, PosX));
        assert!(!encoding.is_connected(PosX, PosY));
        assert_eq!(encoding.outgoing(PosX.bit()), NegZ.bit());
        assert_eq!(encoding.outgoing(PosY.bit()), 0);
    }

    #[test]
    fn connect_all_links_every_face_in_the_mask() {
        let mut encoding = VisibilityEncoding::NOTHING;
        encoding.connect_all(ModelQuadFacing::ALL_MASK & !Unassigned.bit());
        assert_eq!(encoding, VisibilityEncoding::EVERYTHING);
        assert_eq!(encoding.outgoing(NegY.bit()), (1 << 6) - 1);
    }
}
