//! Terrain render passes and the vertex format each pass is drawn with.

/// A terrain render pass.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TerrainRenderPass {
    /// Opaque geometry.
    Solid = 0,
    /// Alpha-tested geometry.
    Cutout = 1,
    /// Blended geometry, drawn back to front.
    Translucent = 2,
}

impl TerrainRenderPass {
    /// Number of passes.
    pub const COUNT: usize = 3;

    /// Returns all passes in draw order.
    pub fn all() -> [TerrainRenderPass; 3] {
        [
            TerrainRenderPass::Solid,
            TerrainRenderPass::Cutout,
            TerrainRenderPass::Translucent,
        ]
    }

    /// Index of the pass in per-pass tables.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Single-bit mask of the pass.
    #[inline]
    pub fn bit(self) -> u32 {
        1 << self as u32
    }

    /// Whether the pass needs its quads sorted by camera distance.
    pub fn is_sorted(self) -> bool {
        self == TerrainRenderPass::Translucent
    }

    /// Whether render lists are walked back to front for this pass.
    pub fn is_reverse_order(self) -> bool {
        self.is_sorted()
    }

    /// Returns the pass with the given index, if any.
    pub fn from_index(index: usize) -> Option<TerrainRenderPass> {
        Self::all().get(index).copied()
    }
}

/// A vertex format. Meshes with different formats never share an arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexFormat {
    /// Stable identifier.
    pub id: u32,
    /// Size of one vertex in bytes.
    pub stride: u32,
    /// Debug name.
    pub name: &'static str,
}

/// Maps every render pass to the vertex format its meshes use.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RenderPassConfiguration {
    formats: [VertexFormat; TerrainRenderPass::COUNT],
}

impl RenderPassConfiguration {
    /// Uses one format for every pass.
    pub fn uniform(format: VertexFormat) -> Self {
        Self {
            formats: [format; TerrainRenderPass::COUNT],
        }
    }

    /// Overrides the format of a single pass.
    pub fn with_format(mut self, pass: TerrainRenderPass, format: VertexFormat) -> Self {
        self.formats[pass.index()] = format;
        self
    }

    /// Vertex format of `pass`.
    #[inline]
    pub fn vertex_format(&self, pass: TerrainRenderPass) -> VertexFormat {
        self.formats[pass.index()]
    }

    /// Distinct formats in pass order.
    pub fn distinct_formats(&self) -> Vec<VertexFormat> {
        let mut formats: Vec<VertexFormat> = Vec::with_capacity(TerrainRenderPass::COUNT);
        for format in self.formats {
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
        formats
    }
}

impl Default for RenderPassConfiguration {
    fn default() -> Self {
        Self::uniform(crate::rendering::vertex::ChunkVertex::FORMAT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_translucent_is_sorted() {
        let sorted: Vec<_> = TerrainRenderPass::all()
            .into_iter()
            .filter(|pass| pass.is_sorted())
            .collect();
        assert_eq!(sorted, vec![TerrainRenderPass::Translucent]);
    }

    #[test]
    fn distinct_formats_are_deduplicated() {
        let other = VertexFormat { id: 9, stride: 16, name: "compact" };
        let config = RenderPassConfiguration::default().with_format(TerrainRenderPass::Translucent, other);
        assert_eq!(config.distinct_formats().len(), 2);
        assert_eq!(RenderPassConfiguration::default().distinct_formats().len(), 1);
    }
}
