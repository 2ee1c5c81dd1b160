use std::fmt;

use glam::Vec3;
use noise::{NoiseFn, Perlin};

/// Grid of terrain heights in world units, `width` samples along X and
/// `depth` along Z, `xz_scale` world units apart.
#[derive(Debug, Clone)]
pub struct Heightfield {
    width: usize,
    depth: usize,
    xz_scale: f32,
    height_scale: f32,
    heights: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

#[derive(Debug, Clone, Default)]
pub struct TerrainMesh {
    pub vertices: Vec<TerrainVertex>,
    pub indices: Vec<u32>,
}

#[derive(Debug)]
pub enum HeightfieldError {
    SampleCountMismatch {
        expected: usize,
        actual: usize,
    },
    EmptyGrid,
}

impl fmt::Display for HeightfieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SampleCountMismatch { expected, actual } => {
                write!(f, "expected {expected} height samples, got {actual}")
            }
            Self::EmptyGrid => write!(f, "heightfield needs at least a 2x2 grid"),
        }
    }
}

impl std::error::Error for HeightfieldError {}

impl Heightfield {
    /// Builds the grid from 8-bit luma samples, row-major with X varying
    /// fastest: height = luma/255 * height_scale.
    pub fn from_luma(
        width: usize,
        depth: usize,
        samples: &[u8],
        xz_scale: f32,
        height_scale: f32,
    ) -> Result<Self, HeightfieldError> {
        if width < 2 || depth < 2 {
            return Err(HeightfieldError::EmptyGrid);
        }
        if samples.len() != width * depth {
            return Err(HeightfieldError::SampleCountMismatch {
                expected: width * depth,
                actual: samples.len(),
            });
        }

        let heights = samples
            .iter()
            .map(|&luma| (luma as f32 / 255.0) * height_scale)
            .collect();

        Ok(Self {
            width,
            depth,
            xz_scale,
            height_scale,
            heights,
        })
    }

    /// Procedural stand-in for a heightmap asset: a few octaves of Perlin
    /// noise remapped to [0, height_scale].
    pub fn from_noise(
        seed: u32,
        width: usize,
        depth: usize,
        xz_scale: f32,
        height_scale: f32,
    ) -> Self {
        debug_assert!(width >= 2 && depth >= 2);
        let perlin = Perlin::new(seed);
        let mut heights = Vec::with_capacity(width * depth);

        for z in 0..depth {
            for x in 0..width {
                let nx = x as f64 / width as f64;
                let nz = z as f64 / depth as f64;
                let mut amplitude = 1.0;
                let mut frequency = 1.5;
                let mut total = 0.0;
                let mut range = 0.0;
                for _ in 0..4 {
                    total += perlin.get([nx * frequency, nz * frequency]) * amplitude;
                    range += amplitude;
                    amplitude *= 0.5;
                    frequency *= 2.0;
                }
                // [-range, range] -> [0, 1]
                let normalized = ((total / range) * 0.5 + 0.5) as f32;
                heights.push(normalized.clamp(0.0, 1.0) * height_scale);
            }
        }

        Self {
            width,
            depth,
            xz_scale,
            height_scale,
            heights,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn height_scale(&self) -> f32 {
        self.height_scale
    }

    /// World-space size along X and Z.
    pub fn world_extent(&self) -> (f32, f32) {
        (
            (self.width - 1) as f32 * self.xz_scale,
            (self.depth - 1) as f32 * self.xz_scale,
        )
    }

    pub fn center(&self) -> Vec3 {
        let (ex, ez) = self.world_extent();
        Vec3::new(ex * 0.5, 0.0, ez * 0.5)
    }

    fn grid_height(&self, x: usize, z: usize) -> f32 {
        let x = x.min(self.width - 1);
        let z = z.min(self.depth - 1);
        self.heights[z * self.width + x]
    }

    /// Bilinear height at a world-space XZ position, clamped to the grid.
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        let gx = (x / self.xz_scale).clamp(0.0, (self.width - 1) as f32);
        let gz = (z / self.xz_scale).clamp(0.0, (self.depth - 1) as f32);

        let x0 = gx.floor() as usize;
        let z0 = gz.floor() as usize;
        let tx = gx - x0 as f32;
        let tz = gz - z0 as f32;

        let h00 = self.grid_height(x0, z0);
        let h10 = self.grid_height(x0 + 1, z0);
        let h01 = self.grid_height(x0, z0 + 1);
        let h11 = self.grid_height(x0 + 1, z0 + 1);

        let near = h00 + (h10 - h00) * tx;
        let far = h01 + (h11 - h01) * tx;
        near + (far - near) * tz
    }

    fn normal_at(&self, x: usize, z: usize) -> Vec3 {
        let left = self.grid_height(x.saturating_sub(1), z);
        let right = self.grid_height(x + 1, z);
        let near = self.grid_height(x, z.saturating_sub(1));
        let far = self.grid_height(x, z + 1);

        Vec3::new(left - right, 2.0 * self.xz_scale, near - far).normalize()
    }

    /// Triangle-list mesh over the grid: one vertex per sample, two
    /// counter-clockwise triangles per cell.
    pub fn build_mesh(&self) -> TerrainMesh {
        let mut vertices = Vec::with_capacity(self.width * self.depth);
        for z in 0..self.depth {
            for x in 0..self.width {
                let normal = self.normal_at(x, z);
                vertices.push(TerrainVertex {
                    position: [
                        x as f32 * self.xz_scale,
                        self.grid_height(x, z),
                        z as f32 * self.xz_scale,
                    ],
                    normal: normal.to_array(),
                    uv: [
                        x as f32 / self.width as f32,
                        z as f32 / self.depth as f32,
                    ],
                });
            }
        }

        let mut indices = Vec::with_capacity((self.width - 1) * (self.depth - 1) * 6);
        for z in 0..self.depth - 1 {
            for x in 0..self.width - 1 {
                let vertex = (z * self.width + x) as u32;
                let width = self.width as u32;

                indices.push(vertex);
                indices.push(vertex + width);
                indices.push(vertex + width + 1);

                indices.push(vertex);
                indices.push(vertex + width + 1);
                indices.push(vertex + 1);
            }
        }

        TerrainMesh { vertices, indices }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::{Heightfield, HeightfieldError};

    #[test]
    fn rejects_mismatched_sample_counts_and_degenerate_grids() {
        assert!(matches!(
            Heightfield::from_luma(4, 4, &[0; 15], 1.0, 10.0),
            Err(HeightfieldError::SampleCountMismatch {
                expected: 16,
                actual: 15,
            })
        ));
        assert!(matches!(
            Heightfield::from_luma(1, 4, &[0; 4], 1.0, 10.0),
            Err(HeightfieldError::EmptyGrid)
        ));
    }

    #[test]
    fn full_luma_maps_to_height_scale() {
        let field = Heightfield::from_luma(2, 2, &[0, 255, 0, 255], 5.0, 250.0).unwrap();
        assert_eq!(field.height_at(0.0, 0.0), 0.0);
        assert_eq!(field.height_at(5.0, 0.0), 250.0);
        assert_eq!(field.height_at(5.0, 5.0), 250.0);
    }

    #[test]
    fn height_at_interpolates_between_grid_corners() {
        let field = Heightfield::from_luma(2, 2, &[0, 255, 0, 255], 10.0, 100.0).unwrap();
        // Halfway along X between a 0 column and a full column.
        let mid = field.height_at(5.0, 5.0);
        assert!((mid - 50.0).abs() < 1.0e-4);
        // Off-grid queries clamp instead of extrapolating.
        assert_eq!(field.height_at(-100.0, 0.0), 0.0);
        assert_eq!(field.height_at(1000.0, 0.0), 100.0);
    }

    #[test]
    fn mesh_has_expected_vertex_and_index_counts() {
        let field = Heightfield::from_noise(7, 16, 9, 2.0, 40.0);
        let mesh = field.build_mesh();

        assert_eq!(mesh.vertices.len(), 16 * 9);
        assert_eq!(mesh.indices.len(), 15 * 8 * 6);
        let max_index = *mesh.indices.iter().max().unwrap() as usize;
        assert!(max_index < mesh.vertices.len());
    }

    #[test]
    fn first_cell_triangles_follow_row_major_winding() {
        let field = Heightfield::from_luma(3, 3, &[0; 9], 1.0, 1.0).unwrap();
        let mesh = field.build_mesh();
        assert_eq!(&mesh.indices[..6], &[0, 3, 4, 0, 4, 1]);
    }

    #[test]
    fn normals_are_unit_length_and_face_upward() {
        let field = Heightfield::from_noise(42, 12, 12, 3.0, 60.0);
        let mesh = field.build_mesh();

        for vertex in &mesh.vertices {
            let normal = Vec3::from_array(vertex.normal);
            assert!((normal.length() - 1.0).abs() < 1.0e-4);
            assert!(normal.y > 0.0);
        }
    }

    #[test]
    fn noise_heights_stay_within_scale() {
        let field = Heightfield::from_noise(3, 8, 8, 1.0, 25.0);
        for z in 0..8 {
            for x in 0..8 {
                let h = field.grid_height(x, z);
                assert!((0.0..=25.0).contains(&h));
            }
        }
    }
}
