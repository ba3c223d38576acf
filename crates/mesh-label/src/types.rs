//! Core mesh data types.
//!
//! [`Mesh`] is the raw indexed triangle soup exchanged with the I/O layer.
//! The labeled, topology-aware aggregate built from it lives in [`crate::model`].

use nalgebra::{Point3, Vector3};

/// RGB color with 8-bit components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
pub struct VertexColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl VertexColor {
    /// Mid-gray, used when a source carries no color attribute.
    pub const MID_GRAY: VertexColor = VertexColor::new(128, 128, 128);

    /// Create a new color from RGB components.
    #[inline]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Create a color from floating point values in [0, 1] range.
    ///
    /// Components are scaled by 255, rounded and clamped to the byte range.
    #[inline]
    pub fn from_float(r: f64, g: f64, b: f64) -> Self {
        Self {
            r: unit_to_byte(r),
            g: unit_to_byte(g),
            b: unit_to_byte(b),
        }
    }

    /// Convert to floating point values in [0, 1] range.
    #[inline]
    pub fn to_float(&self) -> [f64; 3] {
        [
            self.r as f64 / 255.0,
            self.g as f64 / 255.0,
            self.b as f64 / 255.0,
        ]
    }
}

impl Default for VertexColor {
    fn default() -> Self {
        Self::MID_GRAY
    }
}

#[inline]
fn unit_to_byte(c: f64) -> u8 {
    if c.is_nan() {
        return 0;
    }
    (c * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Sine of the corner angle below which a triangle has no defined normal.
pub const DEGENERATE_SINE: f64 = 1e-12;

/// A vertex as delivered by a mesh source.
#[derive(Debug, Clone)]
pub struct Vertex {
    /// 3D position.
    pub position: Point3<f64>,

    /// Normal supplied by the source, if any.
    pub normal: Option<Vector3<f64>>,

    /// Vertex color (RGB), if any.
    pub color: Option<VertexColor>,
}

impl Vertex {
    /// Create a new vertex with only position set.
    #[inline]
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            normal: None,
            color: None,
        }
    }

    /// Create a vertex from raw coordinates.
    #[inline]
    pub fn from_coords(x: f64, y: f64, z: f64) -> Self {
        Self::new(Point3::new(x, y, z))
    }
}

/// An indexed triangle soup: vertex list plus per-face vertex-id triples.
///
/// Ids are dense and 0-based. No connectivity is stored here.
#[derive(Debug, Clone)]
pub struct Mesh {
    /// Vertex data.
    pub vertices: Vec<Vertex>,

    /// Triangle faces as indices into the vertex array.
    /// Each face is [v0, v1, v2] with counter-clockwise winding.
    pub faces: Vec<[u32; 3]>,
}

impl Mesh {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
        }
    }

    /// Create a mesh with pre-allocated capacity.
    pub fn with_capacity(vertex_count: usize, face_count: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_count),
            faces: Vec::with_capacity(face_count),
        }
    }

    /// Build a mesh from raw positions and triangles.
    pub fn from_raw(positions: &[[f64; 3]], faces: &[[u32; 3]]) -> Self {
        Self {
            vertices: positions
                .iter()
                .map(|&[x, y, z]| Vertex::from_coords(x, y, z))
                .collect(),
            faces: faces.to_vec(),
        }
    }

    /// Number of vertices in the mesh.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of faces (triangles) in the mesh.
    #[inline]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if mesh is empty (no vertices or faces).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Compute the axis-aligned bounding box.
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_points(self.vertices.iter().map(|v| &v.position))
    }

    /// Get a specific triangle by face index.
    pub fn triangle(&self, face_idx: usize) -> Option<Triangle> {
        self.faces.get(face_idx).map(|&[i0, i1, i2]| Triangle {
            v0: self.vertices[i0 as usize].position,
            v1: self.vertices[i1 as usize].position,
            v2: self.vertices[i2 as usize].position,
        })
    }
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}

/// A triangle with concrete vertex positions.
///
/// Winding is counter-clockwise when viewed from the front.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub v0: Point3<f64>,
    pub v1: Point3<f64>,
    pub v2: Point3<f64>,
}

impl Triangle {
    /// Create a new triangle from three points.
    #[inline]
    pub fn new(v0: Point3<f64>, v1: Point3<f64>, v2: Point3<f64>) -> Self {
        Self { v0, v1, v2 }
    }

    /// Compute the (unnormalized) face normal via cross product.
    /// The direction follows the right-hand rule with CCW winding,
    /// and its length is twice the triangle area.
    #[inline]
    pub fn normal_unnormalized(&self) -> Vector3<f64> {
        let e1 = self.v1 - self.v0;
        let e2 = self.v2 - self.v0;
        e1.cross(&e2)
    }

    /// Compute the unit face normal.
    ///
    /// Returns None for degenerate triangles: the cross product vanishes
    /// relative to its edge lengths (see [`DEGENERATE_SINE`]), so the test
    /// does not depend on the mesh's scale.
    pub fn normal(&self) -> Option<Vector3<f64>> {
        let e1 = self.v1 - self.v0;
        let e2 = self.v2 - self.v0;
        let n = e1.cross(&e2);
        let len_sq = n.norm_squared();
        let scale_sq = e1.norm_squared() * e2.norm_squared();
        if len_sq > 0.0 && len_sq > DEGENERATE_SINE * DEGENERATE_SINE * scale_sq {
            Some(n / len_sq.sqrt())
        } else {
            None
        }
    }

    /// Compute the area of the triangle.
    #[inline]
    pub fn area(&self) -> f64 {
        self.normal_unnormalized().norm() * 0.5
    }

    /// Compute the centroid (center of mass).
    #[inline]
    pub fn centroid(&self) -> Point3<f64> {
        Point3::new(
            (self.v0.x + self.v1.x + self.v2.x) / 3.0,
            (self.v0.y + self.v1.y + self.v2.y) / 3.0,
            (self.v0.z + self.v1.z + self.v2.z) / 3.0,
        )
    }
}

/// Axis-aligned bounding box over vertex positions.
///
/// An empty box (no points) has `min > max` on every axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl BoundingBox {
    /// A box containing nothing.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Smallest box containing all `points`.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Self {
        let mut bb = Self::empty();
        for p in points {
            bb.expand(p);
        }
        bb
    }

    /// Grow the box to contain `p`.
    #[inline]
    pub fn expand(&mut self, p: &Point3<f64>) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    /// True when no point has been added.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    /// Extent along each axis, zero for an empty box.
    pub fn dimensions(&self) -> Vector3<f64> {
        if self.is_empty() {
            Vector3::zeros()
        } else {
            self.max - self.min
        }
    }

    /// Center point, `None` for an empty box.
    pub fn center(&self) -> Option<Point3<f64>> {
        if self.is_empty() {
            None
        } else {
            Some(nalgebra::center(&self.min, &self.max))
        }
    }

    /// Length of the box diagonal.
    pub fn diagonal(&self) -> f64 {
        self.dimensions().norm()
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-10
    }

    #[test]
    fn test_vertex_creation() {
        let v = Vertex::from_coords(1.0, 2.0, 3.0);
        assert!(approx_eq(v.position.x, 1.0));
        assert!(approx_eq(v.position.y, 2.0));
        assert!(approx_eq(v.position.z, 3.0));
        assert!(v.normal.is_none());
        assert!(v.color.is_none());
    }

    #[test]
    fn test_color_float_conversion() {
        let c = VertexColor::from_float(1.0, 0.5, 0.0);
        assert_eq!(c, VertexColor::new(255, 128, 0));

        let clamped = VertexColor::from_float(2.0, -1.0, f64::NAN);
        assert_eq!(clamped, VertexColor::new(255, 0, 0));

        let [r, g, b] = VertexColor::new(255, 0, 51).to_float();
        assert!(approx_eq(r, 1.0));
        assert!(approx_eq(g, 0.0));
        assert!(approx_eq(b, 0.2));
    }

    #[test]
    fn test_triangle_normal_and_area() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        );

        let normal = tri.normal().expect("non-degenerate triangle");
        assert!(approx_eq(normal.z, 1.0));
        assert!(approx_eq(tri.area(), 0.5));
        assert!(approx_eq(tri.normal_unnormalized().norm(), 1.0));
    }

    #[test]
    fn test_triangle_centroid() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(0.0, 3.0, 0.0),
        );
        let c = tri.centroid();
        assert!(approx_eq(c.x, 1.0));
        assert!(approx_eq(c.y, 1.0));
        assert!(approx_eq(c.z, 0.0));
    }

    #[test]
    fn test_tiny_triangle_has_unit_normal() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1e-7, 0.0, 0.0),
            Point3::new(0.0, 1e-7, 0.0),
        );
        let normal = tri.normal().expect("well-shaped triangle");
        assert!(approx_eq(normal.z, 1.0));
    }

    #[test]
    fn test_sliver_scaled_up_stays_degenerate() {
        // collinear up to rounding, at a scale where the raw cross product
        // is far above f64::EPSILON
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1e9, 1e9, 0.0),
            Point3::new(3e9, 3e9 + 1e-6, 0.0),
        );
        assert!(tri.normal_unnormalized().norm_squared() > f64::EPSILON);
        assert!(tri.normal().is_none());
    }

    #[test]
    fn test_degenerate_triangle_normal() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        );
        assert!(tri.normal().is_none());
        assert!(approx_eq(tri.area(), 0.0));
    }

    #[test]
    fn test_mesh_bounds() {
        let mesh = Mesh::from_raw(
            &[[0.0, 0.0, 0.0], [10.0, 5.0, 3.0], [-2.0, 8.0, 1.0]],
            &[[0, 1, 2]],
        );

        let bb = mesh.bounds();
        assert!(!bb.is_empty());
        assert!(approx_eq(bb.min.x, -2.0));
        assert!(approx_eq(bb.min.y, 0.0));
        assert!(approx_eq(bb.max.x, 10.0));
        assert!(approx_eq(bb.max.y, 8.0));
        assert!(approx_eq(bb.max.z, 3.0));
        assert!(approx_eq(bb.dimensions().x, 12.0));
    }

    #[test]
    fn test_empty_bounds() {
        let mesh = Mesh::new();
        let bb = mesh.bounds();
        assert!(bb.is_empty());
        assert!(bb.center().is_none());
        assert!(approx_eq(bb.diagonal(), 0.0));
    }

    #[test]
    fn test_mesh_is_empty() {
        let mesh = Mesh::new();
        assert!(mesh.is_empty());

        let mut mesh2 = Mesh::new();
        mesh2.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        assert!(mesh2.is_empty()); // no faces

        mesh2.faces.push([0, 0, 0]);
        assert!(!mesh2.is_empty());
    }
}
