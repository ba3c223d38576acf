//! Per-face and per-vertex geometric quantities.
//!
//! Everything here is a pure derivation over a [`MeshTopology`] and a
//! position table. Degenerate faces are valid input: they have zero area
//! and an unnormalized (zero-length) normal, and are reported as
//! [`GeometryIssue`]s rather than errors.

use nalgebra::{Point3, Vector3};
use tracing::{debug, warn};

use crate::error::{GeometryIssue, MeshError, MeshResult};
use crate::topology::MeshTopology;
use crate::tracing_ext::OperationTimer;
use crate::types::{DEGENERATE_SINE, Triangle};

/// Arithmetic mean of the positions of `ids`; the origin when `ids` is empty.
pub fn centroid_of(positions: &[Point3<f64>], ids: &[u32]) -> Point3<f64> {
    if ids.is_empty() {
        return Point3::origin();
    }
    let sum = ids
        .iter()
        .fold(Vector3::zeros(), |acc, &i| acc + positions[i as usize].coords);
    Point3::from(sum / ids.len() as f64)
}

/// Face normals after the normalization pass.
#[derive(Debug, Clone, Default)]
pub struct FaceNormals {
    /// One entry per face. Unit length, except for degenerate faces whose
    /// raw cross product is kept as is.
    pub normals: Vec<Vector3<f64>>,

    /// Faces whose normal could not be normalized.
    pub degenerate: Vec<GeometryIssue>,
}

/// Read-only geometric view over a topology and matching positions.
#[derive(Debug, Clone, Copy)]
pub struct GeometryView<'a> {
    topology: &'a MeshTopology,
    positions: &'a [Point3<f64>],
}

impl<'a> GeometryView<'a> {
    /// Pair a topology with its position table.
    ///
    /// # Errors
    ///
    /// [`MeshError::DimensionMismatch`] if there is not exactly one position
    /// per topology vertex.
    pub fn new(topology: &'a MeshTopology, positions: &'a [Point3<f64>]) -> MeshResult<Self> {
        if positions.len() != topology.num_vertices() {
            return Err(MeshError::dimension_mismatch(
                "positions",
                topology.num_vertices(),
                positions.len(),
                3,
            ));
        }
        Ok(Self { topology, positions })
    }

    /// Pair tables the caller already keeps in sync.
    pub(crate) fn from_consistent(topology: &'a MeshTopology, positions: &'a [Point3<f64>]) -> Self {
        debug_assert_eq!(positions.len(), topology.num_vertices());
        Self { topology, positions }
    }

    #[inline]
    pub fn topology(&self) -> &'a MeshTopology {
        self.topology
    }

    #[inline]
    pub fn positions(&self) -> &'a [Point3<f64>] {
        self.positions
    }

    /// Concrete triangle for face `f`.
    #[inline]
    pub fn triangle(&self, f: usize) -> Option<Triangle> {
        self.topology.face_vertices(f).map(|[a, b, c]| {
            Triangle::new(
                self.positions[a as usize],
                self.positions[b as usize],
                self.positions[c as usize],
            )
        })
    }

    /// Mean of the face's vertex positions; the origin for an unknown face.
    pub fn face_centroid(&self, f: usize) -> Point3<f64> {
        match self.topology.face_vertices(f) {
            Some(ids) => centroid_of(self.positions, &ids),
            None => centroid_of(self.positions, &[]),
        }
    }

    /// Cross product of two edge vectors, not normalized.
    ///
    /// Its length is twice the face area.
    #[inline]
    pub fn face_normal(&self, f: usize) -> Vector3<f64> {
        self.triangle(f)
            .map_or_else(Vector3::zeros, |t| t.normal_unnormalized())
    }

    /// Half the magnitude of the face's cross product; zero when degenerate.
    #[inline]
    pub fn face_area(&self, f: usize) -> f64 {
        self.triangle(f).map_or(0.0, |t| t.area())
    }

    /// Centroids of every face, in face-id order.
    pub fn face_centroids(&self) -> Vec<Point3<f64>> {
        self.topology
            .faces()
            .iter()
            .map(|ids| centroid_of(self.positions, ids))
            .collect()
    }

    /// Areas of every face, in face-id order.
    pub fn face_areas(&self) -> Vec<f64> {
        (0..self.topology.num_faces())
            .map(|f| self.face_area(f))
            .collect()
    }

    /// Sum of all face areas.
    pub fn total_surface_area(&self) -> f64 {
        (0..self.topology.num_faces())
            .map(|f| self.face_area(f))
            .sum()
    }

    /// Faces with area at or below `tolerance`.
    pub fn degenerate_faces(&self, tolerance: f64) -> Vec<GeometryIssue> {
        (0..self.topology.num_faces())
            .filter_map(|f| {
                let area = self.face_area(f);
                (area <= tolerance).then_some(GeometryIssue::DegenerateFace { face_index: f, area })
            })
            .collect()
    }

    /// Normalize every face normal, warning once about degenerate faces.
    ///
    /// A face whose normal is undefined at its own scale (see
    /// [`Triangle::normal`]) keeps its raw cross product and is flagged.
    pub fn face_unit_normals(&self) -> FaceNormals {
        let out = self.face_unit_normals_quiet();
        if !out.degenerate.is_empty() {
            warn!(
                degenerate_faces = out.degenerate.len(),
                "Degenerate face normals left unnormalized"
            );
        }
        out
    }

    /// [`Self::face_unit_normals`] without the warning.
    pub(crate) fn face_unit_normals_quiet(&self) -> FaceNormals {
        let mut out = FaceNormals {
            normals: Vec::with_capacity(self.topology.num_faces()),
            degenerate: Vec::new(),
        };

        for f in 0..self.topology.num_faces() {
            match self.triangle(f).and_then(|t| t.normal()) {
                Some(n) => out.normals.push(n),
                None => {
                    out.normals.push(self.face_normal(f));
                    out.degenerate.push(GeometryIssue::DegenerateNormal { face_index: f });
                }
            }
        }
        out
    }

    /// Area-weighted vertex normals.
    ///
    /// Each vertex accumulates the raw cross products of its incident faces,
    /// so larger faces weigh more. A vertex gets a zero vector when the sum
    /// vanishes relative to the contributions that went into it
    /// (unreferenced, only degenerate neighbors, or opposing faces that
    /// cancel).
    pub fn vertex_normals(&self) -> Vec<Vector3<f64>> {
        let _timer = OperationTimer::with_context(
            "vertex_normals",
            self.topology.num_faces(),
            self.topology.num_vertices(),
        );

        let mut accum = vec![Vector3::zeros(); self.positions.len()];
        let mut magnitude = vec![0.0f64; self.positions.len()];
        for (f, face) in self.topology.faces().iter().enumerate() {
            let weighted = self.face_normal(f);
            let len = weighted.norm();
            for &v in face {
                accum[v as usize] += weighted;
                magnitude[v as usize] += len;
            }
        }

        let mut zero = 0usize;
        for (n, &total) in accum.iter_mut().zip(&magnitude) {
            let len = n.norm();
            if len > 0.0 && len > DEGENERATE_SINE * total {
                *n /= len;
            } else {
                *n = Vector3::zeros();
                zero += 1;
            }
        }

        debug!(
            vertices = accum.len(),
            without_normal = zero,
            "Computed vertex normals"
        );
        accum
    }
}
