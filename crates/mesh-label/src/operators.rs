//! Sparse differential operators and weight matrices.
//!
//! All operators are indexed by dense vertex or face ids and assembled as
//! `CooMatrix` triplets, then compressed to `CsrMatrix`.
//!
//! | Operator | Shape | Entries |
//! |----------|-------|---------|
//! | [`OperatorBuilder::vertex_laplacian`] | V×V | `L[i,i] = \|N(i)\|`, `L[i,j] = -1` |
//! | [`OperatorBuilder::face_laplacian`] | F×F | `-w(i,j)` off-diagonal, row sum on diagonal |
//! | [`OperatorBuilder::face_areas`] | F | face area |
//! | [`OperatorBuilder::face_affinity`] | F×F | `exp(-d²/2σ²)`, zero diagonal |
//! | [`OperatorBuilder::face_adjacency_index`] | F×3 | neighbor per edge slot, `-1` if none |
//!
//! The per-edge dissimilarity `d(i, j)` between adjacent faces is pluggable
//! through [`FaceDissimilarity`].

use nalgebra::{DMatrix, DVector, Point3, Vector3};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use tracing::warn;

use crate::error::{GeometryIssue, MeshError, MeshResult};
use crate::geometry::{FaceNormals, GeometryView};
use crate::topology::{MeshTopology, NO_NEIGHBOR};
use crate::tracing_ext::{OperationTimer, log_operator_stats};

/// Per-face attributes available to dissimilarity functions.
#[derive(Debug, Clone, Default)]
pub struct FaceFeatures {
    pub centroids: Vec<Point3<f64>>,
    pub areas: Vec<f64>,
    /// Unit normals; zero-length for degenerate faces.
    pub normals: Vec<Vector3<f64>>,
}

impl FaceFeatures {
    /// Compute every feature for all faces of `view`.
    pub fn compute(view: &GeometryView<'_>) -> Self {
        // degenerate faces were already reported when normals were updated
        let FaceNormals {
            mut normals,
            degenerate,
        } = view.face_unit_normals_quiet();
        for issue in &degenerate {
            if let GeometryIssue::DegenerateNormal { face_index } = *issue {
                normals[face_index] = Vector3::zeros();
            }
        }

        Self {
            centroids: view.face_centroids(),
            areas: view.face_areas(),
            normals,
        }
    }
}

/// Dissimilarity between two adjacent faces.
///
/// Implementations should be symmetric; the builder always evaluates
/// `d(min(i, j), max(i, j))` so the resulting matrices are symmetric
/// regardless.
pub trait FaceDissimilarity {
    fn dissimilarity(&self, features: &FaceFeatures, i: usize, j: usize) -> f64;
}

impl<F> FaceDissimilarity for F
where
    F: Fn(&FaceFeatures, usize, usize) -> f64,
{
    fn dissimilarity(&self, features: &FaceFeatures, i: usize, j: usize) -> f64 {
        self(features, i, j)
    }
}

/// Built-in dissimilarity features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "snake_case"))]
pub enum Dissimilarity {
    /// `|A_i - A_j|`.
    #[default]
    AreaDifference,
    /// Euclidean distance between face centroids.
    CentroidDistance,
    /// Angle in radians between unit face normals.
    NormalAngle,
}

impl FaceDissimilarity for Dissimilarity {
    fn dissimilarity(&self, features: &FaceFeatures, i: usize, j: usize) -> f64 {
        match self {
            Dissimilarity::AreaDifference => (features.areas[i] - features.areas[j]).abs(),
            Dissimilarity::CentroidDistance => {
                (features.centroids[i] - features.centroids[j]).norm()
            }
            Dissimilarity::NormalAngle => features.normals[i]
                .dot(&features.normals[j])
                .clamp(-1.0, 1.0)
                .acos(),
        }
    }
}

impl std::str::FromStr for Dissimilarity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "area" | "area-difference" | "area_difference" => Ok(Dissimilarity::AreaDifference),
            "centroid" | "centroid-distance" | "centroid_distance" => {
                Ok(Dissimilarity::CentroidDistance)
            }
            "normal" | "normal-angle" | "normal_angle" => Ok(Dissimilarity::NormalAngle),
            other => Err(format!(
                "unknown dissimilarity '{}', expected area, centroid or normal",
                other
            )),
        }
    }
}

/// Parameters for [`OperatorBuilder::face_laplacian`].
///
/// Edge weight between adjacent faces:
/// `w_u + w_a · exp(-d(i,j)² / (2σ_a²))`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct FaceLaplacianParams {
    /// Uniform term `w_u`.
    pub uniform_weight: f64,
    /// Gaussian affinity term `w_a`.
    pub affinity_weight: f64,
    /// Gaussian width `σ_a`; must be > 0.
    pub affinity_sigma: f64,
    /// Feature compared between adjacent faces.
    pub dissimilarity: Dissimilarity,
}

impl Default for FaceLaplacianParams {
    fn default() -> Self {
        Self {
            uniform_weight: 1.0,
            affinity_weight: 1.0,
            affinity_sigma: 1.0,
            dissimilarity: Dissimilarity::AreaDifference,
        }
    }
}

impl FaceLaplacianParams {
    /// Purely combinatorial face Laplacian (every edge weight 1).
    pub fn uniform() -> Self {
        Self {
            uniform_weight: 1.0,
            affinity_weight: 0.0,
            ..Default::default()
        }
    }

    /// Affinity-only Laplacian with the given σ.
    pub fn affinity(sigma: f64) -> Self {
        Self {
            uniform_weight: 0.0,
            affinity_weight: 1.0,
            affinity_sigma: sigma,
            ..Default::default()
        }
    }

    /// Check the parameters before any matrix is built.
    pub fn validate(&self) -> MeshResult<()> {
        check_finite("uniform_weight", self.uniform_weight)?;
        check_finite("affinity_weight", self.affinity_weight)?;
        check_sigma("affinity_sigma", self.affinity_sigma)?;

        if self.uniform_weight < 0.0 || self.affinity_weight < 0.0 {
            warn!(
                uniform_weight = self.uniform_weight,
                affinity_weight = self.affinity_weight,
                "Negative face Laplacian weights; result may not be positive semi-definite"
            );
        }
        Ok(())
    }
}

fn check_finite(name: &'static str, value: f64) -> MeshResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(MeshError::invalid_parameter(name, value, "must be finite"))
    }
}

fn check_sigma(name: &'static str, sigma: f64) -> MeshResult<()> {
    check_finite(name, sigma)?;
    if sigma > 0.0 {
        Ok(())
    } else {
        Err(MeshError::invalid_parameter(name, sigma, "must be > 0"))
    }
}

#[inline]
fn gaussian(d: f64, sigma: f64) -> f64 {
    // σ² can underflow to zero; identical features still have affinity 1
    if d == 0.0 {
        return 1.0;
    }
    (-(d * d) / (2.0 * sigma * sigma)).exp()
}

/// Builds operators over a fully constructed topology.
#[derive(Debug, Clone, Copy)]
pub struct OperatorBuilder<'a> {
    view: GeometryView<'a>,
}

impl<'a> OperatorBuilder<'a> {
    /// Create a builder from a checked geometry view.
    pub fn new(view: GeometryView<'a>) -> Self {
        Self { view }
    }

    /// Create a builder from a topology and its position table.
    pub fn from_parts(topology: &'a MeshTopology, positions: &'a [Point3<f64>]) -> MeshResult<Self> {
        GeometryView::new(topology, positions).map(Self::new)
    }

    #[inline]
    fn topology(&self) -> &'a MeshTopology {
        self.view.topology()
    }

    /// Face features used by the dissimilarity functions.
    pub fn features(&self) -> FaceFeatures {
        FaceFeatures::compute(&self.view)
    }

    /// Uniform graph Laplacian over vertex-vertex adjacency.
    ///
    /// Symmetric, zero row sums, positive semi-definite. Unreferenced
    /// vertices have an empty row.
    pub fn vertex_laplacian(&self) -> CsrMatrix<f64> {
        let topology = self.topology();
        let n = topology.num_vertices();
        let _timer = OperationTimer::with_context("vertex_laplacian", topology.num_faces(), n);

        let mut coo = CooMatrix::new(n, n);
        for i in 0..n {
            let neighbors = topology.vertex_neighbors(i);
            if neighbors.is_empty() {
                continue;
            }
            coo.push(i, i, neighbors.len() as f64);
            for &j in neighbors {
                coo.push(i, j as usize, -1.0);
            }
        }

        let csr = CsrMatrix::from(&coo);
        log_operator_stats("vertex_laplacian", n, n, csr.nnz());
        csr
    }

    /// Weighted graph Laplacian over face-face adjacency using the built-in
    /// dissimilarity selected in `params`.
    ///
    /// # Errors
    ///
    /// [`MeshError::InvalidParameter`] for σ ≤ 0 or non-finite weights.
    pub fn face_laplacian(&self, params: &FaceLaplacianParams) -> MeshResult<CsrMatrix<f64>> {
        self.face_laplacian_with(params, &params.dissimilarity)
    }

    /// Weighted face Laplacian with a caller-supplied dissimilarity.
    ///
    /// `params.dissimilarity` is ignored.
    pub fn face_laplacian_with(
        &self,
        params: &FaceLaplacianParams,
        dissimilarity: &dyn FaceDissimilarity,
    ) -> MeshResult<CsrMatrix<f64>> {
        params.validate()?;

        let topology = self.topology();
        let n = topology.num_faces();
        let _timer = OperationTimer::with_context("face_laplacian", n, topology.num_vertices());

        let features = self.features();
        let mut coo = CooMatrix::new(n, n);
        for i in 0..n {
            let neighbors = topology.adjacent_faces(i);
            if neighbors.is_empty() {
                continue;
            }
            let mut diagonal = 0.0;
            for j in neighbors {
                let j = j as usize;
                let d = dissimilarity.dissimilarity(&features, i.min(j), i.max(j));
                let w = params.uniform_weight
                    + params.affinity_weight * gaussian(d, params.affinity_sigma);
                coo.push(i, j, -w);
                diagonal += w;
            }
            coo.push(i, i, diagonal);
        }

        let csr = CsrMatrix::from(&coo);
        log_operator_stats("face_laplacian", n, n, csr.nnz());
        Ok(csr)
    }

    /// Dense vector of face areas.
    pub fn face_areas(&self) -> DVector<f64> {
        DVector::from_vec(self.view.face_areas())
    }

    /// Gaussian affinity between adjacent faces using the default
    /// dissimilarity ([`Dissimilarity::AreaDifference`]).
    ///
    /// # Errors
    ///
    /// [`MeshError::InvalidParameter`] for σ ≤ 0 or non-finite σ.
    pub fn face_affinity(&self, sigma: f64) -> MeshResult<CsrMatrix<f64>> {
        self.face_affinity_with(sigma, &Dissimilarity::default())
    }

    /// Gaussian affinity between adjacent faces with a chosen dissimilarity.
    ///
    /// Symmetric with an empty diagonal.
    pub fn face_affinity_with(
        &self,
        sigma: f64,
        dissimilarity: &dyn FaceDissimilarity,
    ) -> MeshResult<CsrMatrix<f64>> {
        check_sigma("sigma", sigma)?;

        let topology = self.topology();
        let n = topology.num_faces();
        let _timer = OperationTimer::with_context("face_affinity", n, topology.num_vertices());

        let features = self.features();
        let mut coo = CooMatrix::new(n, n);
        for i in 0..n {
            for j in topology.adjacent_faces(i) {
                let j = j as usize;
                let d = dissimilarity.dissimilarity(&features, i.min(j), i.max(j));
                coo.push(i, j, gaussian(d, sigma));
            }
        }

        let csr = CsrMatrix::from(&coo);
        log_operator_stats("face_affinity", n, n, csr.nnz());
        Ok(csr)
    }

    /// F×3 table of the neighbor across each local edge slot.
    ///
    /// Missing neighbors hold [`NO_NEIGHBOR`].
    pub fn face_adjacency_index(&self) -> DMatrix<i64> {
        let slots = self.topology().face_neighbor_slots();
        DMatrix::from_fn(slots.len(), 3, |f, k| {
            slots[f][k].map_or(NO_NEIGHBOR, i64::from)
        })
    }
}

/// Structural summary of a sparse operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatorSummary {
    pub rows: usize,
    pub cols: usize,
    pub nnz: usize,
    /// Every stored entry equals its transpose within `1e-12`.
    pub symmetric: bool,
    /// Largest absolute row sum.
    pub max_abs_row_sum: f64,
    /// Largest absolute diagonal entry.
    pub max_abs_diagonal: f64,
}

impl OperatorSummary {
    pub fn of(matrix: &CsrMatrix<f64>) -> Self {
        let symmetric = matrix.nrows() == matrix.ncols()
            && matrix.triplet_iter().all(|(i, j, &v)| {
                let t = matrix
                    .get_entry(j, i)
                    .map_or(0.0, |entry| entry.into_value());
                (v - t).abs() <= 1e-12
            });

        let mut max_abs_row_sum: f64 = 0.0;
        let mut max_abs_diagonal: f64 = 0.0;
        for (i, row) in matrix.row_iter().enumerate() {
            let sum: f64 = row.values().iter().sum();
            max_abs_row_sum = max_abs_row_sum.max(sum.abs());
            for (&j, &v) in row.col_indices().iter().zip(row.values()) {
                if j == i {
                    max_abs_diagonal = max_abs_diagonal.max(v.abs());
                }
            }
        }

        Self {
            rows: matrix.nrows(),
            cols: matrix.ncols(),
            nnz: matrix.nnz(),
            symmetric,
            max_abs_row_sum,
            max_abs_diagonal,
        }
    }
}
