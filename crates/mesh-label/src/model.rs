//! The labeled mesh aggregate.
//!
//! [`LabelMesh`] owns the topology, per-vertex and per-face attributes and
//! the face labels of one mesh. It is created whole by a load
//! ([`LabelMesh::from_mesh`], [`LabelMesh::load`]) and afterwards changes
//! only through its bulk setters. Every setter runs the same fixed
//! sequence before returning:
//!
//! 1. apply the new values
//! 2. recompute the normals that depend on them
//! 3. recompute the bounding box
//! 4. notify observers registered with [`LabelMesh::on_update`]
//!
//! Setters validate their input first, so a failed call leaves the mesh
//! exactly as it was.
//!
//! # Bulk tables
//!
//! Tables are [`DMatrix`] values with one row per vertex (or face) in id
//! order and three columns. Colors are exported in `[0, 1]` and stored as
//! bytes.

use std::io::BufRead;
use std::path::Path;

use nalgebra::{DMatrix, DVector, Point3, Vector3};
use nalgebra_sparse::CsrMatrix;
use tracing::{debug, info, warn};

use crate::error::{GeometryIssue, MeshError, MeshResult};
use crate::geometry::GeometryView;
use crate::io;
use crate::isolated::{
    IsolatedFaceParams, IsolatedFaceReport, RebuildOutcome, detect_isolated_faces,
    rebuild_isolated_faces,
};
use crate::labels::{
    DEFAULT_LABEL, Label, LabelImport, LabelImportPolicy, apply_labels, parse_labels,
    read_label_file, write_label_file,
};
use crate::operators::{FaceLaplacianParams, OperatorBuilder};
use crate::progress::ProgressCallback;
use crate::topology::MeshTopology;
use crate::tracing_ext::{OperationTimer, log_label_import, log_mesh_stats, log_soup_stats};
use crate::types::{BoundingBox, Mesh, Vertex, VertexColor};

/// Parameters for building a [`LabelMesh`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct LoadParams {
    /// Recompute vertex normals even when the source provides them.
    /// Source normals are only kept when every vertex has one.
    /// Default: true
    pub compute_vertex_normals: bool,

    /// Isolated-face pass run during the load.
    pub isolated: IsolatedFaceParams,
}

impl Default for LoadParams {
    fn default() -> Self {
        Self {
            compute_vertex_normals: true,
            isolated: IsolatedFaceParams::default(),
        }
    }
}

impl LoadParams {
    /// Load settings matching older tools: detection only, every vertex of
    /// a candidate must have a near-duplicate.
    pub fn legacy() -> Self {
        Self {
            isolated: IsolatedFaceParams::legacy(),
            ..Default::default()
        }
    }

    /// Spatially indexed isolated-face search.
    pub fn for_large_meshes() -> Self {
        Self {
            isolated: IsolatedFaceParams::for_large_meshes(),
            ..Default::default()
        }
    }

    /// Weld isolated faces onto their near-duplicates during the load.
    pub fn with_rebuild(mut self) -> Self {
        self.isolated.rebuild = true;
        self
    }
}

/// What happened while building a [`LabelMesh`].
#[derive(Debug, Clone)]
pub struct LoadReport {
    /// Faces removed because they named the same vertex twice.
    pub dropped_faces: usize,

    /// Isolated faces found before any rebuild.
    pub isolated: IsolatedFaceReport,

    /// Present when the rebuild step ran.
    pub rebuild: Option<RebuildOutcome>,

    /// Non-fatal diagnostics: degenerate normals, non-manifold edges and
    /// isolated faces.
    pub issues: Vec<GeometryIssue>,

    /// Whether the vertex normals came from the source.
    pub source_normals_used: bool,
}

/// Result of a normal recompute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalUpdate {
    /// Faces whose normal was left unnormalized.
    pub degenerate: Vec<GeometryIssue>,
}

/// Which attribute a completed mutation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshUpdate {
    /// The whole mesh was replaced by a load.
    Reloaded,
    /// Positions, and with them normals and bounds.
    Positions,
    VertexNormals,
    VertexColors,
    FaceColors,
    Labels,
}

/// Observer called after a mutation completes.
pub type UpdateObserver = Box<dyn Fn(MeshUpdate) + Send + Sync>;

/// A triangle mesh with per-face labels.
pub struct LabelMesh {
    topology: MeshTopology,
    positions: Vec<Point3<f64>>,
    vertex_normals: Vec<Vector3<f64>>,
    vertex_colors: Vec<VertexColor>,
    face_normals: Vec<Vector3<f64>>,
    face_colors: Vec<VertexColor>,
    labels: Vec<Label>,
    bounds: BoundingBox,
    degenerate: Vec<GeometryIssue>,
    indices: Vec<u32>,
    observers: Vec<UpdateObserver>,
}

impl std::fmt::Debug for LabelMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelMesh")
            .field("vertices", &self.num_vertices())
            .field("faces", &self.num_faces())
            .field("bounds", &self.bounds)
            .field("degenerate", &self.degenerate.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Default for LabelMesh {
    fn default() -> Self {
        Self {
            topology: MeshTopology::default(),
            positions: Vec::new(),
            vertex_normals: Vec::new(),
            vertex_colors: Vec::new(),
            face_normals: Vec::new(),
            face_colors: Vec::new(),
            labels: Vec::new(),
            bounds: BoundingBox::empty(),
            degenerate: Vec::new(),
            indices: Vec::new(),
            observers: Vec::new(),
        }
    }
}

impl LabelMesh {
    /// Build the aggregate from a triangle soup.
    ///
    /// Faces naming a vertex twice are dropped with a warning. Then the
    /// isolated-face pass runs (and, when enabled, the rebuild), followed by
    /// the normal update and the bounding box. An empty soup gives an empty
    /// mesh.
    ///
    /// # Errors
    ///
    /// - [`MeshError::InvalidVertexIndex`] for a face referencing a missing vertex.
    /// - [`MeshError::InvalidCoordinate`] for a NaN or infinite coordinate.
    /// - [`MeshError::InvalidParameter`] for bad isolated-face parameters.
    pub fn from_mesh(mesh: Mesh, params: &LoadParams) -> MeshResult<(Self, LoadReport)> {
        Self::from_mesh_with_progress(mesh, params, None)
    }

    /// [`from_mesh`](Self::from_mesh) with progress reporting for the
    /// isolated-face search.
    ///
    /// # Errors
    ///
    /// As [`from_mesh`](Self::from_mesh), plus [`MeshError::Cancelled`]
    /// when `progress` returns `false`.
    pub fn from_mesh_with_progress(
        mut mesh: Mesh,
        params: &LoadParams,
        progress: Option<&ProgressCallback>,
    ) -> MeshResult<(Self, LoadReport)> {
        let _timer =
            OperationTimer::with_context("label_mesh_build", mesh.face_count(), mesh.vertex_count());
        log_soup_stats(&mesh, "before build");

        let before = mesh.face_count();
        mesh.faces
            .retain(|&[a, b, c]| a != b && b != c && c != a);
        let dropped_faces = before - mesh.face_count();
        if dropped_faces > 0 {
            warn!(dropped_faces, "Dropped faces with repeated vertex ids");
        }

        validate_soup(&mesh)?;

        let positions: Vec<Point3<f64>> = mesh.vertices.iter().map(|v| v.position).collect();
        let mut topology = MeshTopology::build(mesh.vertex_count(), &mesh.faces)?;
        let isolated = detect_isolated_faces(&topology, &positions, &params.isolated, progress)?;

        let rebuild = if params.isolated.rebuild && isolated.candidate_count() > 0 {
            let outcome = rebuild_isolated_faces(&mut mesh, &isolated)?;
            topology = MeshTopology::build(mesh.vertex_count(), &mesh.faces)?;
            Some(outcome)
        } else {
            None
        };

        let source_normals_used =
            !params.compute_vertex_normals && mesh.vertices.iter().all(|v| v.normal.is_some());
        if !mesh.vertices.is_empty() && mesh.vertices.iter().all(|v| v.normal.is_none()) {
            debug!("Source has no vertex normals");
        }

        let face_count = mesh.face_count();
        let mut out = Self {
            topology,
            positions: mesh.vertices.iter().map(|v| v.position).collect(),
            vertex_normals: mesh
                .vertices
                .iter()
                .map(|v| v.normal.unwrap_or_else(Vector3::zeros))
                .collect(),
            vertex_colors: mesh
                .vertices
                .iter()
                .map(|v| v.color.unwrap_or_default())
                .collect(),
            face_normals: Vec::new(),
            face_colors: vec![VertexColor::MID_GRAY; face_count],
            labels: vec![DEFAULT_LABEL; face_count],
            bounds: BoundingBox::empty(),
            degenerate: Vec::new(),
            indices: Vec::new(),
            observers: Vec::new(),
        };

        if source_normals_used {
            out.update_face_normals();
        } else {
            out.update_normals();
        }
        out.update_bounds();
        out.compute_indices();

        let mut issues = out.degenerate.clone();
        issues.extend(out.topology.issues());

        info!(
            vertices = out.num_vertices(),
            faces = out.num_faces(),
            dropped_faces,
            isolated_faces = isolated.isolated.len(),
            rebuilt = rebuild.is_some(),
            "Built labeled mesh"
        );
        log_mesh_stats(&out, "after build");

        let report = LoadReport {
            dropped_faces,
            isolated,
            rebuild,
            issues,
            source_normals_used,
        };
        Ok((out, report))
    }

    /// Read a mesh file and build the aggregate.
    ///
    /// # Errors
    ///
    /// I/O errors from [`io::load_mesh`] and everything
    /// [`from_mesh`](Self::from_mesh) reports.
    pub fn load(path: impl AsRef<Path>, params: &LoadParams) -> MeshResult<(Self, LoadReport)> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading labeled mesh");
        let mesh = io::load_mesh(path)?;
        Self::from_mesh(mesh, params)
    }

    /// Replace this mesh with the contents of `path`, keeping observers.
    ///
    /// On error the current mesh is unchanged.
    pub fn reload(&mut self, path: impl AsRef<Path>, params: &LoadParams) -> MeshResult<LoadReport> {
        let (fresh, report) = Self::load(path, params)?;
        self.replace_with(fresh);
        Ok(report)
    }

    /// Replace this mesh with one built from `mesh`, keeping observers.
    pub fn replace(&mut self, mesh: Mesh, params: &LoadParams) -> MeshResult<LoadReport> {
        let (fresh, report) = Self::from_mesh(mesh, params)?;
        self.replace_with(fresh);
        Ok(report)
    }

    fn replace_with(&mut self, fresh: Self) {
        let observers = std::mem::take(&mut self.observers);
        *self = fresh;
        self.observers = observers;
        self.notify(MeshUpdate::Reloaded);
    }

    /// Export as a triangle soup with normals and vertex colors.
    pub fn to_mesh(&self) -> Mesh {
        let vertices = self
            .positions
            .iter()
            .zip(&self.vertex_normals)
            .zip(&self.vertex_colors)
            .map(|((&position, &normal), &color)| Vertex {
                position,
                normal: Some(normal),
                color: Some(color),
            })
            .collect();
        Mesh {
            vertices,
            faces: self.topology.faces().to_vec(),
        }
    }

    /// Write the mesh; the format follows the extension.
    pub fn save(&self, path: impl AsRef<Path>) -> MeshResult<()> {
        io::save_mesh(&self.to_mesh(), path.as_ref())
    }

    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn num_faces(&self) -> usize {
        self.topology.num_faces()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() && self.num_faces() == 0
    }

    #[inline]
    pub fn topology(&self) -> &MeshTopology {
        &self.topology
    }

    /// Bounding box of the current positions.
    #[inline]
    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    #[inline]
    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    /// Degenerate faces found by the last normal update.
    #[inline]
    pub fn degenerate_faces(&self) -> &[GeometryIssue] {
        &self.degenerate
    }

    /// Flat vertex-id list, three per face in face order.
    #[inline]
    pub fn triangle_indices(&self) -> &[u32] {
        &self.indices
    }

    /// Geometric view over the current positions.
    pub fn geometry(&self) -> GeometryView<'_> {
        GeometryView::from_consistent(&self.topology, &self.positions)
    }

    /// Operator builder over the current positions.
    pub fn operators(&self) -> OperatorBuilder<'_> {
        OperatorBuilder::new(self.geometry())
    }

    pub fn vertex_laplacian(&self) -> CsrMatrix<f64> {
        self.operators().vertex_laplacian()
    }

    pub fn face_laplacian(&self, params: &FaceLaplacianParams) -> MeshResult<CsrMatrix<f64>> {
        self.operators().face_laplacian(params)
    }

    pub fn face_areas(&self) -> DVector<f64> {
        self.operators().face_areas()
    }

    pub fn face_affinity(&self, sigma: f64) -> MeshResult<CsrMatrix<f64>> {
        self.operators().face_affinity(sigma)
    }

    pub fn face_adjacency_index(&self) -> DMatrix<i64> {
        self.operators().face_adjacency_index()
    }

    /// Vertex positions, N×3.
    pub fn points(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.positions.len(), 3, |i, j| self.positions[i][j])
    }

    /// Replace every vertex position.
    ///
    /// Normals and bounds are recomputed before observers see
    /// [`MeshUpdate::Positions`].
    ///
    /// # Errors
    ///
    /// - [`MeshError::DimensionMismatch`] unless `points` is N×3.
    /// - [`MeshError::InvalidCoordinate`] for a non-finite value.
    pub fn set_points(&mut self, points: &DMatrix<f64>) -> MeshResult<NormalUpdate> {
        self.check_table("points", self.positions.len(), points)?;
        for i in 0..points.nrows() {
            for (j, axis) in ["x", "y", "z"].into_iter().enumerate() {
                let value = points[(i, j)];
                if !value.is_finite() {
                    return Err(MeshError::invalid_coordinate(i, axis, value));
                }
            }
        }

        for (i, p) in self.positions.iter_mut().enumerate() {
            *p = Point3::new(points[(i, 0)], points[(i, 1)], points[(i, 2)]);
        }
        let update = self.update_normals();
        self.update_bounds();
        self.notify(MeshUpdate::Positions);
        Ok(update)
    }

    /// Positions of each face's corners, 3F×3; row `3f + k` is corner `k`
    /// of face `f`.
    pub fn face_points(&self) -> DMatrix<f64> {
        let faces = self.topology.faces();
        DMatrix::from_fn(3 * faces.len(), 3, |row, j| {
            let v = faces[row / 3][row % 3];
            self.positions[v as usize][j]
        })
    }

    /// Vertex normals, N×3.
    pub fn vertex_normals(&self) -> DMatrix<f64> {
        vector_table(&self.vertex_normals)
    }

    /// Overwrite vertex normals as given, without normalizing.
    pub fn set_vertex_normals(&mut self, normals: &DMatrix<f64>) -> MeshResult<()> {
        self.check_table("vertex_normals", self.positions.len(), normals)?;
        for (i, n) in self.vertex_normals.iter_mut().enumerate() {
            *n = Vector3::new(normals[(i, 0)], normals[(i, 1)], normals[(i, 2)]);
        }
        self.notify(MeshUpdate::VertexNormals);
        Ok(())
    }

    /// Vertex colors in `[0, 1]`, N×3.
    pub fn vertex_colors(&self) -> DMatrix<f64> {
        color_table(&self.vertex_colors)
    }

    /// Set vertex colors from `[0, 1]` values; stored as `round(255·c)`
    /// clamped to a byte.
    pub fn set_vertex_colors(&mut self, colors: &DMatrix<f64>) -> MeshResult<()> {
        self.check_table("vertex_colors", self.positions.len(), colors)?;
        assign_colors(&mut self.vertex_colors, colors);
        self.notify(MeshUpdate::VertexColors);
        Ok(())
    }

    /// Face colors in `[0, 1]`, F×3.
    pub fn face_colors(&self) -> DMatrix<f64> {
        color_table(&self.face_colors)
    }

    pub fn set_face_colors(&mut self, colors: &DMatrix<f64>) -> MeshResult<()> {
        self.check_table("face_colors", self.num_faces(), colors)?;
        assign_colors(&mut self.face_colors, colors);
        self.notify(MeshUpdate::FaceColors);
        Ok(())
    }

    /// Unit face normals, F×3. Degenerate faces keep their raw cross product.
    pub fn face_normals(&self) -> DMatrix<f64> {
        vector_table(&self.face_normals)
    }

    /// Face centroids, F×3.
    pub fn face_centers(&self) -> DMatrix<f64> {
        let centers = self.geometry().face_centroids();
        DMatrix::from_fn(centers.len(), 3, |i, j| centers[i][j])
    }

    /// One label per face, in face order.
    #[inline]
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    #[inline]
    pub fn label(&self, face: usize) -> Option<Label> {
        self.labels.get(face).copied()
    }

    /// Replace all labels.
    ///
    /// # Errors
    ///
    /// [`MeshError::LabelCountMismatch`] unless there is one label per face.
    pub fn set_labels(&mut self, labels: &[Label]) -> MeshResult<()> {
        if labels.len() != self.labels.len() {
            return Err(MeshError::LabelCountMismatch {
                expected: self.labels.len(),
                found: labels.len(),
            });
        }
        self.labels.copy_from_slice(labels);
        self.notify(MeshUpdate::Labels);
        Ok(())
    }

    /// Import labels from a `.dat` file.
    ///
    /// `None` is a no-op. An unreadable file or a bad token fails without
    /// touching the current labels, as does a count mismatch under
    /// [`LabelImportPolicy::Strict`].
    pub fn import_labels(
        &mut self,
        path: Option<&Path>,
        policy: LabelImportPolicy,
    ) -> MeshResult<LabelImport> {
        let Some(path) = path else {
            debug!("No label source given");
            return Ok(LabelImport::Skipped);
        };
        let tokens = read_label_file(path)?;
        self.apply_label_tokens(&tokens, &path.display().to_string(), policy)
    }

    /// Import labels from any reader, e.g. an in-memory buffer.
    pub fn import_labels_from_reader<R: BufRead>(
        &mut self,
        reader: R,
        source_name: &str,
        policy: LabelImportPolicy,
    ) -> MeshResult<LabelImport> {
        let tokens = parse_labels(reader, source_name)?;
        self.apply_label_tokens(&tokens, source_name, policy)
    }

    fn apply_label_tokens(
        &mut self,
        tokens: &[Label],
        source_name: &str,
        policy: LabelImportPolicy,
    ) -> MeshResult<LabelImport> {
        let outcome = apply_labels(&mut self.labels, tokens, policy)?;
        log_label_import(source_name, self.num_faces(), &outcome);
        if outcome != LabelImport::Skipped {
            self.notify(MeshUpdate::Labels);
        }
        Ok(outcome)
    }

    /// Write the labels as a `.dat` file.
    pub fn export_labels(&self, path: impl AsRef<Path>) -> MeshResult<()> {
        write_label_file(path, &self.labels)
    }

    /// Register an observer for completed mutations.
    pub fn on_update<F>(&mut self, observer: F)
    where
        F: Fn(MeshUpdate) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Recompute face and vertex normals from the current positions.
    pub fn update_normals(&mut self) -> NormalUpdate {
        let update = self.update_face_normals();
        self.vertex_normals = self.geometry().vertex_normals();
        update
    }

    fn update_face_normals(&mut self) -> NormalUpdate {
        let normals = self.geometry().face_unit_normals();
        self.face_normals = normals.normals;
        self.degenerate = normals.degenerate;
        NormalUpdate {
            degenerate: self.degenerate.clone(),
        }
    }

    fn update_bounds(&mut self) {
        self.bounds = BoundingBox::from_points(&self.positions);
    }

    fn compute_indices(&mut self) {
        self.indices = self.topology.faces().iter().flatten().copied().collect();
    }

    fn notify(&self, update: MeshUpdate) {
        debug!(?update, observers = self.observers.len(), "Mesh updated");
        for observer in &self.observers {
            observer(update);
        }
    }

    fn check_table(&self, what: &'static str, rows: usize, table: &DMatrix<f64>) -> MeshResult<()> {
        if table.nrows() != rows || table.ncols() != 3 {
            return Err(MeshError::dimension_mismatch(
                what,
                rows,
                table.nrows(),
                table.ncols(),
            ));
        }
        Ok(())
    }
}

fn validate_soup(mesh: &Mesh) -> MeshResult<()> {
    let vertex_count = mesh.vertex_count();
    for (f, face) in mesh.faces.iter().enumerate() {
        for &v in face {
            if v as usize >= vertex_count {
                return Err(MeshError::invalid_vertex_index(f, v, vertex_count));
            }
        }
    }
    for (i, vertex) in mesh.vertices.iter().enumerate() {
        let p = vertex.position;
        for (axis, value) in [("x", p.x), ("y", p.y), ("z", p.z)] {
            if !value.is_finite() {
                return Err(MeshError::invalid_coordinate(i, axis, value));
            }
        }
    }
    Ok(())
}

fn vector_table(vectors: &[Vector3<f64>]) -> DMatrix<f64> {
    DMatrix::from_fn(vectors.len(), 3, |i, j| vectors[i][j])
}

fn color_table(colors: &[VertexColor]) -> DMatrix<f64> {
    DMatrix::from_fn(colors.len(), 3, |i, j| colors[i].to_float()[j])
}

fn assign_colors(colors: &mut [VertexColor], table: &DMatrix<f64>) {
    for (i, c) in colors.iter_mut().enumerate() {
        *c = VertexColor::from_float(table[(i, 0)], table[(i, 1)], table[(i, 2)]);
    }
}
