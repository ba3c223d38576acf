//! Isolated-face detection and opt-in repair.
//!
//! A face is isolated when it shares no edge with any other face. On
//! scanned or converted meshes this usually means its vertices are
//! near-duplicates of vertices used by the surrounding surface that were
//! never welded.
//!
//! Detection and repair are separate steps:
//!
//! 1. [`detect_isolated_faces`] finds isolated faces and, for each of their
//!    vertices, the nearest *other* vertex closer than
//!    [`IsolatedFaceParams::weld_threshold`]. Faces with matches are
//!    reported as repair candidates. Nothing is modified.
//! 2. [`rebuild_isolated_faces`] remaps candidate faces onto their matches,
//!    drops faces that collapse, and removes vertices left unreferenced.
//!    It only runs when asked to.
//!
//! The default brute-force search costs O(isolated × V). For inputs with many
//! isolated faces use [`NeighborSearch::KdTree`].

use nalgebra::Point3;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{MeshError, MeshResult};
use crate::geometry::GeometryView;
use crate::progress::{ProgressCallback, ProgressTracker, estimate_search_time};
use crate::topology::MeshTopology;
use crate::tracing_ext::{OperationTimer, log_isolated_faces};
use crate::types::Mesh;

/// Default distance below which two vertices count as duplicates.
pub const DEFAULT_WELD_THRESHOLD: f64 = 1e-7;

/// Estimated search time above which a warning is logged.
const SLOW_SEARCH_SECONDS: f64 = 1.0;

/// Nearest-vertex search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "snake_case"))]
pub enum NeighborSearch {
    /// Scan every vertex for every query, in parallel.
    #[default]
    BruteForce,
    /// Radius query against a k-d tree over all vertices.
    KdTree,
}

/// When an isolated face becomes a repair candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "snake_case"))]
pub enum CandidateRule {
    /// At least one vertex has a near-duplicate.
    #[default]
    AnyVertex,
    /// All three vertices have near-duplicates.
    AllVertices,
}

/// Parameters for isolated-face detection and repair.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct IsolatedFaceParams {
    /// Matches must be strictly closer than this distance.
    /// Default: 1e-7
    pub weld_threshold: f64,

    /// Default: brute force
    pub search: NeighborSearch,

    /// Default: any vertex
    pub candidate_rule: CandidateRule,

    /// Rebuild candidate faces after detection.
    /// Default: false
    pub rebuild: bool,
}

impl Default for IsolatedFaceParams {
    fn default() -> Self {
        Self {
            weld_threshold: DEFAULT_WELD_THRESHOLD,
            search: NeighborSearch::BruteForce,
            candidate_rule: CandidateRule::AnyVertex,
            rebuild: false,
        }
    }
}

impl IsolatedFaceParams {
    /// Detection-only with the candidate rule older tools used (every
    /// vertex must have a near-duplicate).
    pub fn legacy() -> Self {
        Self {
            candidate_rule: CandidateRule::AllVertices,
            ..Default::default()
        }
    }

    /// k-d tree search, for meshes with many isolated faces.
    pub fn for_large_meshes() -> Self {
        Self {
            search: NeighborSearch::KdTree,
            ..Default::default()
        }
    }

    /// Set the weld threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.weld_threshold = threshold;
        self
    }

    /// Enable or disable the rebuild step.
    pub fn with_rebuild(mut self, rebuild: bool) -> Self {
        self.rebuild = rebuild;
        self
    }

    pub fn validate(&self) -> MeshResult<()> {
        if !self.weld_threshold.is_finite() || self.weld_threshold < 0.0 {
            return Err(MeshError::invalid_parameter(
                "weld_threshold",
                self.weld_threshold,
                "must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

/// An isolated face and the near-duplicates found for its vertices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolatedFace {
    pub face_index: usize,
    pub vertices: [u32; 3],
    /// Nearest other vertex within the threshold, per face vertex.
    pub matches: [Option<u32>; 3],
    /// Whether the face satisfies the candidate rule.
    pub is_candidate: bool,
}

impl IsolatedFace {
    /// Vertex ids after replacing each matched vertex with its match.
    pub fn remapped(&self) -> [u32; 3] {
        [0, 1, 2].map(|k| self.matches[k].unwrap_or(self.vertices[k]))
    }
}

/// Result of [`detect_isolated_faces`].
#[derive(Debug, Clone, PartialEq)]
pub struct IsolatedFaceReport {
    /// Every isolated face, ascending by face id.
    pub isolated: Vec<IsolatedFace>,
    pub search: NeighborSearch,
    pub candidate_rule: CandidateRule,
    pub weld_threshold: f64,
}

impl IsolatedFaceReport {
    /// Number of isolated faces that are repair candidates.
    pub fn candidate_count(&self) -> usize {
        self.isolated.iter().filter(|f| f.is_candidate).count()
    }

    /// Isolated faces that are repair candidates.
    pub fn candidates(&self) -> impl Iterator<Item = &IsolatedFace> {
        self.isolated.iter().filter(|f| f.is_candidate)
    }

    /// No isolated faces at all.
    pub fn is_clean(&self) -> bool {
        self.isolated.is_empty()
    }
}

/// Nearest vertex other than `v` that lies strictly within `threshold`.
///
/// Ties go to the lowest vertex id.
pub fn nearest_other_vertex(positions: &[Point3<f64>], v: u32, threshold: f64) -> Option<u32> {
    let p = positions.get(v as usize)?;
    let threshold_sq = threshold * threshold;

    positions
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != v as usize)
        .map(|(i, q)| ((q - p).norm_squared(), i))
        .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
        .filter(|&(d_sq, _)| d_sq < threshold_sq)
        .map(|(_, i)| i as u32)
}

fn build_kdtree(positions: &[Point3<f64>]) -> kiddo::KdTree<f64, 3> {
    let mut kdtree = kiddo::KdTree::new();
    for (i, p) in positions.iter().enumerate() {
        kdtree.add(&[p.x, p.y, p.z], i as u64);
    }
    kdtree
}

fn nearest_other_vertex_indexed(
    kdtree: &kiddo::KdTree<f64, 3>,
    positions: &[Point3<f64>],
    v: u32,
    threshold: f64,
) -> Option<u32> {
    let p = positions.get(v as usize)?;
    let threshold_sq = threshold * threshold;

    kdtree
        .within::<kiddo::SquaredEuclidean>(&[p.x, p.y, p.z], threshold_sq)
        .into_iter()
        .filter(|n| n.item != u64::from(v) && n.distance < threshold_sq)
        .map(|n| (n.distance, n.item))
        .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
        .map(|(_, item)| item as u32)
}

/// Find isolated faces and their repair candidates.
///
/// Runs the nearest-vertex queries in parallel. When `progress` returns
/// `false` the scan stops with [`MeshError::Cancelled`]; nothing has been
/// modified at that point.
///
/// # Errors
///
/// - [`MeshError::InvalidParameter`] for a negative or non-finite threshold.
/// - [`MeshError::DimensionMismatch`] if `positions` does not match the topology.
/// - [`MeshError::Cancelled`] if the progress callback asked to stop.
pub fn detect_isolated_faces(
    topology: &MeshTopology,
    positions: &[Point3<f64>],
    params: &IsolatedFaceParams,
    progress: Option<&ProgressCallback>,
) -> MeshResult<IsolatedFaceReport> {
    params.validate()?;
    let view = GeometryView::new(topology, positions)?;
    let _timer = OperationTimer::with_context(
        "isolated_face_search",
        topology.num_faces(),
        topology.num_vertices(),
    );

    let isolated_ids = topology.isolated_faces();
    let mut report = IsolatedFaceReport {
        isolated: Vec::with_capacity(isolated_ids.len()),
        search: params.search,
        candidate_rule: params.candidate_rule,
        weld_threshold: params.weld_threshold,
    };
    if isolated_ids.is_empty() {
        log_isolated_faces(&report);
        return Ok(report);
    }

    let queries: Vec<u32> = isolated_ids
        .iter()
        .filter_map(|&f| topology.face_vertices(f as usize))
        .flatten()
        .collect();

    let estimate =
        estimate_search_time(topology.num_vertices(), isolated_ids.len(), params.search);
    if estimate.seconds > SLOW_SEARCH_SECONDS {
        warn!(
            isolated_faces = isolated_ids.len(),
            vertices = topology.num_vertices(),
            estimated_seconds = format!("{:.1}", estimate.seconds),
            complexity = estimate.complexity,
            "Isolated face search may be slow"
        );
    }

    let kdtree = match params.search {
        NeighborSearch::KdTree => Some(build_kdtree(view.positions())),
        NeighborSearch::BruteForce => None,
    };

    let tracker = ProgressTracker::new(queries.len() as u64);
    if let Some(callback) = progress {
        if !callback(&tracker.snapshot("Searching near-duplicate vertices")) {
            return Err(MeshError::Cancelled {
                operation: "isolated face search",
            });
        }
    }
    let matches: Option<Vec<Option<u32>>> = queries
        .par_iter()
        .map(|&v| {
            let found = match &kdtree {
                Some(tree) => {
                    nearest_other_vertex_indexed(tree, view.positions(), v, params.weld_threshold)
                }
                None => nearest_other_vertex(view.positions(), v, params.weld_threshold),
            };
            tracker.increment();
            tracker
                .maybe_callback(progress, "Searching near-duplicate vertices")
                .then_some(found)
        })
        .collect();
    let matches = matches.ok_or(MeshError::Cancelled {
        operation: "isolated face search",
    })?;

    for (&face_index, found) in isolated_ids.iter().zip(matches.chunks_exact(3)) {
        let face_index = face_index as usize;
        let Some(vertices) = topology.face_vertices(face_index) else {
            continue;
        };
        let matches = [found[0], found[1], found[2]];

        for (v, m) in vertices.iter().zip(&matches) {
            if let Some(m) = m {
                debug!(face = face_index, vertex = v, closest = m, "Closest vertex");
            }
        }

        let is_candidate = match params.candidate_rule {
            CandidateRule::AnyVertex => matches.iter().any(Option::is_some),
            CandidateRule::AllVertices => matches.iter().all(Option::is_some),
        };
        report.isolated.push(IsolatedFace {
            face_index,
            vertices,
            matches,
            is_candidate,
        });
    }

    log_isolated_faces(&report);
    Ok(report)
}

/// What [`rebuild_isolated_faces`] changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RebuildOutcome {
    /// Candidate faces rewritten onto their matched vertices.
    pub faces_rebuilt: usize,
    /// Candidate faces removed because two corners became the same vertex.
    pub faces_dropped: usize,
    /// Candidate faces left in place because every match lies on another
    /// isolated face.
    pub faces_left: usize,
    /// Vertices removed because no face references them any more.
    pub vertices_removed: usize,
}

/// Weld candidate faces onto their near-duplicate vertices.
///
/// `report` must come from [`detect_isolated_faces`] on the topology built
/// from `mesh`. A corner is only moved onto a match that some non-isolated
/// face uses; stray faces matching each other are left alone. Vertices that
/// were already unreferenced before the rebuild are kept, so only what the
/// rebuild orphaned is collected.
///
/// # Errors
///
/// [`MeshError::InvalidTopology`] if the report references faces or
/// vertices `mesh` does not have; `mesh` is unchanged in that case.
pub fn rebuild_isolated_faces(
    mesh: &mut Mesh,
    report: &IsolatedFaceReport,
) -> MeshResult<RebuildOutcome> {
    let _timer = OperationTimer::with_context(
        "isolated_face_rebuild",
        mesh.face_count(),
        mesh.vertex_count(),
    );

    for face in report.candidates() {
        let in_range = mesh.faces.get(face.face_index) == Some(&face.vertices)
            && face
                .remapped()
                .iter()
                .all(|&v| (v as usize) < mesh.vertex_count());
        if !in_range {
            return Err(MeshError::invalid_topology(format!(
                "isolated face report does not match mesh at face {}",
                face.face_index
            )));
        }
    }

    let mut outcome = RebuildOutcome::default();
    let mut referenced_before = vec![false; mesh.vertex_count()];
    for face in &mesh.faces {
        for &v in face {
            referenced_before[v as usize] = true;
        }
    }

    let mut isolated = vec![false; mesh.face_count()];
    for face in &report.isolated {
        if let Some(flag) = isolated.get_mut(face.face_index) {
            *flag = true;
        }
    }
    let mut on_surface = vec![false; mesh.vertex_count()];
    for (face, _) in mesh.faces.iter().zip(&isolated).filter(|(_, iso)| !**iso) {
        for &v in face {
            on_surface[v as usize] = true;
        }
    }

    let mut drop_face = vec![false; mesh.face_count()];
    for face in report.candidates() {
        let target: [u32; 3] = std::array::from_fn(|k| match face.matches[k] {
            Some(m) if on_surface[m as usize] => m,
            _ => face.vertices[k],
        });
        let [a, b, c] = target;
        if target == face.vertices {
            outcome.faces_left += 1;
        } else if a == b || b == c || c == a {
            drop_face[face.face_index] = true;
            outcome.faces_dropped += 1;
        } else {
            mesh.faces[face.face_index] = [a, b, c];
            outcome.faces_rebuilt += 1;
        }
    }

    let mut index = 0;
    mesh.faces.retain(|_| {
        let keep = !drop_face[index];
        index += 1;
        keep
    });

    let mut referenced_after = vec![false; mesh.vertex_count()];
    for face in &mesh.faces {
        for &v in face {
            referenced_after[v as usize] = true;
        }
    }

    let mut remap = vec![u32::MAX; mesh.vertex_count()];
    let mut kept = Vec::with_capacity(mesh.vertex_count());
    for (i, vertex) in mesh.vertices.drain(..).enumerate() {
        if referenced_before[i] && !referenced_after[i] {
            outcome.vertices_removed += 1;
            continue;
        }
        remap[i] = kept.len() as u32;
        kept.push(vertex);
    }
    mesh.vertices = kept;

    for face in &mut mesh.faces {
        for v in face.iter_mut() {
            *v = remap[*v as usize];
        }
    }

    info!(
        faces_rebuilt = outcome.faces_rebuilt,
        faces_dropped = outcome.faces_dropped,
        faces_left = outcome.faces_left,
        vertices_removed = outcome.vertices_removed,
        "Rebuilt isolated faces"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A quad made of two triangles, plus a third triangle whose two
    /// corners are near-duplicates of quad vertices.
    fn quad_with_stray_face() -> Mesh {
        Mesh::from_raw(
            &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
                // near-duplicates of 1 and 2
                [1.0 + 1e-9, 0.0, 0.0],
                [1.0, 1.0 + 1e-9, 0.0],
                [2.0, 0.5, 0.0],
            ],
            &[[0, 1, 2], [0, 2, 3], [4, 6, 5]],
        )
    }

    fn detect(mesh: &Mesh, params: &IsolatedFaceParams) -> IsolatedFaceReport {
        let topology = MeshTopology::build(mesh.vertex_count(), &mesh.faces).unwrap();
        let positions: Vec<_> = mesh.vertices.iter().map(|v| v.position).collect();
        detect_isolated_faces(&topology, &positions, params, None).unwrap()
    }

    #[test]
    fn test_nearest_other_vertex() {
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(5e-8, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
        ];
        assert_eq!(nearest_other_vertex(&positions, 0, 1e-7), Some(1));
        assert_eq!(nearest_other_vertex(&positions, 2, 1e-7), None);
        assert_eq!(nearest_other_vertex(&positions, 9, 1e-7), None);
    }

    #[test]
    fn test_exact_duplicates_tie_to_lowest_id() {
        let positions = vec![Point3::origin(); 4];
        assert_eq!(nearest_other_vertex(&positions, 0, 1e-7), Some(1));
        assert_eq!(nearest_other_vertex(&positions, 2, 1e-7), Some(0));
    }

    #[test]
    fn test_single_triangle_is_isolated_without_candidates() {
        let mesh = Mesh::from_raw(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], &[[0, 1, 2]]);
        let report = detect(&mesh, &IsolatedFaceParams::default());

        assert_eq!(report.isolated.len(), 1);
        assert_eq!(report.isolated[0].matches, [None, None, None]);
        assert_eq!(report.candidate_count(), 0);
    }

    #[test]
    fn test_closed_mesh_is_clean() {
        let mesh = Mesh::from_raw(
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            &[[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]],
        );
        assert!(detect(&mesh, &IsolatedFaceParams::default()).is_clean());
    }

    #[test]
    fn test_candidate_rules() {
        let mesh = quad_with_stray_face();

        let any = detect(&mesh, &IsolatedFaceParams::default());
        assert_eq!(any.isolated.len(), 1);
        let face = &any.isolated[0];
        assert_eq!(face.face_index, 2);
        assert_eq!(face.matches, [Some(1), None, Some(2)]);
        assert!(face.is_candidate);

        let all = detect(&mesh, &IsolatedFaceParams::legacy());
        assert_eq!(all.candidate_count(), 0);
    }

    #[test]
    fn test_kdtree_agrees_with_brute_force() {
        let mesh = quad_with_stray_face();
        let brute = detect(&mesh, &IsolatedFaceParams::default());
        let indexed = detect(&mesh, &IsolatedFaceParams::for_large_meshes());
        assert_eq!(brute.isolated, indexed.isolated);
    }

    #[test]
    fn test_rebuild_welds_face_into_surface() {
        let mut mesh = quad_with_stray_face();
        let report = detect(&mesh, &IsolatedFaceParams::default());
        let outcome = rebuild_isolated_faces(&mut mesh, &report).unwrap();

        assert_eq!(outcome.faces_rebuilt, 1);
        assert_eq!(outcome.faces_dropped, 0);
        assert_eq!(outcome.vertices_removed, 2);
        assert_eq!(mesh.vertex_count(), 5);
        assert_eq!(mesh.faces[2], [1, 4, 2]);

        let topology = MeshTopology::build(mesh.vertex_count(), &mesh.faces).unwrap();
        assert!(topology.isolated_faces().is_empty());
    }

    #[test]
    fn test_rebuild_drops_collapsed_face() {
        // Stray face whose corners collapse onto two quad vertices.
        let mut mesh = Mesh::from_raw(
            &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
                [1.0, 0.0, 1e-9],
                [1.0, 0.0, -1e-9],
                [1.0, 1.0, 1e-9],
            ],
            &[[0, 1, 2], [0, 2, 3], [4, 5, 6]],
        );
        let report = detect(&mesh, &IsolatedFaceParams::default());
        let outcome = rebuild_isolated_faces(&mut mesh, &report).unwrap();

        assert_eq!(outcome.faces_dropped, 1);
        assert_eq!(outcome.faces_rebuilt, 0);
        assert_eq!(mesh.face_count(), 2);
        assert_eq!(mesh.vertex_count(), 4);
    }

    #[test]
    fn test_rebuild_leaves_strays_matching_each_other() {
        // Two copies of a triangle off to the side of the quad, offset by
        // less than the weld threshold.
        let mut mesh = Mesh::from_raw(
            &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 5.0],
                [1.0, 0.0, 5.0],
                [0.0, 1.0, 5.0],
                [1e-9, 0.0, 5.0],
                [1.0 + 1e-9, 0.0, 5.0],
                [1e-9, 1.0, 5.0],
            ],
            &[[0, 1, 2], [0, 2, 3], [4, 5, 6], [7, 8, 9]],
        );
        let before = mesh.faces.clone();
        let report = detect(&mesh, &IsolatedFaceParams::default());
        assert_eq!(report.candidate_count(), 2);

        let outcome = rebuild_isolated_faces(&mut mesh, &report).unwrap();
        assert_eq!(
            outcome,
            RebuildOutcome {
                faces_left: 2,
                ..Default::default()
            }
        );
        assert_eq!(mesh.faces, before);
        assert_eq!(mesh.vertex_count(), 10);
    }

    #[test]
    fn test_rebuild_rejects_foreign_report() {
        let mut mesh = quad_with_stray_face();
        let report = detect(&mesh, &IsolatedFaceParams::default());
        mesh.faces.pop();

        let err = rebuild_isolated_faces(&mut mesh, &report).unwrap_err();
        assert!(matches!(err, MeshError::InvalidTopology { .. }));
        assert_eq!(mesh.face_count(), 2);
    }

    #[test]
    fn test_cancellation() {
        let mesh = quad_with_stray_face();
        let topology = MeshTopology::build(mesh.vertex_count(), &mesh.faces).unwrap();
        let positions: Vec<_> = mesh.vertices.iter().map(|v| v.position).collect();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let callback: ProgressCallback = Box::new(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            false
        });

        let err = detect_isolated_faces(
            &topology,
            &positions,
            &IsolatedFaceParams::default(),
            Some(&callback),
        )
        .unwrap_err();
        assert!(matches!(err, MeshError::Cancelled { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_threshold() {
        let mesh = quad_with_stray_face();
        let topology = MeshTopology::build(mesh.vertex_count(), &mesh.faces).unwrap();
        let positions: Vec<_> = mesh.vertices.iter().map(|v| v.position).collect();

        let params = IsolatedFaceParams::default().with_threshold(f64::NAN);
        let err = detect_isolated_faces(&topology, &positions, &params, None).unwrap_err();
        assert!(matches!(err, MeshError::InvalidParameter { name: "weld_threshold", .. }));
    }
}
