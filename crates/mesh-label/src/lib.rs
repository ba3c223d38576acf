//! Triangle mesh topology, differential operators and per-face labels.
//!
//! This crate holds the in-memory side of a mesh segmentation workflow: it
//! loads a triangle mesh, builds its connectivity, cleans up faces that came
//! in disconnected, derives normals and areas, builds the sparse operators
//! that label smoothing and segmentation run on, and imports or exports one
//! integer label per face.
//!
//! # Features
//!
//! - **Topology**: vertex and face adjacency, boundary and non-manifold edges
//! - **Geometry**: face centroids, normals and areas; area-weighted vertex normals
//! - **Operators**: vertex Laplacian, face Laplacian with a Gaussian affinity
//!   term, face affinity matrix, face areas, face adjacency index table
//! - **Isolated faces**: detection with brute-force or k-d tree search, and an
//!   opt-in rebuild that welds them onto near-duplicate vertices
//! - **Labels**: whitespace-separated `.dat` files, strict or lenient import
//! - **File I/O**: OBJ, PLY and STL through `tobj`, `ply-rs` and `stl_io`
//!
//! # Ids and tables
//!
//! Vertex and face ids are dense and 0-based and stay fixed until the next
//! load. Every exported table and operator is indexed by them: row `i` of
//! [`LabelMesh::points`] is vertex `i`, row `f` of
//! [`LabelMesh::face_normals`] is face `f`, and so on.
//!
//! # Quick Start
//!
//! ```
//! use mesh_label::{FaceLaplacianParams, LabelMesh, LoadParams, Mesh};
//!
//! let soup = Mesh::from_raw(
//!     &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
//!     &[[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]],
//! );
//! let (mesh, report) = LabelMesh::from_mesh(soup, &LoadParams::default()).unwrap();
//! assert!(report.isolated.is_clean());
//!
//! let l_vv = mesh.vertex_laplacian();
//! assert_eq!(l_vv.nrows(), 4);
//!
//! let l_ff = mesh.face_laplacian(&FaceLaplacianParams::default()).unwrap();
//! assert_eq!(l_ff.nrows(), mesh.num_faces());
//! ```
//!
//! # Labeling a Scan
//!
//! ```no_run
//! use std::path::Path;
//! use mesh_label::{LabelImportPolicy, LabelMesh, LoadParams};
//!
//! let (mut mesh, report) = LabelMesh::load("scan.ply", &LoadParams::for_large_meshes()).unwrap();
//! println!(
//!     "{} isolated faces, {} repair candidates",
//!     report.isolated.isolated.len(),
//!     report.isolated.candidate_count()
//! );
//!
//! mesh.import_labels(Some(Path::new("scan.dat")), LabelImportPolicy::Strict)
//!     .unwrap();
//! let areas = mesh.face_areas();
//! let affinity = mesh.face_affinity(0.5).unwrap();
//! # let _ = (areas, affinity);
//! ```
//!
//! # Error Handling
//!
//! Fallible operations return [`MeshResult<T>`], which is
//! `Result<T, MeshError>`. Non-fatal findings such as zero-area faces are not
//! errors; they come back as [`GeometryIssue`]s inside reports.
//!
//! ```
//! use mesh_label::{LabelImportPolicy, LabelMesh, LoadParams, Mesh, MeshError};
//! use std::io::Cursor;
//!
//! let soup = Mesh::from_raw(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], &[[0, 1, 2]]);
//! let (mut mesh, _) = LabelMesh::from_mesh(soup, &LoadParams::default()).unwrap();
//!
//! match mesh.import_labels_from_reader(Cursor::new("1 2"), "mem", LabelImportPolicy::Strict) {
//!     Err(MeshError::LabelCountMismatch { expected, found }) => {
//!         assert_eq!((expected, found), (1, 2));
//!     }
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```
//!
//! # Supported Formats
//!
//! | Format | Extension | Load | Save | Index Preservation | Notes |
//! |--------|-----------|------|------|-------------------|-------|
//! | OBJ    | `.obj`    | ✓    | ✓    | first-use order   | Polygons triangulated, `v x y z r g b` colors |
//! | PLY    | `.ply`    | ✓    | ✓    | ✓                 | ASCII & binary, normals and colors, fan triangulation |
//! | STL    | `.stl`    | ✓    | ✓    | ✗                 | Vertices shared by exact position |

mod error;
pub mod tracing_ext;
mod types;

#[cfg(test)]
mod edge_cases;

pub mod geometry;
pub mod io;
pub mod isolated;
pub mod labels;
pub mod model;
pub mod operators;
pub mod progress;
pub mod topology;

#[cfg(feature = "config")]
pub mod config;

pub use error::{
    ErrorCode, GeometryIssue, IssueSeverity, MeshError, MeshLocation, MeshResult,
    RecoverySuggestion,
};
pub use types::{BoundingBox, DEGENERATE_SINE, Mesh, Triangle, Vertex, VertexColor};

pub use geometry::{FaceNormals, GeometryView, centroid_of};
pub use io::{MeshFormat, load_mesh, save_mesh};
pub use isolated::{
    CandidateRule, DEFAULT_WELD_THRESHOLD, IsolatedFace, IsolatedFaceParams, IsolatedFaceReport,
    NeighborSearch, RebuildOutcome, detect_isolated_faces, rebuild_isolated_faces,
};
pub use labels::{
    DEFAULT_LABEL, Label, LabelImport, LabelImportPolicy, label_histogram, read_label_file,
    write_label_file,
};
pub use model::{LabelMesh, LoadParams, LoadReport, MeshUpdate, NormalUpdate, UpdateObserver};
pub use operators::{
    Dissimilarity, FaceDissimilarity, FaceFeatures, FaceLaplacianParams, OperatorBuilder,
    OperatorSummary,
};
pub use progress::{Progress, ProgressCallback, ProgressTracker};
pub use topology::{MeshTopology, NO_NEIGHBOR, NonManifoldEdge};

#[cfg(feature = "config")]
pub use config::{ConfigError, LabelingConfig};

// Re-export nalgebra and nalgebra-sparse types that appear in the public API
pub use nalgebra::{DMatrix, DVector, Point3, Vector3};
pub use nalgebra_sparse::CsrMatrix;
