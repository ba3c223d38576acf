//! Property-based tests for the mesh operators.
//!
//! These tests use proptest to generate random triangle meshes and check
//! the algebraic invariants of the Laplacians and weight matrices.
//!
//! Run with: cargo test -p mesh-label -- proptest

use mesh_label::{
    CsrMatrix, DMatrix, Dissimilarity, FaceLaplacianParams, LabelImportPolicy, LabelMesh,
    LoadParams, Mesh, NO_NEIGHBOR, OperatorSummary, Vertex,
};
use proptest::prelude::*;
use std::io::Cursor;

// =============================================================================
// Strategies for generating random meshes
// =============================================================================

/// Generate a random vertex position in a bounded range.
fn arb_position() -> impl Strategy<Value = [f64; 3]> {
    prop::array::uniform3(-100.0..100.0f64)
}

fn arb_vertex() -> impl Strategy<Value = Vertex> {
    arb_position().prop_map(|[x, y, z]| Vertex::from_coords(x, y, z))
}

/// Generate a mesh with valid face indices. Faces may repeat a vertex id;
/// those are dropped when the labeled mesh is built.
fn arb_mesh(max_vertices: usize, max_faces: usize) -> impl Strategy<Value = Mesh> {
    (3..=max_vertices).prop_flat_map(move |num_vertices| {
        let vertices = prop::collection::vec(arb_vertex(), num_vertices);
        let n = num_vertices as u32;
        let faces = prop::collection::vec(prop::array::uniform3(0..n), 0..=max_faces);
        (vertices, faces).prop_map(|(vertices, faces)| Mesh { vertices, faces })
    })
}

fn arb_dissimilarity() -> impl Strategy<Value = Dissimilarity> {
    prop_oneof![
        Just(Dissimilarity::AreaDifference),
        Just(Dissimilarity::CentroidDistance),
        Just(Dissimilarity::NormalAngle),
    ]
}

fn arb_face_params() -> impl Strategy<Value = FaceLaplacianParams> {
    (0.0..5.0f64, 0.0..5.0f64, 0.01..50.0f64, arb_dissimilarity()).prop_map(
        |(uniform_weight, affinity_weight, affinity_sigma, dissimilarity)| FaceLaplacianParams {
            uniform_weight,
            affinity_weight,
            affinity_sigma,
            dissimilarity,
        },
    )
}

fn build(mesh: Mesh) -> LabelMesh {
    LabelMesh::from_mesh(mesh, &LoadParams::default())
        .expect("generated meshes are valid")
        .0
}

/// `xᵀ L x` evaluated over the stored entries.
fn quadratic_form(l: &CsrMatrix<f64>, x: &[f64]) -> f64 {
    l.triplet_iter().map(|(i, j, &v)| v * x[i] * x[j]).sum()
}

fn largest_diagonal(l: &CsrMatrix<f64>) -> f64 {
    OperatorSummary::of(l).max_abs_diagonal.max(1.0)
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Vertex Laplacian is symmetric with exact zero row sums.
    #[test]
    fn proptest_vertex_laplacian_symmetric_zero_rows(mesh in arb_mesh(30, 40)) {
        let mesh = build(mesh);
        let l = mesh.vertex_laplacian();
        let summary = OperatorSummary::of(&l);

        prop_assert_eq!(summary.rows, mesh.num_vertices());
        prop_assert!(summary.symmetric);
        prop_assert_eq!(summary.max_abs_row_sum, 0.0);

        for (i, row) in l.row_iter().enumerate() {
            let degree = mesh.topology().vertex_neighbors(i).len() as f64;
            let diagonal = row
                .col_indices()
                .iter()
                .zip(row.values())
                .find(|(j, _)| **j == i)
                .map_or(0.0, |(_, v)| *v);
            prop_assert_eq!(diagonal, degree);
        }
    }

    /// Vertex Laplacian is positive semi-definite.
    #[test]
    fn proptest_vertex_laplacian_psd(
        mesh in arb_mesh(20, 30),
        x in prop::collection::vec(-10.0..10.0f64, 20),
    ) {
        let mesh = build(mesh);
        let l = mesh.vertex_laplacian();
        let x = &x[..mesh.num_vertices()];
        prop_assert!(quadratic_form(&l, x) >= -1e-9);
    }

    /// Face Laplacian is symmetric, rows sum to zero and it is PSD for
    /// non-negative weights.
    #[test]
    fn proptest_face_laplacian_invariants(
        mesh in arb_mesh(30, 40),
        params in arb_face_params(),
        x in prop::collection::vec(-10.0..10.0f64, 40),
    ) {
        let mesh = build(mesh);
        let l = mesh.face_laplacian(&params).unwrap();
        let summary = OperatorSummary::of(&l);
        let scale = largest_diagonal(&l);

        prop_assert_eq!(summary.rows, mesh.num_faces());
        prop_assert!(summary.symmetric);
        prop_assert!(summary.max_abs_row_sum <= 1e-12 * scale);
        prop_assert!(l.values().iter().all(|v| v.is_finite()));

        let x = &x[..mesh.num_faces()];
        prop_assert!(quadratic_form(&l, x) >= -1e-9 * scale);
    }

    /// The face affinity matrix is symmetric with zero diagonal and
    /// entries in (0, 1].
    #[test]
    fn proptest_face_affinity(mesh in arb_mesh(30, 40), sigma in 0.01..50.0f64) {
        let mesh = build(mesh);
        let w = mesh.face_affinity(sigma).unwrap();

        prop_assert!(OperatorSummary::of(&w).symmetric);
        for (i, j, &v) in w.triplet_iter() {
            prop_assert_ne!(i, j);
            prop_assert!(v >= 0.0 && v <= 1.0);
        }
    }

    /// Non-positive σ is always rejected.
    #[test]
    fn proptest_affinity_rejects_bad_sigma(mesh in arb_mesh(10, 10), sigma in -10.0..=0.0f64) {
        let mesh = build(mesh);
        prop_assert!(mesh.face_affinity(sigma).is_err());
        prop_assert!(mesh.face_laplacian(&FaceLaplacianParams::affinity(sigma)).is_err());
    }

    /// Area vector sums to the total surface area.
    #[test]
    fn proptest_area_vector_matches_total(mesh in arb_mesh(30, 40)) {
        let mesh = build(mesh);
        let areas = mesh.face_areas();
        let total = mesh.geometry().total_surface_area();

        prop_assert_eq!(areas.len(), mesh.num_faces());
        prop_assert!(areas.iter().all(|&a| a >= 0.0));
        prop_assert!((areas.sum() - total).abs() <= 1e-9 * total.max(1.0));
    }

    /// Adjacency slots are mutual: if g is a neighbor of f, f is a neighbor of g.
    #[test]
    fn proptest_adjacency_index_is_mutual(mesh in arb_mesh(20, 40)) {
        let mesh = build(mesh);
        let adj = mesh.face_adjacency_index();

        for f in 0..adj.nrows() {
            for k in 0..3 {
                let g = adj[(f, k)];
                if g == NO_NEIGHBOR {
                    continue;
                }
                let g = g as usize;
                prop_assert!((0..3).any(|m| adj[(g, m)] == f as i64));
            }
        }
    }

    /// Positions read back exactly after set_points, and the bounding box
    /// follows them.
    #[test]
    fn proptest_set_points_round_trip(
        mesh in arb_mesh(20, 30),
        coords in prop::collection::vec(arb_position(), 20),
    ) {
        let mut mesh = build(mesh);
        let n = mesh.num_vertices();
        let points = DMatrix::from_fn(n, 3, |i, j| coords[i][j]);

        mesh.set_points(&points).unwrap();
        prop_assert_eq!(mesh.points(), points.clone());

        let bounds = mesh.bounds();
        for i in 0..n {
            for j in 0..3 {
                prop_assert!(bounds.min[j] <= points[(i, j)]);
                prop_assert!(bounds.max[j] >= points[(i, j)]);
            }
        }
    }

    /// Strict import accepts exactly one token per face and nothing else.
    #[test]
    fn proptest_strict_label_import(mesh in arb_mesh(20, 30), label in -100i32..100) {
        let mut mesh = build(mesh);
        let faces = mesh.num_faces();
        let exact = vec![label.to_string(); faces].join(" ");
        let long = vec![label.to_string(); faces + 1].join(" ");

        mesh.import_labels_from_reader(Cursor::new(exact), "exact", LabelImportPolicy::Strict)
            .unwrap();
        prop_assert!(mesh.labels().iter().all(|&l| l == label));

        let before = mesh.labels().to_vec();
        prop_assert!(
            mesh.import_labels_from_reader(Cursor::new(long), "long", LabelImportPolicy::Strict)
                .is_err()
        );
        prop_assert_eq!(mesh.labels(), before.as_slice());
    }
}
