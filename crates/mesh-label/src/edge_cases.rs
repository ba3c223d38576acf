//! Edge case tests for degenerate and unusual inputs.
//!
//! These check that empty meshes, zero-area faces, unreferenced vertices
//! and non-manifold connectivity are handled without panicking and with
//! well-defined results.

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, Point3};

    use crate::error::{GeometryIssue, MeshError};
    use crate::geometry::GeometryView;
    use crate::isolated::{IsolatedFaceParams, detect_isolated_faces, nearest_other_vertex};
    use crate::labels::{LabelImport, LabelImportPolicy};
    use crate::model::{LabelMesh, LoadParams};
    use crate::operators::{FaceLaplacianParams, OperatorBuilder, OperatorSummary};
    use crate::topology::{MeshTopology, NO_NEIGHBOR};
    use crate::types::{Mesh, Vertex};

    fn build(mesh: Mesh) -> LabelMesh {
        LabelMesh::from_mesh(mesh, &LoadParams::default()).unwrap().0
    }

    // ==================== Empty Mesh Tests ====================

    #[test]
    fn test_empty_mesh_operators() {
        let mesh = build(Mesh::new());

        assert_eq!(mesh.vertex_laplacian().nrows(), 0);
        assert_eq!(mesh.vertex_laplacian().nnz(), 0);
        let l_ff = mesh.face_laplacian(&FaceLaplacianParams::default()).unwrap();
        assert_eq!((l_ff.nrows(), l_ff.ncols()), (0, 0));
        assert_eq!(mesh.face_areas().len(), 0);
        assert_eq!(mesh.face_affinity(1.0).unwrap().nnz(), 0);
        assert_eq!(mesh.face_adjacency_index().shape(), (0, 3));
    }

    #[test]
    fn test_empty_mesh_sigma_still_validated() {
        let mesh = build(Mesh::new());
        assert!(matches!(
            mesh.face_affinity(-1.0),
            Err(MeshError::InvalidParameter { name: "sigma", .. })
        ));
    }

    #[test]
    fn test_empty_mesh_tables() {
        let mut mesh = build(Mesh::new());
        assert_eq!(mesh.points().shape(), (0, 3));
        assert_eq!(mesh.face_points().shape(), (0, 3));
        assert_eq!(mesh.face_centers().shape(), (0, 3));
        mesh.set_points(&DMatrix::zeros(0, 3)).unwrap();
        assert!(mesh.bounds().is_empty());
    }

    #[test]
    fn test_empty_mesh_labels() {
        let mut mesh = build(Mesh::new());
        let outcome = mesh
            .import_labels_from_reader(Cursor::new(""), "empty", LabelImportPolicy::Strict)
            .unwrap();
        assert_eq!(outcome, LabelImport::Skipped);

        let err = mesh
            .import_labels_from_reader(Cursor::new("1"), "one", LabelImportPolicy::Strict)
            .unwrap_err();
        assert!(matches!(
            err,
            MeshError::LabelCountMismatch {
                expected: 0,
                found: 1
            }
        ));
    }

    #[test]
    fn test_whitespace_only_label_source_is_noop() {
        let mut mesh = build(Mesh::from_raw(
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[[0, 1, 2]],
        ));
        mesh.set_labels(&[4]).unwrap();
        let outcome = mesh
            .import_labels_from_reader(Cursor::new(" \n\t \n"), "blank", LabelImportPolicy::Strict)
            .unwrap();
        assert_eq!(outcome, LabelImport::Skipped);
        assert_eq!(mesh.labels(), &[4]);
    }

    // ==================== Vertices Without Faces ====================

    #[test]
    fn test_point_cloud_without_faces() {
        let mut soup = Mesh::new();
        soup.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        soup.vertices.push(Vertex::from_coords(2.0, 1.0, 3.0));
        let mesh = build(soup);

        assert_eq!(mesh.num_vertices(), 2);
        assert_eq!(mesh.num_faces(), 0);
        assert_eq!(mesh.bounds().max, Point3::new(2.0, 1.0, 3.0));

        let l = mesh.vertex_laplacian();
        assert_eq!((l.nrows(), l.ncols()), (2, 2));
        assert_eq!(l.nnz(), 0);
        assert_eq!(mesh.vertex_normals(), DMatrix::zeros(2, 3));
    }

    // ==================== Degenerate Faces ====================

    #[test]
    fn test_collinear_face() {
        let soup = Mesh::from_raw(
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]],
            &[[0, 1, 2]],
        );
        let (mesh, report) = LabelMesh::from_mesh(soup, &LoadParams::default()).unwrap();

        assert_eq!(mesh.face_areas()[0], 0.0);
        assert!(
            report
                .issues
                .contains(&GeometryIssue::DegenerateNormal { face_index: 0 })
        );
        assert_eq!(mesh.degenerate_faces().len(), 1);
        assert_eq!(mesh.face_normals(), DMatrix::zeros(1, 3));
    }

    #[test]
    fn test_degenerate_neighbor_keeps_laplacian_finite() {
        // A proper triangle glued to a zero-area sliver along edge 1-2.
        let soup = Mesh::from_raw(
            &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.5, 0.5, 0.0],
            ],
            &[[0, 1, 2], [2, 1, 3]],
        );
        let mesh = build(soup);

        for dissimilarity in ["area", "centroid", "normal"] {
            let params = FaceLaplacianParams {
                dissimilarity: dissimilarity.parse().unwrap(),
                ..Default::default()
            };
            let l = mesh.face_laplacian(&params).unwrap();
            assert!(l.values().iter().all(|v| v.is_finite()));
            let summary = OperatorSummary::of(&l);
            assert!(summary.symmetric);
            assert!(summary.max_abs_row_sum < 1e-12);
        }
    }

    #[test]
    fn test_tiny_sigma_does_not_produce_nan() {
        let soup = Mesh::from_raw(
            &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [1.0, 1.0, 0.0],
            ],
            &[[0, 1, 2], [2, 1, 3]],
        );
        let mesh = build(soup);

        // Both faces have area 0.5, so the area difference is exactly zero.
        let w = mesh.face_affinity(1e-200).unwrap();
        assert!(w.values().iter().all(|v| v.is_finite()));
        assert_relative_eq!(w.get_entry(0, 1).unwrap().into_value(), 1.0);
    }

    // ==================== Unreferenced Vertices ====================

    #[test]
    fn test_unreferenced_vertex_row_is_zero() {
        let mut soup = Mesh::from_raw(
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[[0, 1, 2]],
        );
        soup.vertices.push(Vertex::from_coords(5.0, 5.0, 5.0));
        let mesh = build(soup);

        let l = mesh.vertex_laplacian();
        assert_eq!(l.row(3).nnz(), 0);
        assert_eq!(mesh.topology().unreferenced_vertex_count(), 1);
        // still part of the bounding box
        assert_eq!(mesh.bounds().max, Point3::new(5.0, 5.0, 5.0));
    }

    // ==================== Non-manifold Connectivity ====================

    #[test]
    fn test_non_manifold_fan() {
        // Three faces on edge 0-1.
        let soup = Mesh::from_raw(
            &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.5, 1.0, 0.0],
                [0.5, -1.0, 0.0],
                [0.5, 0.0, 1.0],
            ],
            &[[0, 1, 2], [1, 0, 3], [0, 1, 4]],
        );
        let (mesh, report) = LabelMesh::from_mesh(soup, &LoadParams::default()).unwrap();

        assert_eq!(mesh.topology().non_manifold_edge_count(), 1);
        assert!(!mesh.topology().is_manifold());
        assert!(report.issues.iter().any(|i| matches!(
            i,
            GeometryIssue::NonManifoldEdge { face_count: 3, .. }
        )));

        // No face gains a neighbor through the shared edge, but the fan is
        // not treated as a set of stray faces either.
        let adj = mesh.face_adjacency_index();
        assert!(adj.iter().all(|&v| v == NO_NEIGHBOR));
        assert!(report.isolated.is_clean());
        assert_eq!(mesh.face_affinity(1.0).unwrap().nnz(), 0);

        let summary = OperatorSummary::of(&mesh.vertex_laplacian());
        assert!(summary.symmetric);
        assert_eq!(summary.max_abs_row_sum, 0.0);
    }

    #[test]
    fn test_duplicated_triangle_is_not_a_neighbor() {
        let soup = Mesh::from_raw(
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[[0, 1, 2], [0, 1, 2]],
        );
        let (mesh, report) = LabelMesh::from_mesh(soup, &LoadParams::default()).unwrap();

        assert_eq!(mesh.topology().face_neighbors(0), Some([None, None, None]));
        assert_eq!(report.isolated.isolated.len(), 2);

        let l = mesh
            .face_laplacian(&FaceLaplacianParams::uniform())
            .unwrap();
        assert_eq!(l.nnz(), 0);
        assert_eq!(mesh.face_affinity(1.0).unwrap().nnz(), 0);
        assert!(mesh.face_adjacency_index().iter().all(|&v| v == NO_NEIGHBOR));
    }

    // ==================== Near-duplicate Search ====================

    #[test]
    fn test_coincident_vertices_tie_to_lowest_id() {
        let positions = vec![Point3::new(1.0, 1.0, 1.0); 4];
        assert_eq!(nearest_other_vertex(&positions, 0, 1e-7), Some(1));
        assert_eq!(nearest_other_vertex(&positions, 2, 1e-7), Some(0));
    }

    #[test]
    fn test_zero_threshold_never_matches() {
        let positions = vec![Point3::new(1.0, 1.0, 1.0); 2];
        // strict comparison: distance 0 is not < 0
        assert_eq!(nearest_other_vertex(&positions, 0, 0.0), None);
    }

    #[test]
    fn test_out_of_range_query() {
        let positions = vec![Point3::origin()];
        assert_eq!(nearest_other_vertex(&positions, 7, 1.0), None);
    }

    #[test]
    fn test_detect_on_mismatched_positions() {
        let topology = MeshTopology::build(3, &[[0, 1, 2]]).unwrap();
        let positions = vec![Point3::origin(); 2];
        let err =
            detect_isolated_faces(&topology, &positions, &IsolatedFaceParams::default(), None)
                .unwrap_err();
        assert!(matches!(err, MeshError::DimensionMismatch { .. }));
    }

    // ==================== Builder Construction ====================

    #[test]
    fn test_builder_from_mismatched_parts() {
        let topology = MeshTopology::build(3, &[[0, 1, 2]]).unwrap();
        let positions = vec![Point3::origin(); 4];
        assert!(OperatorBuilder::from_parts(&topology, &positions).is_err());
        assert!(GeometryView::new(&topology, &positions).is_err());
    }

    #[test]
    fn test_topology_rejects_out_of_range_face() {
        assert!(matches!(
            MeshTopology::build(2, &[[0, 1, 2]]),
            Err(MeshError::InvalidVertexIndex { .. })
        ));
    }
}
