//! Vertex and face connectivity.
//!
//! [`MeshTopology`] is built once from a triangle soup and then only read.
//! Every relation is stored as flat index lists addressed by dense ids, so
//! the cyclic neighbor graphs carry no ownership.
//!
//! Face `f` with vertices `[a, b, c]` has three local edges in fixed slot
//! order: slot 0 is `(a, b)`, slot 1 is `(b, c)`, slot 2 is `(c, a)`.
//! [`MeshTopology::face_neighbors`] reports the face across each slot.

use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::error::{GeometryIssue, MeshError, MeshResult};
use crate::tracing_ext::OperationTimer;

/// Sentinel used in exported adjacency tables for "no neighbor".
pub const NO_NEIGHBOR: i64 = -1;

/// An undirected edge with its vertex ids in ascending order.
pub type EdgeKey = (u32, u32);

#[inline]
fn same_vertex_set(a: &[u32; 3], b: &[u32; 3]) -> bool {
    let (mut a, mut b) = (*a, *b);
    a.sort_unstable();
    b.sort_unstable();
    a == b
}

#[inline]
fn edge_key(a: u32, b: u32) -> EdgeKey {
    if a < b { (a, b) } else { (b, a) }
}

/// An edge shared by more than two faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonManifoldEdge {
    pub edge: EdgeKey,
    pub face_count: usize,
}

/// Connectivity of a triangle mesh.
#[derive(Debug, Clone, Default)]
pub struct MeshTopology {
    faces: Vec<[u32; 3]>,
    vertex_faces: Vec<Vec<u32>>,
    vertex_neighbors: Vec<Vec<u32>>,
    face_neighbors: Vec<[Option<u32>; 3]>,
    /// Faces with at least one edge shared by more than two faces.
    on_non_manifold_edge: Vec<bool>,
    edge_count: usize,
    boundary_edge_count: usize,
    non_manifold_edges: Vec<NonManifoldEdge>,
}

impl MeshTopology {
    /// Build connectivity for `vertex_count` vertices and the given faces.
    ///
    /// # Errors
    ///
    /// - [`MeshError::InvalidVertexIndex`] if a face references a vertex id
    ///   `>= vertex_count`.
    /// - [`MeshError::InvalidTopology`] if a face repeats a vertex id.
    pub fn build(vertex_count: usize, faces: &[[u32; 3]]) -> MeshResult<Self> {
        let _timer = OperationTimer::with_context("topology_build", faces.len(), vertex_count);

        for (face_index, face) in faces.iter().enumerate() {
            for &v in face {
                if v as usize >= vertex_count {
                    return Err(MeshError::invalid_vertex_index(face_index, v, vertex_count));
                }
            }
            let [a, b, c] = *face;
            if a == b || b == c || c == a {
                return Err(MeshError::invalid_topology(format!(
                    "face {} repeats a vertex: [{}, {}, {}]",
                    face_index, a, b, c
                )));
            }
        }

        let mut vertex_faces: Vec<Vec<u32>> = vec![Vec::new(); vertex_count];
        let mut vertex_neighbors: Vec<Vec<u32>> = vec![Vec::new(); vertex_count];
        let mut edge_to_faces: HashMap<EdgeKey, Vec<u32>> = HashMap::with_capacity(faces.len() * 3 / 2);

        for (face_index, &[a, b, c]) in faces.iter().enumerate() {
            let fi = face_index as u32;
            for (v, others) in [(a, [b, c]), (b, [c, a]), (c, [a, b])] {
                vertex_faces[v as usize].push(fi);
                vertex_neighbors[v as usize].extend_from_slice(&others);
            }
            for (p, q) in [(a, b), (b, c), (c, a)] {
                edge_to_faces.entry(edge_key(p, q)).or_default().push(fi);
            }
        }

        for neighbors in &mut vertex_neighbors {
            neighbors.sort_unstable();
            neighbors.dedup();
        }

        let mut boundary_edge_count = 0;
        let mut non_manifold_edges = Vec::new();
        let mut on_non_manifold_edge = vec![false; faces.len()];
        for (&edge, incident) in &edge_to_faces {
            match incident.len() {
                1 => boundary_edge_count += 1,
                2 => {}
                n => {
                    non_manifold_edges.push(NonManifoldEdge { edge, face_count: n });
                    for &f in incident {
                        on_non_manifold_edge[f as usize] = true;
                    }
                }
            }
        }
        non_manifold_edges.sort_unstable_by_key(|e| e.edge);

        let face_neighbors = faces
            .iter()
            .enumerate()
            .map(|(face_index, &[a, b, c])| {
                let fi = face_index as u32;
                [(a, b), (b, c), (c, a)].map(|(p, q)| {
                    match edge_to_faces.get(&edge_key(p, q)).map(Vec::as_slice) {
                        Some(&[f0, f1]) => {
                            let other = if f0 == fi { f1 } else { f0 };
                            // a copy of the same triangle shares three ids, not two
                            (!same_vertex_set(&faces[face_index], &faces[other as usize]))
                                .then_some(other)
                        }
                        _ => None,
                    }
                })
            })
            .collect();

        if !non_manifold_edges.is_empty() {
            warn!(
                non_manifold_edges = non_manifold_edges.len(),
                "Non-manifold edges found; faces get no neighbor across them"
            );
        }
        debug!(
            vertices = vertex_count,
            faces = faces.len(),
            edges = edge_to_faces.len(),
            boundary_edges = boundary_edge_count,
            "Topology built"
        );

        Ok(Self {
            faces: faces.to_vec(),
            vertex_faces,
            vertex_neighbors,
            face_neighbors,
            on_non_manifold_edge,
            edge_count: edge_to_faces.len(),
            boundary_edge_count,
            non_manifold_edges,
        })
    }

    /// Number of vertices, including unreferenced ones.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertex_neighbors.len()
    }

    /// Number of faces.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Number of distinct undirected edges.
    #[inline]
    pub fn num_edges(&self) -> usize {
        self.edge_count
    }

    /// All faces as vertex-id triples, in face-id order.
    #[inline]
    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    /// Vertex ids of face `f`.
    #[inline]
    pub fn face_vertices(&self, f: usize) -> Option<[u32; 3]> {
        self.faces.get(f).copied()
    }

    /// Vertices sharing an edge with vertex `v`, ascending and distinct.
    ///
    /// Empty for unreferenced or out-of-range vertices.
    #[inline]
    pub fn vertex_neighbors(&self, v: usize) -> &[u32] {
        self.vertex_neighbors.get(v).map_or(&[], Vec::as_slice)
    }

    /// Faces incident to vertex `v`, in face-id order.
    #[inline]
    pub fn vertex_faces(&self, v: usize) -> &[u32] {
        self.vertex_faces.get(v).map_or(&[], Vec::as_slice)
    }

    /// Neighbor across each local edge slot of face `f`.
    ///
    /// `None` in a slot marks a boundary edge, a non-manifold edge, or an
    /// edge whose other face repeats this face's vertex ids.
    #[inline]
    pub fn face_neighbors(&self, f: usize) -> Option<[Option<u32>; 3]> {
        self.face_neighbors.get(f).copied()
    }

    /// Slot table for every face, in face-id order.
    #[inline]
    pub fn face_neighbor_slots(&self) -> &[[Option<u32>; 3]] {
        &self.face_neighbors
    }

    /// Distinct faces sharing an edge with face `f`, ascending.
    pub fn adjacent_faces(&self, f: usize) -> Vec<u32> {
        let mut out: Vec<u32> = self
            .face_neighbors(f)
            .into_iter()
            .flatten()
            .flatten()
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// True if face `f` has no neighbor across any of its edges.
    ///
    /// Faces on a non-manifold edge still share that edge with other faces
    /// and are not isolated.
    #[inline]
    pub fn is_isolated(&self, f: usize) -> bool {
        self.face_neighbors
            .get(f)
            .is_some_and(|slots| slots.iter().all(Option::is_none))
            && !self.on_non_manifold_edge[f]
    }

    /// Ids of all isolated faces, ascending.
    pub fn isolated_faces(&self) -> Vec<u32> {
        (0..self.num_faces())
            .filter(|&f| self.is_isolated(f))
            .map(|f| f as u32)
            .collect()
    }

    /// Number of vertices not referenced by any face.
    pub fn unreferenced_vertex_count(&self) -> usize {
        self.vertex_faces.iter().filter(|f| f.is_empty()).count()
    }

    /// Edges with exactly one incident face.
    #[inline]
    pub fn boundary_edge_count(&self) -> usize {
        self.boundary_edge_count
    }

    /// Edges with more than two incident faces.
    #[inline]
    pub fn non_manifold_edge_count(&self) -> usize {
        self.non_manifold_edges.len()
    }

    #[inline]
    pub fn non_manifold_edges(&self) -> &[NonManifoldEdge] {
        &self.non_manifold_edges
    }

    /// Every edge is shared by at most two faces.
    #[inline]
    pub fn is_manifold(&self) -> bool {
        self.non_manifold_edges.is_empty()
    }

    /// Manifold, non-empty, and without boundary edges.
    #[inline]
    pub fn is_watertight(&self) -> bool {
        !self.faces.is_empty() && self.boundary_edge_count == 0 && self.is_manifold()
    }

    /// Connectivity findings as diagnostics.
    pub fn issues(&self) -> Vec<GeometryIssue> {
        let non_manifold = self.non_manifold_edges.iter().map(|e| GeometryIssue::NonManifoldEdge {
            vertex_a: e.edge.0,
            vertex_b: e.edge.1,
            face_count: e.face_count,
        });
        let isolated = self
            .isolated_faces()
            .into_iter()
            .map(|f| GeometryIssue::IsolatedFace { face_index: f as usize });
        non_manifold.chain(isolated).collect()
    }
}
