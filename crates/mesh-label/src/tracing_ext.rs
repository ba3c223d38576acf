//! Tracing extensions for mesh labeling operations.
//!
//! Structured logging and timing helpers built on the `tracing` ecosystem.
//! The library never installs a subscriber; applications choose one:
//!
//! ```rust,ignore
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env())
//!     .init();
//!
//! // RUST_LOG=mesh_label=debug for detailed output
//! ```
//!
//! # Log Levels
//!
//! - **WARN**: Degenerate geometry, non-manifold edges, lenient label fixes
//! - **INFO**: Operation summaries and timing
//! - **DEBUG**: Intermediate states, repair candidates
//! - **TRACE**: Per-face detail

use std::time::Instant;
use tracing::{Span, debug, info, trace, warn};

use crate::isolated::IsolatedFaceReport;
use crate::labels::LabelImport;
use crate::model::LabelMesh;
use crate::types::Mesh;

/// A performance timer that logs duration on drop.
///
/// ```rust,ignore
/// use mesh_label::tracing_ext::OperationTimer;
///
/// fn expensive_operation() {
///     let _timer = OperationTimer::new("expensive_operation");
///     // ... do work ...
/// } // logs elapsed time here
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    span: Span,
}

impl OperationTimer {
    /// Create a new operation timer.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!("mesh_operation", operation = name);
        debug!(target: "mesh_label::timing", operation = name, "Starting operation");
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Create a timer with mesh size fields attached to its span.
    pub fn with_context(name: &'static str, face_count: usize, vertex_count: usize) -> Self {
        let span = tracing::info_span!(
            "mesh_operation",
            operation = name,
            faces = face_count,
            vertices = vertex_count
        );
        debug!(
            target: "mesh_label::timing",
            operation = name,
            faces = face_count,
            vertices = vertex_count,
            "Starting operation"
        );
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Get the elapsed time.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Get the span for this timer.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let elapsed_ms = self.elapsed_ms();
        info!(
            target: "mesh_label::timing",
            operation = self.name,
            elapsed_ms = format!("{:.2}", elapsed_ms),
            "Operation completed"
        );
    }
}

/// Log the state of a labeled mesh at debug level.
pub fn log_mesh_stats(mesh: &LabelMesh, context: &str) {
    let dims = mesh.bounds().dimensions();
    let topology = mesh.topology();

    debug!(
        target: "mesh_label::mesh_state",
        context = context,
        vertices = mesh.num_vertices(),
        faces = mesh.num_faces(),
        boundary_edges = topology.boundary_edge_count(),
        non_manifold_edges = topology.non_manifold_edge_count(),
        dimensions = format!("{:.2} x {:.2} x {:.2}", dims.x, dims.y, dims.z),
        "Mesh state"
    );
}

/// Log a raw triangle soup at trace level.
pub fn log_soup_stats(mesh: &Mesh, context: &str) {
    let dims = mesh.bounds().dimensions();
    let has_normals = mesh.vertices.iter().any(|v| v.normal.is_some());
    let has_colors = mesh.vertices.iter().any(|v| v.color.is_some());

    trace!(
        target: "mesh_label::mesh_state",
        context = context,
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        width = format!("{:.4}", dims.x),
        height = format!("{:.4}", dims.y),
        depth = format!("{:.4}", dims.z),
        has_normals = has_normals,
        has_colors = has_colors,
        "Triangle soup"
    );
}

/// Log a built sparse operator.
pub fn log_operator_stats(operator: &str, rows: usize, cols: usize, nnz: usize) {
    debug!(
        target: "mesh_label::operators",
        operator = operator,
        rows = rows,
        cols = cols,
        nnz = nnz,
        "Operator built"
    );
}

/// Log the outcome of a label import.
pub fn log_label_import(source: &str, face_count: usize, outcome: &LabelImport) {
    match outcome {
        LabelImport::Skipped => {
            debug!(
                target: "mesh_label::labels",
                source = source,
                "Label source empty, import skipped"
            );
        }
        LabelImport::Applied { applied, padded, ignored } => {
            if *padded > 0 || *ignored > 0 {
                warn!(
                    target: "mesh_label::labels",
                    source = source,
                    faces = face_count,
                    applied = applied,
                    padded = padded,
                    ignored = ignored,
                    "Label count did not match face count"
                );
            } else {
                info!(
                    target: "mesh_label::labels",
                    source = source,
                    faces = face_count,
                    "Labels imported"
                );
            }
        }
    }
}

/// Log the result of an isolated-face scan.
pub fn log_isolated_faces(report: &IsolatedFaceReport) {
    if report.isolated.is_empty() {
        debug!(target: "mesh_label::isolated", "No isolated faces");
        return;
    }

    for face in &report.isolated {
        debug!(
            target: "mesh_label::isolated",
            face = face.face_index,
            candidate = face.is_candidate,
            "Isolated face"
        );
    }
    info!(
        target: "mesh_label::isolated",
        isolated = report.isolated.len(),
        candidates = report.candidate_count(),
        search = ?report.search,
        "Isolated face scan completed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LabelMesh, LoadParams};

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::new("test_operation");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10.0);
    }

    #[test]
    fn test_log_helpers_accept_empty_inputs() {
        let (mesh, _) = LabelMesh::from_mesh(Mesh::new(), &LoadParams::default()).unwrap();
        log_mesh_stats(&mesh, "test");
        log_soup_stats(&Mesh::new(), "test");
        log_operator_stats("vertex_laplacian", 0, 0, 0);
        log_label_import("test.dat", 0, &LabelImport::Skipped);
    }
}
