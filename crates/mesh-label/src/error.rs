//! Error types for mesh labeling operations with rich diagnostics.
//!
//! This module provides:
//! - Machine-readable error codes for programmatic handling
//! - Rich context (which vertex, which face, which parameter)
//! - Recovery suggestions for common issues
//! - Terminal display via miette
//!
//! # Error Codes
//!
//! Each error has a unique code in the format `MESH-XXXX`:
//! - `MESH-1xxx`: I/O errors (sources that cannot be read or written)
//! - `MESH-2xxx`: Validation errors (topology, labels, parameters, tables)
//! - `MESH-3xxx`: Interrupted operations
//! - `MESH-4xxx`: Format errors
//!
//! Degenerate geometry is not an error: it is reported as a [`GeometryIssue`]
//! and the computation carries on with a sentinel value.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// MESH-1001: Mesh or label source cannot be opened or read
    SourceUnavailable = 1001,
    /// MESH-1002: Failed to write file
    WriteFailed = 1002,
    /// MESH-1003: Failed to parse mesh file
    ParseError = 1003,

    /// MESH-2001: Face references invalid vertex index
    InvalidVertexIndex = 2001,
    /// MESH-2002: Vertex has NaN or Infinity coordinate
    InvalidCoordinate = 2002,
    /// MESH-2003: Mesh has no vertices or faces
    EmptyMesh = 2003,
    /// MESH-2004: Invalid mesh topology
    InvalidTopology = 2004,
    /// MESH-2101: Label count differs from face count
    LabelCountMismatch = 2101,
    /// MESH-2102: Label token is not an integer
    LabelParse = 2102,
    /// MESH-2201: Operator parameter out of range
    InvalidParameter = 2201,
    /// MESH-2202: Bulk table has the wrong shape
    DimensionMismatch = 2202,

    /// MESH-3001: Operation cancelled through a progress callback
    Cancelled = 3001,

    /// MESH-4001: Unsupported file format
    UnsupportedFormat = 4001,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `MESH-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::SourceUnavailable => "MESH-1001",
            ErrorCode::WriteFailed => "MESH-1002",
            ErrorCode::ParseError => "MESH-1003",
            ErrorCode::InvalidVertexIndex => "MESH-2001",
            ErrorCode::InvalidCoordinate => "MESH-2002",
            ErrorCode::EmptyMesh => "MESH-2003",
            ErrorCode::InvalidTopology => "MESH-2004",
            ErrorCode::LabelCountMismatch => "MESH-2101",
            ErrorCode::LabelParse => "MESH-2102",
            ErrorCode::InvalidParameter => "MESH-2201",
            ErrorCode::DimensionMismatch => "MESH-2202",
            ErrorCode::Cancelled => "MESH-3001",
            ErrorCode::UnsupportedFormat => "MESH-4001",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions for mesh errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Re-export the file from the original software.
    ReexportFile { format: Option<String> },
    /// Use a different file format.
    UseDifferentFormat { suggested: Vec<String> },
    /// Check the source data.
    CheckSource { checks: Vec<String> },
    /// Adjust parameters for the operation.
    AdjustParameters { parameters: Vec<(String, String)> },
    /// Retry the operation without cancelling.
    Retry,
    /// No automatic recovery available.
    None,
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySuggestion::ReexportFile { format } => {
                if let Some(fmt) = format {
                    write!(
                        f,
                        "Try re-exporting the mesh as {} from the original software",
                        fmt
                    )
                } else {
                    write!(f, "Try re-exporting the mesh from the original software")
                }
            }
            RecoverySuggestion::UseDifferentFormat { suggested } => {
                write!(f, "Try using a different format: {}", suggested.join(", "))
            }
            RecoverySuggestion::CheckSource { checks } => {
                write!(f, "Check the source for: {}", checks.join(", "))
            }
            RecoverySuggestion::AdjustParameters { parameters } => {
                let params: Vec<String> = parameters
                    .iter()
                    .map(|(k, v)| format!("{} = {}", k, v))
                    .collect();
                write!(f, "Try adjusting: {}", params.join(", "))
            }
            RecoverySuggestion::Retry => write!(f, "Run the operation again to completion"),
            RecoverySuggestion::None => write!(f, "No automatic recovery available"),
        }
    }
}

/// Location information for mesh errors.
#[derive(Debug, Clone)]
pub enum MeshLocation {
    /// Error at a specific vertex.
    Vertex { index: usize },
    /// Error at a specific face.
    Face { index: usize },
    /// Error at a position in a token stream (label files).
    Token { source_name: String, index: usize },
    /// Error in a file.
    File { path: PathBuf },
}

impl std::fmt::Display for MeshLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeshLocation::Vertex { index } => write!(f, "vertex {}", index),
            MeshLocation::Face { index } => write!(f, "face {}", index),
            MeshLocation::Token { source_name, index } => {
                write!(f, "{} (token {})", source_name, index)
            }
            MeshLocation::File { path } => write!(f, "{}", path.display()),
        }
    }
}

/// Errors that can occur while building, querying or labeling a mesh.
#[derive(Debug, Error, Diagnostic)]
pub enum MeshError {
    /// A mesh or label source cannot be opened or read.
    #[error("source unavailable: {path}")]
    #[diagnostic(
        code(mesh::io::source_unavailable),
        help("Check that the file exists and is readable. Try: ls -la {}", path.display())
    )]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error writing to a file.
    #[error("failed to write {path}")]
    #[diagnostic(
        code(mesh::io::write),
        help("Check that the directory exists and is writable")
    )]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing a mesh file.
    #[error("failed to parse mesh from {path}: {details}")]
    #[diagnostic(
        code(mesh::parse::error),
        help("The file may be corrupted or in an unsupported format variant.")
    )]
    ParseError { path: PathBuf, details: String },

    /// Unsupported file format.
    #[error("unsupported mesh format: {extension:?}")]
    #[diagnostic(
        code(mesh::format::unsupported),
        help("Supported formats: OBJ, PLY, STL")
    )]
    UnsupportedFormat { extension: Option<String> },

    /// Empty mesh (no vertices or faces).
    #[error("mesh is empty: {details}")]
    #[diagnostic(
        code(mesh::validation::empty),
        help("The source must contain at least one vertex and one face.")
    )]
    EmptyMesh { details: String },

    /// Invalid mesh topology.
    #[error("invalid mesh topology: {details}")]
    #[diagnostic(code(mesh::validation::topology))]
    InvalidTopology { details: String },

    /// Invalid vertex index in face data.
    #[error(
        "invalid vertex index: face {face_index} references vertex {vertex_index}, but mesh only has {vertex_count} vertices"
    )]
    #[diagnostic(
        code(mesh::validation::vertex_index),
        help("Check the mesh export settings; face indices must be 0-based and in range.")
    )]
    InvalidVertexIndex {
        face_index: usize,
        vertex_index: u32,
        vertex_count: usize,
    },

    /// Invalid coordinate value (NaN or Infinity).
    #[error("invalid coordinate at vertex {vertex_index}: {coordinate} is {value}")]
    #[diagnostic(code(mesh::validation::coordinate))]
    InvalidCoordinate {
        vertex_index: usize,
        coordinate: &'static str,
        value: f64,
    },

    /// Label source token count differs from the mesh face count.
    #[error("label count mismatch: mesh has {expected} faces, label source has {found} labels")]
    #[diagnostic(
        code(mesh::labels::count),
        help("Label files hold one integer per face in ascending face order.")
    )]
    LabelCountMismatch { expected: usize, found: usize },

    /// A label token could not be parsed as an integer.
    #[error("invalid label token {token:?} at position {token_index} in {source_name}")]
    #[diagnostic(
        code(mesh::labels::parse),
        help("Label files hold whitespace-separated integers only.")
    )]
    LabelParse {
        source_name: String,
        token_index: usize,
        token: String,
    },

    /// An operator parameter is out of its valid range.
    #[error("invalid parameter {name} = {value}: {reason}")]
    #[diagnostic(code(mesh::operators::parameter))]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    /// A bulk attribute table has the wrong number of rows or columns.
    #[error("{what} table has shape {found_rows}x{found_cols}, expected {expected_rows}x{expected_cols}")]
    #[diagnostic(
        code(mesh::tables::dimension),
        help("Bulk tables have one row per vertex (or face) id and 3 columns.")
    )]
    DimensionMismatch {
        what: &'static str,
        expected_rows: usize,
        expected_cols: usize,
        found_rows: usize,
        found_cols: usize,
    },

    /// A long-running operation was cancelled by its progress callback.
    #[error("{operation} was cancelled")]
    #[diagnostic(code(mesh::cancelled))]
    Cancelled { operation: &'static str },
}

impl MeshError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            MeshError::SourceUnavailable { .. } => ErrorCode::SourceUnavailable,
            MeshError::WriteFailed { .. } => ErrorCode::WriteFailed,
            MeshError::ParseError { .. } => ErrorCode::ParseError,
            MeshError::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            MeshError::EmptyMesh { .. } => ErrorCode::EmptyMesh,
            MeshError::InvalidTopology { .. } => ErrorCode::InvalidTopology,
            MeshError::InvalidVertexIndex { .. } => ErrorCode::InvalidVertexIndex,
            MeshError::InvalidCoordinate { .. } => ErrorCode::InvalidCoordinate,
            MeshError::LabelCountMismatch { .. } => ErrorCode::LabelCountMismatch,
            MeshError::LabelParse { .. } => ErrorCode::LabelParse,
            MeshError::InvalidParameter { .. } => ErrorCode::InvalidParameter,
            MeshError::DimensionMismatch { .. } => ErrorCode::DimensionMismatch,
            MeshError::Cancelled { .. } => ErrorCode::Cancelled,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            MeshError::SourceUnavailable { .. } => RecoverySuggestion::CheckSource {
                checks: vec!["file exists".into(), "file permissions".into()],
            },
            MeshError::WriteFailed { .. } => RecoverySuggestion::CheckSource {
                checks: vec!["directory exists".into(), "write permissions".into()],
            },
            MeshError::ParseError { .. } => RecoverySuggestion::ReexportFile {
                format: Some("OBJ or PLY".into()),
            },
            MeshError::UnsupportedFormat { .. } => RecoverySuggestion::UseDifferentFormat {
                suggested: vec!["OBJ".into(), "PLY".into(), "STL".into()],
            },
            MeshError::EmptyMesh { .. } => RecoverySuggestion::CheckSource {
                checks: vec!["mesh has geometry".into(), "correct export settings".into()],
            },
            MeshError::InvalidTopology { .. }
            | MeshError::InvalidVertexIndex { .. }
            | MeshError::InvalidCoordinate { .. } => RecoverySuggestion::ReexportFile { format: None },
            MeshError::LabelCountMismatch { expected, .. } => RecoverySuggestion::CheckSource {
                checks: vec![
                    format!("label file has exactly {} entries", expected),
                    "labels were produced for this mesh".into(),
                ],
            },
            MeshError::LabelParse { .. } => RecoverySuggestion::CheckSource {
                checks: vec!["label file contains only integers".into()],
            },
            MeshError::InvalidParameter { name, .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![((*name).into(), "use a finite value > 0".into())],
            },
            MeshError::DimensionMismatch { .. } => RecoverySuggestion::CheckSource {
                checks: vec!["table rows match vertex/face count".into()],
            },
            MeshError::Cancelled { .. } => RecoverySuggestion::Retry,
        }
    }

    /// Returns location information if available.
    pub fn location(&self) -> Option<MeshLocation> {
        match self {
            MeshError::InvalidVertexIndex { face_index, .. } => Some(MeshLocation::Face {
                index: *face_index,
            }),
            MeshError::InvalidCoordinate { vertex_index, .. } => Some(MeshLocation::Vertex {
                index: *vertex_index,
            }),
            MeshError::LabelParse {
                source_name,
                token_index,
                ..
            } => Some(MeshLocation::Token {
                source_name: source_name.clone(),
                index: *token_index,
            }),
            MeshError::SourceUnavailable { path, .. }
            | MeshError::WriteFailed { path, .. }
            | MeshError::ParseError { path, .. } => Some(MeshLocation::File { path: path.clone() }),
            _ => None,
        }
    }

    /// Create a SourceUnavailable error.
    pub fn source_unavailable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeshError::SourceUnavailable {
            path: path.into(),
            source,
        }
    }

    /// Create a WriteFailed error.
    pub fn write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeshError::WriteFailed {
            path: path.into(),
            source,
        }
    }

    /// Create a ParseError.
    pub fn parse_error(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        MeshError::ParseError {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Create an InvalidVertexIndex error.
    pub fn invalid_vertex_index(face_index: usize, vertex_index: u32, vertex_count: usize) -> Self {
        MeshError::InvalidVertexIndex {
            face_index,
            vertex_index,
            vertex_count,
        }
    }

    /// Create an InvalidCoordinate error.
    pub fn invalid_coordinate(vertex_index: usize, coordinate: &'static str, value: f64) -> Self {
        MeshError::InvalidCoordinate {
            vertex_index,
            coordinate,
            value,
        }
    }

    /// Create an EmptyMesh error.
    pub fn empty_mesh(details: impl Into<String>) -> Self {
        MeshError::EmptyMesh {
            details: details.into(),
        }
    }

    /// Create an InvalidTopology error.
    pub fn invalid_topology(details: impl Into<String>) -> Self {
        MeshError::InvalidTopology {
            details: details.into(),
        }
    }

    /// Create an InvalidParameter error.
    pub fn invalid_parameter(name: &'static str, value: f64, reason: &'static str) -> Self {
        MeshError::InvalidParameter {
            name,
            value,
            reason,
        }
    }

    /// Create a DimensionMismatch error for an `expected_rows x 3` table.
    pub fn dimension_mismatch(
        what: &'static str,
        expected_rows: usize,
        found_rows: usize,
        found_cols: usize,
    ) -> Self {
        MeshError::DimensionMismatch {
            what,
            expected_rows,
            expected_cols: 3,
            found_rows,
            found_cols,
        }
    }

    /// Create an UnsupportedFormat error.
    pub fn unsupported_format(extension: Option<String>) -> Self {
        MeshError::UnsupportedFormat { extension }
    }
}

/// Non-fatal geometry and topology findings.
///
/// Unlike `MeshError`, these never stop an operation; they are collected
/// into reports and logged.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryIssue {
    /// Face with zero (or near-zero) area.
    DegenerateFace { face_index: usize, area: f64 },
    /// Face whose normal could not be normalized; it is left unnormalized.
    DegenerateNormal { face_index: usize },
    /// Face sharing no edge with any other face.
    IsolatedFace { face_index: usize },
    /// Edge shared by more than 2 faces.
    NonManifoldEdge {
        vertex_a: u32,
        vertex_b: u32,
        face_count: usize,
    },
}

impl GeometryIssue {
    /// Returns a severity level for the issue.
    pub fn severity(&self) -> IssueSeverity {
        match self {
            GeometryIssue::DegenerateFace { .. } => IssueSeverity::Warning,
            GeometryIssue::DegenerateNormal { .. } => IssueSeverity::Warning,
            GeometryIssue::IsolatedFace { .. } => IssueSeverity::Info,
            GeometryIssue::NonManifoldEdge { .. } => IssueSeverity::Warning,
        }
    }

    /// Returns an issue code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            GeometryIssue::DegenerateFace { .. } => "MESH-2005",
            GeometryIssue::DegenerateNormal { .. } => "MESH-2006",
            GeometryIssue::IsolatedFace { .. } => "MESH-2007",
            GeometryIssue::NonManifoldEdge { .. } => "MESH-2008",
        }
    }
}

/// Severity levels for geometry issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IssueSeverity {
    /// Informational, no action needed.
    Info,
    /// Warning, results may be affected.
    Warning,
}

impl std::fmt::Display for GeometryIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeometryIssue::DegenerateFace { face_index, area } => {
                write!(f, "face {} is degenerate (area: {:.2e})", face_index, area)
            }
            GeometryIssue::DegenerateNormal { face_index } => {
                write!(f, "face {} has a zero-length normal", face_index)
            }
            GeometryIssue::IsolatedFace { face_index } => {
                write!(f, "face {} shares no edge with another face", face_index)
            }
            GeometryIssue::NonManifoldEdge {
                vertex_a,
                vertex_b,
                face_count,
            } => write!(
                f,
                "edge ({}, {}) is non-manifold (shared by {} faces)",
                vertex_a, vertex_b, face_count
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = MeshError::invalid_vertex_index(5, 100, 50);
        assert_eq!(err.code(), ErrorCode::InvalidVertexIndex);
        assert_eq!(err.code().as_str(), "MESH-2001");

        let err = MeshError::LabelCountMismatch {
            expected: 4,
            found: 3,
        };
        assert_eq!(err.code().as_str(), "MESH-2101");
    }

    #[test]
    fn test_recovery_suggestions() {
        let err = MeshError::invalid_parameter("sigma", 0.0, "must be > 0");
        match err.recovery_suggestion() {
            RecoverySuggestion::AdjustParameters { parameters } => {
                assert_eq!(parameters[0].0, "sigma");
            }
            other => panic!("Expected AdjustParameters suggestion, got {:?}", other),
        }
    }

    #[test]
    fn test_location_info() {
        let err = MeshError::LabelParse {
            source_name: "labels.dat".into(),
            token_index: 7,
            token: "x".into(),
        };
        match err.location() {
            Some(MeshLocation::Token { index, .. }) => assert_eq!(index, 7),
            other => panic!("Expected Token location, got {:?}", other),
        }
    }

    #[test]
    fn test_error_display() {
        let err = MeshError::LabelCountMismatch {
            expected: 4,
            found: 3,
        };
        let display = format!("{}", err);
        assert!(display.contains("4 faces"));
        assert!(display.contains("3 labels"));

        let err = MeshError::dimension_mismatch("positions", 4, 3, 3);
        assert!(format!("{}", err).contains("3x3, expected 4x3"));
    }

    #[test]
    fn test_issue_severity() {
        let issue = GeometryIssue::DegenerateFace {
            face_index: 0,
            area: 0.0,
        };
        assert_eq!(issue.severity(), IssueSeverity::Warning);
        assert_eq!(
            GeometryIssue::IsolatedFace { face_index: 1 }.severity(),
            IssueSeverity::Info
        );
    }
}
