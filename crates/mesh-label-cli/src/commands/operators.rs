//! mesh-label operators command - build a sparse operator and summarize it.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use mesh_label::{Dissimilarity, FaceLaplacianParams, LabelMesh, MeshResult, OperatorSummary};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use serde::Serialize;

use crate::{Cli, OperatorKind, OutputFormat, output};

/// Operator selection and command-line parameter overrides.
pub struct Options<'a> {
    pub kind: OperatorKind,
    pub uniform_weight: Option<f64>,
    pub affinity_weight: Option<f64>,
    pub affinity_sigma: Option<f64>,
    pub sigma: Option<f64>,
    pub dissimilarity: Option<Dissimilarity>,
    pub output: Option<&'a Path>,
}

/// A built operator.
enum Built {
    Sparse(CsrMatrix<f64>),
    Vector(DVector<f64>),
    Index(DMatrix<i64>),
}

#[derive(Serialize)]
struct OperatorResult {
    input: String,
    kind: &'static str,
    rows: usize,
    cols: usize,
    nnz: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    symmetric: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_abs_row_sum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
}

/// File layout written by `--output`.
#[derive(Debug, Serialize)]
#[serde(tag = "format", rename_all = "snake_case")]
enum OperatorExport {
    /// `[row, col, value]` triplets in row-major order.
    Triplets {
        rows: usize,
        cols: usize,
        entries: Vec<(usize, usize, f64)>,
    },
    Vector {
        values: Vec<f64>,
    },
    /// One `[a, b, c]` row per face, `-1` for no neighbor.
    Table {
        rows: Vec<[i64; 3]>,
    },
}

fn kind_name(kind: OperatorKind) -> &'static str {
    match kind {
        OperatorKind::VertexLaplacian => "vertex_laplacian",
        OperatorKind::FaceLaplacian => "face_laplacian",
        OperatorKind::FaceAffinity => "face_affinity",
        OperatorKind::FaceAreas => "face_areas",
        OperatorKind::FaceAdjacency => "face_adjacency",
    }
}

/// Merge command-line overrides into the configured face Laplacian params.
fn face_params(base: FaceLaplacianParams, options: &Options<'_>) -> FaceLaplacianParams {
    FaceLaplacianParams {
        uniform_weight: options.uniform_weight.unwrap_or(base.uniform_weight),
        affinity_weight: options.affinity_weight.unwrap_or(base.affinity_weight),
        affinity_sigma: options.affinity_sigma.unwrap_or(base.affinity_sigma),
        dissimilarity: options.dissimilarity.unwrap_or(base.dissimilarity),
    }
}

fn build(
    mesh: &LabelMesh,
    kind: OperatorKind,
    params: &FaceLaplacianParams,
    sigma: f64,
) -> MeshResult<Built> {
    let ops = mesh.operators();
    Ok(match kind {
        OperatorKind::VertexLaplacian => Built::Sparse(ops.vertex_laplacian()),
        OperatorKind::FaceLaplacian => Built::Sparse(ops.face_laplacian(params)?),
        OperatorKind::FaceAffinity => {
            Built::Sparse(ops.face_affinity_with(sigma, &params.dissimilarity)?)
        }
        OperatorKind::FaceAreas => Built::Vector(ops.face_areas()),
        OperatorKind::FaceAdjacency => Built::Index(ops.face_adjacency_index()),
    })
}

fn export(built: &Built) -> OperatorExport {
    match built {
        Built::Sparse(m) => OperatorExport::Triplets {
            rows: m.nrows(),
            cols: m.ncols(),
            entries: m.triplet_iter().map(|(i, j, &v)| (i, j, v)).collect(),
        },
        Built::Vector(v) => OperatorExport::Vector {
            values: v.iter().copied().collect(),
        },
        Built::Index(t) => OperatorExport::Table {
            rows: t
                .row_iter()
                .map(|row| [row[0], row[1], row[2]])
                .collect(),
        },
    }
}

fn write_export(path: &Path, export: &OperatorExport) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    serde_json::to_writer(BufWriter::new(file), export)
        .with_context(|| format!("Failed to write operator to {:?}", path))?;
    Ok(())
}

pub fn run(input: &Path, options: Options<'_>, cli: &Cli) -> Result<()> {
    let config = cli.labeling_config()?;
    let params = face_params(config.face_laplacian, &options);
    let sigma = options.sigma.unwrap_or(config.affinity_sigma);

    let (mesh, _) = super::load(input, &config.load)?;
    let built = build(&mesh, options.kind, &params, sigma)
        .with_context(|| format!("Failed to build {}", kind_name(options.kind)))?;

    if let Some(path) = options.output {
        write_export(path, &export(&built))?;
    }

    let mut result = OperatorResult {
        input: input.display().to_string(),
        kind: kind_name(options.kind),
        rows: 0,
        cols: 0,
        nnz: 0,
        symmetric: None,
        max_abs_row_sum: None,
        sum: None,
        output: options.output.map(|p| p.display().to_string()),
    };
    match &built {
        Built::Sparse(m) => {
            let summary = OperatorSummary::of(m);
            result.rows = summary.rows;
            result.cols = summary.cols;
            result.nnz = summary.nnz;
            result.symmetric = Some(summary.symmetric);
            result.max_abs_row_sum = Some(summary.max_abs_row_sum);
        }
        Built::Vector(v) => {
            result.rows = v.len();
            result.cols = 1;
            result.nnz = v.len();
            result.sum = Some(v.sum());
        }
        Built::Index(t) => {
            result.rows = t.nrows();
            result.cols = t.ncols();
            result.nnz = t.iter().filter(|&&g| g != mesh_label::NO_NEIGHBOR).count();
        }
    }

    match cli.format {
        OutputFormat::Json => output::print(&result, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                print_text(&result);
            }
        }
    }

    Ok(())
}

fn print_text(result: &OperatorResult) {
    println!("{}", "Operator".bold().underline());
    println!("  {}: {}", "File".cyan(), result.input);
    println!("  {}: {}", "Kind".cyan(), result.kind);
    println!("  {}: {} x {}", "Shape".cyan(), result.rows, result.cols);
    println!("  {}: {}", "Stored entries".cyan(), result.nnz);
    if let Some(symmetric) = result.symmetric {
        println!("  {}: {}", "Symmetric".cyan(), output::yes_no(symmetric));
    }
    if let Some(row_sum) = result.max_abs_row_sum {
        println!("  {}: {:.3e}", "Max |row sum|".cyan(), row_sum);
    }
    if let Some(sum) = result.sum {
        println!("  {}: {:.6}", "Sum".cyan(), sum);
    }
    if let Some(ref path) = result.output {
        output::success(&format!("Wrote entries to {}", path), OutputFormat::Text, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_label::{LoadParams, Mesh};

    fn tetrahedron() -> LabelMesh {
        let soup = Mesh::from_raw(
            &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
            ],
            &[[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]],
        );
        LabelMesh::from_mesh(soup, &LoadParams::default()).unwrap().0
    }

    fn options(kind: OperatorKind) -> Options<'static> {
        Options {
            kind,
            uniform_weight: None,
            affinity_weight: None,
            affinity_sigma: None,
            sigma: None,
            dissimilarity: None,
            output: None,
        }
    }

    #[test]
    fn test_overrides_replace_configured_params() {
        let mut opts = options(OperatorKind::FaceLaplacian);
        opts.affinity_sigma = Some(0.25);
        opts.dissimilarity = Some(Dissimilarity::NormalAngle);

        let params = face_params(FaceLaplacianParams::default(), &opts);
        assert_eq!(params.uniform_weight, 1.0);
        assert_eq!(params.affinity_sigma, 0.25);
        assert_eq!(params.dissimilarity, Dissimilarity::NormalAngle);
    }

    #[test]
    fn test_vertex_laplacian_export() {
        let mesh = tetrahedron();
        let built = build(
            &mesh,
            OperatorKind::VertexLaplacian,
            &FaceLaplacianParams::default(),
            1.0,
        )
        .unwrap();

        match export(&built) {
            OperatorExport::Triplets {
                rows,
                cols,
                entries,
            } => {
                assert_eq!((rows, cols), (4, 4));
                // every vertex of a tetrahedron touches the other three
                assert_eq!(entries.len(), 16);
                assert!(entries.contains(&(0, 0, 3.0)));
                assert!(entries.contains(&(0, 1, -1.0)));
            }
            other => panic!("unexpected export: {other:?}"),
        }
    }

    #[test]
    fn test_bad_sigma_is_rejected() {
        let mesh = tetrahedron();
        let result = build(
            &mesh,
            OperatorKind::FaceAffinity,
            &FaceLaplacianParams::default(),
            0.0,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_adjacency_export_written_as_json() {
        let mesh = tetrahedron();
        let built = build(
            &mesh,
            OperatorKind::FaceAdjacency,
            &FaceLaplacianParams::default(),
            1.0,
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adjacency.json");
        write_export(&path, &export(&built)).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["format"], "table");
        let rows = json["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|row| {
            row.as_array()
                .unwrap()
                .iter()
                .all(|g| g.as_i64().unwrap() >= 0)
        }));
    }

    #[test]
    fn test_face_areas_export() {
        let mesh = tetrahedron();
        let built = build(
            &mesh,
            OperatorKind::FaceAreas,
            &FaceLaplacianParams::default(),
            1.0,
        )
        .unwrap();

        match export(&built) {
            OperatorExport::Vector { values } => {
                assert_eq!(values.len(), 4);
                assert!(values.iter().all(|&a| a > 0.0));
            }
            other => panic!("unexpected export: {other:?}"),
        }
    }
}
