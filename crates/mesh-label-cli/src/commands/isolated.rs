//! mesh-label isolated command - report isolated faces and weld them back.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use mesh_label::{CandidateRule, IsolatedFace, NeighborSearch};
use serde::Serialize;

use crate::{Cli, OutputFormat, output};

/// Command-line overrides on top of the configured isolated-face settings.
pub struct Options<'a> {
    pub threshold: Option<f64>,
    pub kd_tree: bool,
    pub all_vertices: bool,
    pub rebuild: bool,
    pub output: Option<&'a Path>,
}

#[derive(Serialize)]
struct IsolatedResult {
    input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    weld_threshold: f64,
    search: &'static str,
    candidate_rule: &'static str,
    isolated_faces: Vec<FaceEntry>,
    candidates: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    rebuild: Option<RebuildEntry>,
}

#[derive(Serialize)]
struct FaceEntry {
    face: usize,
    vertices: [u32; 3],
    matches: [Option<u32>; 3],
    candidate: bool,
}

#[derive(Serialize)]
struct RebuildEntry {
    faces_rebuilt: usize,
    faces_dropped: usize,
    faces_left: usize,
    vertices_removed: usize,
    vertices: usize,
    faces: usize,
}

impl From<&IsolatedFace> for FaceEntry {
    fn from(face: &IsolatedFace) -> Self {
        Self {
            face: face.face_index,
            vertices: face.vertices,
            matches: face.matches,
            candidate: face.is_candidate,
        }
    }
}

pub fn run(input: &Path, options: Options<'_>, cli: &Cli) -> Result<()> {
    let config = cli.labeling_config()?;
    let mut params = config.load;

    if let Some(threshold) = options.threshold {
        params.isolated.weld_threshold = threshold;
    }
    if options.kd_tree {
        params.isolated.search = NeighborSearch::KdTree;
    }
    if options.all_vertices {
        params.isolated.candidate_rule = CandidateRule::AllVertices;
    }
    params.isolated.rebuild = options.rebuild;

    let (mesh, report) = super::load(input, &params)?;
    let detection = &report.isolated;

    let rebuild = report.rebuild.map(|outcome| RebuildEntry {
        faces_rebuilt: outcome.faces_rebuilt,
        faces_dropped: outcome.faces_dropped,
        faces_left: outcome.faces_left,
        vertices_removed: outcome.vertices_removed,
        vertices: mesh.num_vertices(),
        faces: mesh.num_faces(),
    });

    if options.rebuild {
        if let Some(path) = options.output {
            mesh.save(path)
                .with_context(|| format!("Failed to save mesh to {:?}", path))?;
        }
    }

    let result = IsolatedResult {
        input: input.display().to_string(),
        output: options
            .output
            .filter(|_| options.rebuild)
            .map(|p| p.display().to_string()),
        weld_threshold: detection.weld_threshold,
        search: match detection.search {
            NeighborSearch::BruteForce => "brute_force",
            NeighborSearch::KdTree => "kd_tree",
        },
        candidate_rule: match detection.candidate_rule {
            CandidateRule::AnyVertex => "any_vertex",
            CandidateRule::AllVertices => "all_vertices",
        },
        isolated_faces: detection.isolated.iter().map(FaceEntry::from).collect(),
        candidates: detection.candidate_count(),
        rebuild,
    };

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

fn print_text(result: &IsolatedResult) {
    println!("{}", "Isolated Faces".bold().underline());
    println!("  {}: {}", "File".cyan(), result.input);
    println!(
        "  {}: {} ({}, {})",
        "Threshold".cyan(),
        result.weld_threshold,
        result.search,
        result.candidate_rule
    );

    if result.isolated_faces.is_empty() {
        output::success("No isolated faces", OutputFormat::Text, false);
        return;
    }

    println!(
        "  {}: {} ({} repair candidates)",
        "Isolated".cyan(),
        result.isolated_faces.len(),
        result.candidates
    );
    for face in &result.isolated_faces {
        let matches: Vec<String> = face
            .vertices
            .iter()
            .zip(face.matches)
            .map(|(v, m)| match m {
                Some(m) => format!("{} -> {}", v, m),
                None => format!("{} -> -", v),
            })
            .collect();
        let marker = if face.candidate {
            "candidate".green()
        } else {
            "no match".yellow()
        };
        println!("    face {}: [{}] {}", face.face, matches.join(", "), marker);
    }

    match (&result.rebuild, &result.output) {
        (Some(rebuild), Some(path)) => {
            output::success(
                &format!(
                    "Rebuilt {} faces ({} dropped, {} left, {} vertices removed); saved {} vertices, {} faces to {}",
                    rebuild.faces_rebuilt,
                    rebuild.faces_dropped,
                    rebuild.faces_left,
                    rebuild.vertices_removed,
                    rebuild.vertices,
                    rebuild.faces,
                    path
                ),
                OutputFormat::Text,
                false,
            );
        }
        _ if result.candidates > 0 => {
            output::warning(
                "Candidates left in place; pass --rebuild -o OUT to weld them",
                OutputFormat::Text,
                false,
            );
        }
        _ => {}
    }
}
