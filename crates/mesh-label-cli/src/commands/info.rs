//! mesh-label info command - display mesh statistics and topology diagnostics.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct MeshInfo {
    path: String,
    vertices: usize,
    faces: usize,
    edges: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    bounds: Option<BoundsInfo>,
    surface_area: f64,
    boundary_edges: usize,
    non_manifold_edges: usize,
    unreferenced_vertices: usize,
    isolated_faces: usize,
    repair_candidates: usize,
    degenerate_faces: usize,
    dropped_faces: usize,
    manifold: bool,
    watertight: bool,
    source_normals: bool,
}

#[derive(Serialize)]
struct BoundsInfo {
    min: [f64; 3],
    max: [f64; 3],
    dimensions: [f64; 3],
}

pub fn run(input: &Path, cli: &Cli) -> Result<()> {
    let config = cli.labeling_config()?;
    let (mesh, report) = super::load(input, &config.load)?;
    let topology = mesh.topology();

    let bounds = mesh.bounds();
    let bounds = (!bounds.is_empty()).then(|| {
        let dims = bounds.dimensions();
        BoundsInfo {
            min: [bounds.min.x, bounds.min.y, bounds.min.z],
            max: [bounds.max.x, bounds.max.y, bounds.max.z],
            dimensions: [dims.x, dims.y, dims.z],
        }
    });

    let info = MeshInfo {
        path: input.display().to_string(),
        vertices: mesh.num_vertices(),
        faces: mesh.num_faces(),
        edges: topology.num_edges(),
        bounds,
        surface_area: mesh.geometry().total_surface_area(),
        boundary_edges: topology.boundary_edge_count(),
        non_manifold_edges: topology.non_manifold_edge_count(),
        unreferenced_vertices: topology.unreferenced_vertex_count(),
        isolated_faces: report.isolated.isolated.len(),
        repair_candidates: report.isolated.candidate_count(),
        degenerate_faces: mesh.degenerate_faces().len(),
        dropped_faces: report.dropped_faces,
        manifold: topology.is_manifold(),
        watertight: topology.is_watertight(),
        source_normals: report.source_normals_used,
    };

    match cli.format {
        OutputFormat::Json => output::print(&info, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                print_text(&info);
            }
        }
    }

    Ok(())
}

fn print_text(info: &MeshInfo) {
    println!("{}", "Mesh Information".bold().underline());
    println!("  {}: {}", "File".cyan(), info.path);
    println!("  {}: {}", "Vertices".cyan(), info.vertices);
    println!("  {}: {}", "Faces".cyan(), info.faces);
    println!("  {}: {}", "Edges".cyan(), info.edges);

    if let Some(ref b) = info.bounds {
        println!(
            "  {}: {:.4} x {:.4} x {:.4}",
            "Dimensions".cyan(),
            b.dimensions[0],
            b.dimensions[1],
            b.dimensions[2]
        );
        println!(
            "  {}: ({:.4}, {:.4}, {:.4})",
            "Min bounds".cyan(),
            b.min[0],
            b.min[1],
            b.min[2]
        );
        println!(
            "  {}: ({:.4}, {:.4}, {:.4})",
            "Max bounds".cyan(),
            b.max[0],
            b.max[1],
            b.max[2]
        );
    }
    println!("  {}: {:.6}", "Surface area".cyan(), info.surface_area);

    println!();
    println!("{}", "Topology".bold().underline());
    println!("  {}: {}", "Manifold".cyan(), output::yes_no(info.manifold));
    println!("  {}: {}", "Watertight".cyan(), output::yes_no(info.watertight));
    println!("  {}: {}", "Boundary edges".cyan(), info.boundary_edges);
    println!("  {}: {}", "Non-manifold edges".cyan(), info.non_manifold_edges);
    println!(
        "  {}: {}",
        "Unreferenced vertices".cyan(),
        info.unreferenced_vertices
    );
    println!(
        "  {}: {} ({} repair candidates)",
        "Isolated faces".cyan(),
        info.isolated_faces,
        info.repair_candidates
    );
    println!("  {}: {}", "Degenerate faces".cyan(), info.degenerate_faces);
    if info.dropped_faces > 0 {
        println!("  {}: {}", "Dropped faces".yellow(), info.dropped_faces);
    }
    println!(
        "  {}: {}",
        "Normals from file".cyan(),
        output::yes_no(info.source_normals)
    );
}
