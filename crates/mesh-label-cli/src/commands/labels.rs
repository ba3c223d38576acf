//! mesh-label labels command - import a face label file and summarize it.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use mesh_label::{Label, LabelImport, LabelImportPolicy, label_histogram};
use serde::Serialize;

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct LabelsResult {
    mesh: String,
    labels: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    faces: usize,
    policy: &'static str,
    skipped: bool,
    applied: usize,
    padded: usize,
    ignored: usize,
    histogram: BTreeMap<Label, usize>,
}

pub fn run(
    input: &Path,
    labels_path: &Path,
    lenient: bool,
    output_path: Option<&Path>,
    cli: &Cli,
) -> Result<()> {
    let config = cli.labeling_config()?;
    let policy = if lenient {
        LabelImportPolicy::Lenient
    } else {
        config.label_policy
    };

    let (mut mesh, _) = super::load(input, &config.load)?;
    let outcome = mesh
        .import_labels(Some(labels_path), policy)
        .with_context(|| format!("Failed to import labels from {:?}", labels_path))?;

    if let Some(path) = output_path {
        mesh.export_labels(path)
            .with_context(|| format!("Failed to write labels to {:?}", path))?;
    }

    let (applied, padded, ignored) = match outcome {
        LabelImport::Skipped => (0, 0, 0),
        LabelImport::Applied {
            applied,
            padded,
            ignored,
        } => (applied, padded, ignored),
    };

    let result = LabelsResult {
        mesh: input.display().to_string(),
        labels: labels_path.display().to_string(),
        output: output_path.map(|p| p.display().to_string()),
        faces: mesh.num_faces(),
        policy: match policy {
            LabelImportPolicy::Strict => "strict",
            LabelImportPolicy::Lenient => "lenient",
        },
        skipped: outcome == LabelImport::Skipped,
        applied,
        padded,
        ignored,
        histogram: label_histogram(mesh.labels()),
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

fn print_text(result: &LabelsResult) {
    println!("{}", "Face Labels".bold().underline());
    println!("  {}: {}", "Mesh".cyan(), result.mesh);
    println!("  {}: {}", "Labels".cyan(), result.labels);
    println!("  {}: {}", "Faces".cyan(), result.faces);
    println!("  {}: {}", "Policy".cyan(), result.policy);

    if result.skipped {
        output::warning(
            "Label file is empty; labels left unchanged",
            OutputFormat::Text,
            false,
        );
    } else {
        println!("  {}: {}", "Applied".cyan(), result.applied);
        if result.padded > 0 || result.ignored > 0 {
            output::warning(
                &format!(
                    "{} faces padded with the default label, {} extra labels ignored",
                    result.padded, result.ignored
                ),
                OutputFormat::Text,
                false,
            );
        }
    }

    println!();
    println!("{}", "Histogram".bold().underline());
    for (label, count) in &result.histogram {
        println!("  {:>6}: {}", label, count);
    }

    if let Some(ref path) = result.output {
        output::success(
            &format!("Wrote {} labels to {}", result.faces, path),
            OutputFormat::Text,
            false,
        );
    }
}
