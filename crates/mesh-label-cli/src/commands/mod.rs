//! Subcommand implementations.

pub mod info;
pub mod isolated;
pub mod labels;
pub mod operators;

use std::path::Path;

use anyhow::{Context, Result};
use mesh_label::{LabelMesh, LoadParams, LoadReport};

/// Load a mesh for a command, attaching the path to any failure.
pub(crate) fn load(input: &Path, params: &LoadParams) -> Result<(LabelMesh, LoadReport)> {
    LabelMesh::load(input, params).with_context(|| format!("Failed to load mesh from {:?}", input))
}
