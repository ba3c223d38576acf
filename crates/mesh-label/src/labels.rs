//! Per-face label import and export.
//!
//! Label files are plain text holding whitespace-separated integers, one per
//! face in ascending face-id order (conventionally with a `.dat` extension).
//!
//! Import is all-or-nothing. Under [`LabelImportPolicy::Strict`] a source
//! whose token count differs from the face count is rejected with
//! [`MeshError::LabelCountMismatch`]. [`LabelImportPolicy::Lenient`] instead
//! ignores extra tokens and leaves missing faces at [`DEFAULT_LABEL`].

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::error::{MeshError, MeshResult};

/// Integer class attached to a face.
pub type Label = i32;

/// Label of faces that were never assigned one.
pub const DEFAULT_LABEL: Label = 0;

/// How to treat a label source whose length differs from the face count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "snake_case"))]
pub enum LabelImportPolicy {
    /// Reject the import.
    #[default]
    Strict,
    /// Truncate or pad with [`DEFAULT_LABEL`], logging a warning.
    Lenient,
}

/// Outcome of a successful import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelImport {
    /// The source was empty; existing labels are unchanged.
    Skipped,
    /// Labels were replaced.
    Applied {
        /// Faces that received a label from the source.
        applied: usize,
        /// Faces left at the default label because the source was short.
        padded: usize,
        /// Source tokens beyond the face count.
        ignored: usize,
    },
}

/// Parse whitespace-separated integer labels.
///
/// `source_name` is only used in error messages.
///
/// # Errors
///
/// - [`MeshError::SourceUnavailable`] if reading fails.
/// - [`MeshError::LabelParse`] on the first token that is not an integer.
pub fn parse_labels<R: BufRead>(mut reader: R, source_name: &str) -> MeshResult<Vec<Label>> {
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .map_err(|e| MeshError::source_unavailable(source_name, e))?;

    text.split_whitespace()
        .enumerate()
        .map(|(token_index, token)| {
            token.parse::<Label>().map_err(|_| MeshError::LabelParse {
                source_name: source_name.to_string(),
                token_index,
                token: token.to_string(),
            })
        })
        .collect()
}

/// Read and parse a label file.
pub fn read_label_file(path: impl AsRef<Path>) -> MeshResult<Vec<Label>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| MeshError::source_unavailable(path, e))?;
    let labels = parse_labels(BufReader::new(file), &path.display().to_string())?;
    debug!(path = %path.display(), tokens = labels.len(), "Read label file");
    Ok(labels)
}

/// Replace `labels` with `tokens` under `policy`.
///
/// `labels` must already hold one entry per face. On error it is left
/// untouched.
pub fn apply_labels(
    labels: &mut [Label],
    tokens: &[Label],
    policy: LabelImportPolicy,
) -> MeshResult<LabelImport> {
    if tokens.is_empty() {
        return Ok(LabelImport::Skipped);
    }

    let face_count = labels.len();
    if policy == LabelImportPolicy::Strict && tokens.len() != face_count {
        return Err(MeshError::LabelCountMismatch {
            expected: face_count,
            found: tokens.len(),
        });
    }

    let applied = tokens.len().min(face_count);
    labels[..applied].copy_from_slice(&tokens[..applied]);
    labels[applied..].fill(DEFAULT_LABEL);

    Ok(LabelImport::Applied {
        applied,
        padded: face_count - applied,
        ignored: tokens.len() - applied,
    })
}

/// Write labels as whitespace-separated integers, one per line.
pub fn write_labels<W: Write>(mut writer: W, labels: &[Label]) -> std::io::Result<()> {
    for label in labels {
        writeln!(writer, "{}", label)?;
    }
    writer.flush()
}

/// Write a label file readable by [`read_label_file`].
pub fn write_label_file(path: impl AsRef<Path>, labels: &[Label]) -> MeshResult<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| MeshError::write_failed(path, e))?;
    write_labels(BufWriter::new(file), labels).map_err(|e| MeshError::write_failed(path, e))?;
    debug!(path = %path.display(), labels = labels.len(), "Wrote label file");
    Ok(())
}

/// Number of faces per label, ascending by label.
pub fn label_histogram(labels: &[Label]) -> BTreeMap<Label, usize> {
    let mut histogram = BTreeMap::new();
    for &label in labels {
        *histogram.entry(label).or_insert(0) += 1;
    }
    histogram
}
