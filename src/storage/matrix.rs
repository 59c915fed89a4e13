//! Plain-text output of probability matrices
//!
//! Each row is written as space-separated values with six decimal digits,
//! every row terminated by `\r\n`.

use anyhow::{Context, Result};
use ndarray::Array2;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

const ROW_TERMINATOR: &str = "\r\n";

/// Write a matrix in the text layout to any writer
///
/// # Errors
///
/// Returns the underlying I/O error
pub fn write_prob_matrix<W: Write>(matrix: &Array2<f64>, mut writer: W) -> io::Result<()> {
    for row in matrix.rows() {
        let mut first = true;
        for value in row {
            if !first {
                writer.write_all(b" ")?;
            }
            write!(writer, "{value:.6}")?;
            first = false;
        }
        writer.write_all(ROW_TERMINATOR.as_bytes())?;
    }
    writer.flush()
}

/// Render a matrix in the text layout
///
/// # Example
///
/// ```
/// use hrg_fit::format_prob_matrix;
/// use ndarray::array;
///
/// let text = format_prob_matrix(&array![[0.0, 0.5], [0.5, 0.0]]);
/// assert_eq!(text, "0.000000 0.500000\r\n0.500000 0.000000\r\n");
/// ```
#[must_use]
pub fn format_prob_matrix(matrix: &Array2<f64>) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail
    let _ = write_prob_matrix(matrix, &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

/// Save a matrix to `path` in one atomic step
///
/// The content goes to a temporary file next to `path` which is renamed
/// into place only after it is completely written, so an interrupted run
/// never leaves a truncated matrix behind.
///
/// # Errors
///
/// Returns error if the temporary file cannot be created, written or renamed
pub fn save_prob_matrix<P: AsRef<Path>>(matrix: &Array2<f64>, path: P) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    write_prob_matrix(matrix, BufWriter::new(tmp.as_file_mut()))
        .with_context(|| format!("Failed to write matrix for {}", path.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("Failed to sync matrix for {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("Failed to move matrix into {}", path.display()))?;

    Ok(())
}
