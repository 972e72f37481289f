use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::sanitize::sanitize_target;

const DEFAULT_EXTENSION: &str = "bin";
const MAX_COLLISIONS: usize = 1000;

/// Writes fetched payloads under the output directory:
///
/// ```text
/// <output_directory>/<job_id>/<execution_id>/<index>_<sanitized-target>.<ext>
/// ```
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    output_directory: PathBuf,
}

impl ArtifactWriter {
    pub fn new<P: AsRef<Path>>(output_directory: P) -> Self {
        Self {
            output_directory: output_directory.as_ref().to_path_buf(),
        }
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// Directory holding the artifacts of one execution.
    pub fn execution_directory(&self, job_id: &str, execution_id: &str) -> PathBuf {
        self.output_directory.join(job_id).join(execution_id)
    }

    /// Creates the execution directory if needed and returns it.
    pub fn prepare(&self, job_id: &str, execution_id: &str) -> Result<PathBuf, StorageError> {
        let dir = self.execution_directory(job_id, execution_id);
        ensure_directory(&dir)?;
        Ok(dir)
    }

    /// Writes one payload. `index` is the target's position in the job.
    pub fn write(
        &self,
        directory: &Path,
        index: usize,
        target: &str,
        content_type: Option<&str>,
        content: &[u8],
    ) -> Result<PathBuf, StorageError> {
        ensure_directory(directory)?;
        let filename = format!(
            "{}_{}.{}",
            index,
            sanitize_target(target),
            extension_for(content_type)
        );
        store_with_atomic_creation(directory, &filename, content)
    }
}

/// File extension for a MIME type, `bin` when unknown.
pub fn extension_for(content_type: Option<&str>) -> &'static str {
    let Some(content_type) = content_type else {
        return DEFAULT_EXTENSION;
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase();

    // mime_guess lists extensions alphabetically; prefer the common ones.
    match essence.as_str() {
        "application/json" => return "json",
        "text/html" => return "html",
        "text/plain" => return "txt",
        "application/xml" | "text/xml" => return "xml",
        "text/csv" => return "csv",
        _ => {}
    }

    mime_guess::get_mime_extensions_str(&essence)
        .and_then(|extensions| extensions.first().copied())
        .unwrap_or(DEFAULT_EXTENSION)
}

fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// Creates `filename` exclusively, falling back to `name_2.ext`, `name_3.ext`
/// and so on when it already exists.
fn store_with_atomic_creation(
    dir_path: &Path,
    filename: &str,
    content: &[u8],
) -> Result<PathBuf, StorageError> {
    let (base, ext) = match filename.rfind('.') {
        Some(dot_pos) => (&filename[..dot_pos], Some(&filename[dot_pos..])),
        None => (filename, None),
    };

    for counter in 1..=MAX_COLLISIONS {
        let try_filename = if counter == 1 {
            filename.to_string()
        } else {
            match ext {
                Some(ext) => format!("{}_{}{}", base, counter, ext),
                None => format!("{}_{}", base, counter),
            }
        };

        let try_path = dir_path.join(&try_filename);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&try_path)
        {
            Ok(mut file) => {
                file.write_all(content)
                    .map_err(|e| StorageError::WriteFile {
                        path: try_path.clone(),
                        source: e,
                    })?;
                return Ok(try_path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(StorageError::WriteFile {
                    path: try_path,
                    source: e,
                });
            }
        }
    }

    Err(StorageError::FileExists(dir_path.join(filename)))
}
