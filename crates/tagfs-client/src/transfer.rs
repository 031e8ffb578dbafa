//! Local file upload and preview download.

use std::fs;
use std::path::{Path, PathBuf};
use tagfs_core::reconciler::{Preview, UploadFile};
use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("{0} has no usable file name")]
    NoName(PathBuf),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> TransferError + '_ {
    move |source| TransferError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Collect a local file or folder for upload.
///
/// A file uploads under its own name. A folder uploads every regular file
/// beneath it as `<folder name>/<relative path>`. Files that are not valid
/// UTF-8 are skipped.
pub fn collect_upload(path: &Path) -> Result<Vec<UploadFile>, TransferError> {
    let metadata = fs::metadata(path).map_err(io_error(path))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TransferError::NoName(path.to_path_buf()))?;

    if metadata.is_file() {
        return Ok(read_text(path)?
            .map(|data| UploadFile {
                path: name.to_string(),
                data,
            })
            .into_iter()
            .collect());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|source| TransferError::Walk {
            path: path.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(path) else {
            continue;
        };
        let Some(segments) = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()
        else {
            warn!("Skipping {}: path is not valid UTF-8", entry.path().display());
            continue;
        };

        if let Some(data) = read_text(entry.path())? {
            files.push(UploadFile {
                path: format!("{}/{}", name, segments.join("/")),
                data,
            });
        }
    }
    Ok(files)
}

/// Read a file as text, or `None` (with a warning) if it is not UTF-8.
fn read_text(path: &Path) -> Result<Option<String>, TransferError> {
    let bytes = fs::read(path).map_err(io_error(path))?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(Some(text)),
        Err(_) => {
            warn!("Skipping {}: not a text file", path.display());
            Ok(None)
        }
    }
}

/// Write the previewed record into `dir` under its file name.
pub fn save_preview(preview: &Preview, dir: &Path) -> Result<PathBuf, TransferError> {
    let name = preview.file_name();
    if name.is_empty() || name == "." || name == ".." {
        return Err(TransferError::NoName(PathBuf::from(&preview.name)));
    }
    fs::create_dir_all(dir).map_err(io_error(dir))?;
    let target = dir.join(name);
    fs::write(&target, &preview.content).map_err(io_error(&target))?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_single_file_uses_file_name() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("notes.md");
        fs::write(&file, "hello").unwrap();

        let files = collect_upload(&file).unwrap();
        assert_eq!(
            files,
            vec![UploadFile {
                path: "notes.md".into(),
                data: "hello".into()
            }]
        );
    }

    #[test]
    fn test_folder_prefixes_relative_paths() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("project");
        fs::create_dir_all(root.join("src/deep")).unwrap();
        fs::write(root.join("README.md"), "readme").unwrap();
        fs::write(root.join("src/deep/lib.rs"), "code").unwrap();

        let paths: Vec<String> = collect_upload(&root)
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(paths, vec!["project/README.md", "project/src/deep/lib.rs"]);
    }

    #[test]
    fn test_binary_files_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("mixed");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.txt"), "text").unwrap();
        fs::write(root.join("b.bin"), [0xff, 0xfe, 0x00]).unwrap();

        let files = collect_upload(&root).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "mixed/a.txt");
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            collect_upload(&tmp.path().join("nope")),
            Err(TransferError::Io { .. })
        ));
    }

    #[test]
    fn test_save_preview_uses_last_segment() {
        let tmp = TempDir::new().unwrap();
        let preview = Preview {
            name: "docs/deep/b.txt".into(),
            content: "body".into(),
            source: None,
            predictions: Vec::new(),
        };
        let target = save_preview(&preview, &tmp.path().join("out")).unwrap();
        assert_eq!(target.file_name().unwrap(), "b.txt");
        assert_eq!(fs::read_to_string(target).unwrap(), "body");
    }
}
