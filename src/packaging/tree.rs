//! Staging tree assembly

use std::fs;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use glob::Pattern;

use super::PackageError;
use crate::config::{FileCopy, FileSet};

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PackageError + '_ {
    move |source| PackageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Compile a file set's allow-list
pub fn compile_patterns(include: &[String]) -> Result<Vec<Pattern>, PackageError> {
    include
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|source| PackageError::Pattern {
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}

/// Whether a file name is on the allow-list
pub fn is_included(file_name: &str, patterns: &[Pattern]) -> bool {
    patterns.iter().any(|p| p.matches(file_name))
}

/// All regular files below `dir`, sorted, as paths relative to `dir`
fn walk_files(dir: &Path) -> Result<Vec<PathBuf>, PackageError> {
    fn visit(base: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), PackageError> {
        for entry in fs::read_dir(dir).map_err(io_error(dir))? {
            let entry = entry.map_err(io_error(dir))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(io_error(&path))?;

            if file_type.is_dir() {
                visit(base, &path, out)?;
            } else if file_type.is_file() {
                if let Ok(rel) = path.strip_prefix(base) {
                    out.push(rel.to_path_buf());
                }
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    visit(dir, dir, &mut files)?;
    files.sort();
    Ok(files)
}

/// Copy a file, creating parent directories; permissions are preserved
fn copy_file(from: &Path, to: &Path) -> Result<(), PackageError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    fs::copy(from, to).map_err(io_error(from))?;
    Ok(())
}

/// Copy the allow-listed files of `set`, returning how many were copied
pub fn copy_file_set(root: &Path, stage: &Path, set: &FileSet) -> Result<usize, PackageError> {
    let source = root.join(&set.source);
    if !source.is_dir() {
        return Err(PackageError::MissingSource(source));
    }
    let patterns = compile_patterns(&set.include)?;
    let dest = stage.join(&set.destination);

    let mut copied = 0;
    for rel in walk_files(&source)? {
        let name = rel
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PackageError::NonUtf8Path(source.join(&rel)))?;
        if !is_included(name, &patterns) {
            log::trace!("Skipping {}", rel.display());
            continue;
        }
        copy_file(&source.join(&rel), &dest.join(&rel))?;
        copied += 1;
    }

    log::debug!(
        "Copied {} file(s) from {} to {}",
        copied,
        source.display(),
        dest.display()
    );
    Ok(copied)
}

/// Copy every file of a directory (the DEBIAN control directory)
pub fn copy_dir(from: &Path, to: &Path) -> Result<usize, PackageError> {
    if !from.is_dir() {
        return Err(PackageError::MissingSource(from.to_path_buf()));
    }
    fs::create_dir_all(to).map_err(io_error(to))?;
    fs::set_permissions(to, fs::Permissions::from_mode(0o755)).map_err(io_error(to))?;

    let files = walk_files(from)?;
    for rel in &files {
        copy_file(&from.join(rel), &to.join(rel))?;
    }
    Ok(files.len())
}

/// Copy a single file to its fixed location
pub fn copy_single(root: &Path, stage: &Path, file: &FileCopy) -> Result<(), PackageError> {
    let source = root.join(&file.source);
    if !source.is_file() {
        return Err(PackageError::MissingSource(source));
    }
    let dest = stage.join(&file.destination);
    copy_file(&source, &dest)?;

    if let Some(mode) = file.mode {
        fs::set_permissions(&dest, fs::Permissions::from_mode(mode)).map_err(io_error(&dest))?;
    }
    Ok(())
}

/// First staged file outside `DEBIAN/` that is an ELF executable or library
pub fn find_native_binary(stage: &Path) -> Result<Option<PathBuf>, PackageError> {
    const ELF_MAGIC: &[u8; 4] = b"\x7fELF";

    for rel in walk_files(stage)? {
        if rel.starts_with("DEBIAN") {
            continue;
        }
        let path = stage.join(&rel);
        let mut file = fs::File::open(&path).map_err(io_error(&path))?;
        let mut magic = [0u8; 4];
        match file.read_exact(&mut magic) {
            Ok(()) if &magic == ELF_MAGIC => return Ok(Some(path)),
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {}
            Err(e) => return Err(io_error(&path)(e)),
        }
    }
    Ok(None)
}

/// Render `<version>-<timestamp>`
pub fn version_string(version: &str, now: chrono::DateTime<chrono::Local>) -> String {
    format!("{}-{}", version, now.format("%Y%m%d%H%M%S"))
}

/// Write the version file into the staging tree
pub fn write_version_file(path: &Path, version: &str) -> Result<(), PackageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    fs::write(path, format!("{}\n", version)).map_err(io_error(path))
}
