//! Debian package builder
//!
//! Targets, each running the previous one first:
//!
//! ```text
//!   update_build_tree ──► dist ──► deploy
//!   (staging tree)        (.deb)   (scp)
//! ```
//!
//! `clean` removes the staging trees and built archives. The first failing
//! step stops the target; nothing is rolled back.

mod control;
mod tools;
mod tree;

pub use control::ControlFile;
pub use tools::{DryRunRunner, SystemRunner, ToolRunner};
pub use tree::{compile_patterns, is_included, version_string};

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::PackageConfig;

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Control file has no {0} field")]
    MissingField(&'static str),

    #[error("Malformed control file line {line}: {content:?}")]
    Malformed { line: usize, content: String },

    #[error("Invalid pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },

    #[error("Missing source: {0}")]
    MissingSource(PathBuf),

    #[error("{program} failed: {reason}")]
    Tool { program: String, reason: String },

    #[error("Path is not valid UTF-8: {0:?}")]
    NonUtf8Path(PathBuf),

    #[error("{0} is a native binary but the package is Architecture: all")]
    NativeBinary(PathBuf),
}

/// Result of assembling the staging tree
#[derive(Debug, Clone)]
pub struct BuildTree {
    pub package: String,
    pub version: String,
    /// Contents of the rendered version file
    pub build_version: String,
    pub stage: PathBuf,
    pub files: usize,
}

pub struct PackageBuilder<R = SystemRunner> {
    config: PackageConfig,
    runner: R,
}

impl PackageBuilder {
    pub fn new(config: PackageConfig) -> Self {
        Self::with_runner(config, SystemRunner)
    }
}

impl<R: ToolRunner> PackageBuilder<R> {
    pub fn with_runner(config: PackageConfig, runner: R) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &PackageConfig {
        &self.config
    }

    pub fn control(&self) -> Result<ControlFile, PackageError> {
        ControlFile::load(&self.config.resolve(&self.config.control_dir).join("control"))
    }

    /// Staging tree for a package
    pub fn stage_dir(&self, package: &str) -> PathBuf {
        self.config.resolve(&self.config.build_dir).join(package)
    }

    /// Archive path, `<output>/<package>_<version>_<arch>.deb`
    pub fn archive_path(&self, control: &ControlFile) -> Result<PathBuf, PackageError> {
        let name = format!(
            "{}_{}_{}.deb",
            control.package()?,
            control.version()?,
            control.architecture()
        );
        Ok(self.config.resolve(&self.config.output_dir).join(name))
    }

    /// Assemble the staging tree mirroring the install layout
    pub fn update_build_tree(&self) -> Result<BuildTree, PackageError> {
        let control = self.control()?;
        let package = control.package()?.to_string();
        let version = control.version()?.to_string();
        let stage = self.stage_dir(&package);
        let root = &self.config.root;

        log::info!("Assembling {} {} in {}", package, version, stage.display());

        let control_dir = self.config.resolve(&self.config.control_dir);
        let mut files = tree::copy_dir(&control_dir, &stage.join("DEBIAN"))?;

        for set in &self.config.file_sets {
            files += tree::copy_file_set(root, &stage, set)?;
        }
        for file in &self.config.files {
            tree::copy_single(root, &stage, file)?;
            files += 1;
        }

        let build_version = version_string(&version, chrono::Local::now());
        tree::write_version_file(&stage.join(&self.config.version_file), &build_version)?;
        files += 1;

        if control.architecture() == "all" {
            if let Some(binary) = tree::find_native_binary(&stage)? {
                return Err(PackageError::NativeBinary(binary));
            }
        }

        log::info!("Staged {} file(s), build {}", files, build_version);
        Ok(BuildTree {
            package,
            version,
            build_version,
            stage,
            files,
        })
    }

    /// Build the `.deb`, returning its path
    pub fn dist(&self) -> Result<PathBuf, PackageError> {
        let tree = self.update_build_tree()?;
        let archive = self.archive_path(&self.control()?)?;

        if let Some(parent) = archive.parent() {
            std::fs::create_dir_all(parent).map_err(|source| PackageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        self.runner.run(
            "fakeroot",
            &[
                OsString::from("dpkg-deb"),
                OsString::from("--build"),
                tree.stage.into_os_string(),
                archive.clone().into_os_string(),
            ],
        )?;

        log::info!("Built {}", archive.display());
        Ok(archive)
    }

    /// Build, then copy the archive to the deploy target
    pub fn deploy(&self) -> Result<PathBuf, PackageError> {
        let archive = self.dist()?;
        self.runner.run(
            "scp",
            &[
                archive.clone().into_os_string(),
                OsString::from(&self.config.deploy_target),
            ],
        )?;
        log::info!("Deployed {} to {}", archive.display(), self.config.deploy_target);
        Ok(archive)
    }

    /// Remove the staging trees and built archives; missing ones are fine
    pub fn clean(&self) -> Result<(), PackageError> {
        let build_dir = self.config.resolve(&self.config.build_dir);
        remove_all(&build_dir)?;

        let package = match self.control() {
            Ok(control) => control.package()?.to_string(),
            Err(e) => {
                log::warn!("Not removing archives: {}", e);
                return Ok(());
            }
        };

        let output_dir = self.config.resolve(&self.config.output_dir);
        let output = output_dir
            .to_str()
            .ok_or_else(|| PackageError::NonUtf8Path(output_dir.clone()))?;
        let pattern = format!(
            "{}/{}_*.deb",
            glob::Pattern::escape(output),
            glob::Pattern::escape(&package)
        );
        let archives = glob::glob(&pattern).map_err(|source| PackageError::Pattern {
            pattern: pattern.clone(),
            source,
        })?;

        for archive in archives.flatten() {
            log::info!("Removing {}", archive.display());
            std::fs::remove_file(&archive).map_err(|source| PackageError::Io {
                path: archive.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

fn remove_all(path: &Path) -> Result<(), PackageError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            log::info!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(PackageError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
