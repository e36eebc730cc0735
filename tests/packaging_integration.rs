//! Integration tests for the package builder
//!
//! External tools are replaced by a recording runner, so these run without
//! fakeroot, dpkg-deb or scp installed.

use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Mutex;

use pjc_mc::config::{FileCopy, FileSet};
use pjc_mc::packaging::{PackageBuilder, PackageError, ToolRunner};
use pjc_mc::PackageConfig;
use tempfile::TempDir;

#[derive(Default)]
struct RecordingRunner {
    calls: Mutex<Vec<(String, Vec<OsString>)>>,
}

impl ToolRunner for RecordingRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<(), PackageError> {
        self.calls
            .lock()
            .unwrap()
            .push((program.to_string(), args.to_vec()));
        Ok(())
    }
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// A small project tree with one of everything
fn project(root: &Path) -> PackageConfig {
    write(
        &root.join("packaging/DEBIAN/control"),
        "Package: pjc-mc\nVersion: 2.1\nArchitecture: all\nDescription: test\n",
    );
    write(&root.join("packaging/DEBIAN/postinst"), "#!/bin/sh\n");
    write(&root.join("packaging/init.d/pjc-mc"), "#!/bin/sh\n");
    write(&root.join("src/bin/pjc-mc.py"), "print('hi')\n");
    write(&root.join("src/bin/notes.txt"), "not shipped\n");
    write(&root.join("src/lib/pjc/__init__.py"), "");
    write(&root.join("src/lib/pjc/model.pyc"), "bytecode");
    write(&root.join("src/data/teams.csv"), "a,b\n");

    PackageConfig {
        root: root.to_path_buf(),
        file_sets: vec![
            FileSet {
                source: "src/bin".into(),
                destination: "opt/pjc-mc/bin".into(),
                include: vec!["*.py".to_string()],
            },
            FileSet {
                source: "src/lib".into(),
                destination: "opt/pjc-mc/lib".into(),
                include: vec!["*.py".to_string()],
            },
            FileSet {
                source: "src/data".into(),
                destination: "opt/pjc-mc/data".into(),
                include: vec!["*.csv".to_string()],
            },
        ],
        files: vec![FileCopy {
            source: "packaging/init.d/pjc-mc".into(),
            destination: "etc/init.d/pjc-mc".into(),
            mode: Some(0o755),
        }],
        ..PackageConfig::default()
    }
}

#[test]
fn test_update_build_tree_layout() {
    let dir = TempDir::new().unwrap();
    let builder = PackageBuilder::with_runner(project(dir.path()), RecordingRunner::default());

    let tree = builder.update_build_tree().unwrap();
    let stage = dir.path().join("build/pjc-mc");

    assert_eq!(tree.stage, stage);
    assert_eq!(tree.package, "pjc-mc");
    assert_eq!(tree.version, "2.1");

    assert!(stage.join("DEBIAN/control").is_file());
    assert!(stage.join("DEBIAN/postinst").is_file());
    assert!(stage.join("opt/pjc-mc/bin/pjc-mc.py").is_file());
    assert!(stage.join("opt/pjc-mc/lib/pjc/__init__.py").is_file());
    assert!(stage.join("opt/pjc-mc/data/teams.csv").is_file());

    // Allow-list keeps everything else out
    assert!(!stage.join("opt/pjc-mc/bin/notes.txt").exists());
    assert!(!stage.join("opt/pjc-mc/lib/pjc/model.pyc").exists());

    let mode = fs::metadata(stage.join("etc/init.d/pjc-mc")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
}

#[test]
fn test_version_file_has_timestamp() {
    let dir = TempDir::new().unwrap();
    let builder = PackageBuilder::with_runner(project(dir.path()), RecordingRunner::default());

    let tree = builder.update_build_tree().unwrap();

    let content = fs::read_to_string(tree.stage.join("opt/pjc-mc/VERSION")).unwrap();
    let version = content.trim_end();
    assert_eq!(version, tree.build_version);

    let stamp = version.strip_prefix("2.1-").unwrap();
    assert_eq!(stamp.len(), 14);
    assert!(stamp.chars().all(|c| c.is_ascii_digit()));
}

#[test]
fn test_dist_runs_dpkg_deb_under_fakeroot() {
    let dir = TempDir::new().unwrap();
    let runner = RecordingRunner::default();
    let builder = PackageBuilder::with_runner(project(dir.path()), &runner);

    let archive = builder.dist().unwrap();

    assert_eq!(archive, dir.path().join("dist/pjc-mc_2.1_all.deb"));
    assert!(dir.path().join("dist").is_dir());

    let calls = runner.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (program, args) = &calls[0];
    assert_eq!(program, "fakeroot");
    assert_eq!(
        args,
        &vec![
            OsString::from("dpkg-deb"),
            OsString::from("--build"),
            dir.path().join("build/pjc-mc").into_os_string(),
            archive.into_os_string(),
        ]
    );
}

#[test]
fn test_deploy_copies_archive() {
    let dir = TempDir::new().unwrap();
    let runner = RecordingRunner::default();
    let mut config = project(dir.path());
    config.deploy_target = "pi@scoreboard:/tmp/".to_string();
    let builder = PackageBuilder::with_runner(config, &runner);

    let archive = builder.deploy().unwrap();

    let calls = runner.calls.lock().unwrap();
    let programs: Vec<&str> = calls.iter().map(|(p, _)| p.as_str()).collect();
    assert_eq!(programs, vec!["fakeroot", "scp"]);
    assert_eq!(
        calls[1].1,
        vec![archive.into_os_string(), OsString::from("pi@scoreboard:/tmp/")]
    );
}

#[test]
fn test_failing_tool_stops_deploy() {
    struct FailingRunner;

    impl ToolRunner for FailingRunner {
        fn run(&self, program: &str, _args: &[OsString]) -> Result<(), PackageError> {
            Err(PackageError::Tool {
                program: program.to_string(),
                reason: "exit status: 1".to_string(),
            })
        }
    }

    let dir = TempDir::new().unwrap();
    let builder = PackageBuilder::with_runner(project(dir.path()), FailingRunner);

    match builder.deploy() {
        Err(PackageError::Tool { program, .. }) => assert_eq!(program, "fakeroot"),
        other => panic!("expected Tool error, got {:?}", other),
    }
}

#[test]
fn test_clean_removes_build_outputs() {
    let dir = TempDir::new().unwrap();
    let builder = PackageBuilder::with_runner(project(dir.path()), RecordingRunner::default());

    builder.update_build_tree().unwrap();
    write(&dir.path().join("dist/pjc-mc_2.1_all.deb"), "deb");
    write(&dir.path().join("dist/pjc-mc_2.0_all.deb"), "deb");
    write(&dir.path().join("dist/other_1.0_all.deb"), "deb");

    builder.clean().unwrap();

    assert!(!dir.path().join("build").exists());
    assert!(!dir.path().join("dist/pjc-mc_2.1_all.deb").exists());
    assert!(!dir.path().join("dist/pjc-mc_2.0_all.deb").exists());
    assert!(dir.path().join("dist/other_1.0_all.deb").exists());

    // Nothing left to remove
    builder.clean().unwrap();
}

#[test]
fn test_missing_version_field() {
    let dir = TempDir::new().unwrap();
    let config = project(dir.path());
    write(
        &dir.path().join("packaging/DEBIAN/control"),
        "Package: pjc-mc\nArchitecture: all\n",
    );
    let runner = RecordingRunner::default();
    let builder = PackageBuilder::with_runner(config, &runner);

    assert!(matches!(builder.dist(), Err(PackageError::MissingField("Version"))));
    assert!(runner.calls.lock().unwrap().is_empty());
    assert!(!dir.path().join("build").exists());
}

#[test]
fn test_missing_file_set_source() {
    let dir = TempDir::new().unwrap();
    let config = project(dir.path());
    fs::remove_dir_all(dir.path().join("src/data")).unwrap();
    let builder = PackageBuilder::with_runner(config, RecordingRunner::default());

    match builder.update_build_tree() {
        Err(PackageError::MissingSource(path)) => assert!(path.ends_with("src/data")),
        other => panic!("expected MissingSource, got {:?}", other),
    }
}

#[test]
fn test_native_binary_rejected_in_arch_all_package() {
    let dir = TempDir::new().unwrap();
    let mut config = project(dir.path());
    fs::write(dir.path().join("pjc-mc-kiosk"), b"\x7fELF\x02\x01\x01\x00").unwrap();
    config.files.push(FileCopy {
        source: "pjc-mc-kiosk".into(),
        destination: "usr/bin/pjc-mc-kiosk".into(),
        mode: Some(0o755),
    });
    let runner = RecordingRunner::default();
    let builder = PackageBuilder::with_runner(config, &runner);

    match builder.dist() {
        Err(PackageError::NativeBinary(path)) => assert!(path.ends_with("usr/bin/pjc-mc-kiosk")),
        other => panic!("expected NativeBinary, got {:?}", other),
    }
    assert!(runner.calls.lock().unwrap().is_empty());
}

#[test]
fn test_native_binary_allowed_with_target_architecture() {
    let dir = TempDir::new().unwrap();
    let mut config = project(dir.path());
    write(
        &dir.path().join("packaging/DEBIAN/control"),
        "Package: pjc-mc\nVersion: 2.1\nArchitecture: armhf\n",
    );
    fs::write(dir.path().join("pjc-mc-kiosk"), b"\x7fELF\x01\x01\x01\x00").unwrap();
    config.files.push(FileCopy {
        source: "pjc-mc-kiosk".into(),
        destination: "usr/bin/pjc-mc-kiosk".into(),
        mode: Some(0o755),
    });
    let builder = PackageBuilder::with_runner(config, RecordingRunner::default());

    let archive = builder.dist().unwrap();

    assert_eq!(archive, dir.path().join("dist/pjc-mc_2.1_armhf.deb"));
}
