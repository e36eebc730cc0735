//! External packaging tools (fakeroot, dpkg-deb, scp)

use std::ffi::OsString;
use std::process::Command;

use super::PackageError;

/// Runs an external program to completion
pub trait ToolRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<(), PackageError>;
}

/// Arguments for log messages only; lossy on non-UTF-8
fn command_line(args: &[OsString]) -> String {
    args.iter()
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs tools for real; a non-zero exit is an error
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<(), PackageError> {
        log::info!("Running: {} {}", program, command_line(args));

        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| PackageError::Tool {
                program: program.to_string(),
                reason: e.to_string(),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(PackageError::Tool {
                program: program.to_string(),
                reason: status.to_string(),
            })
        }
    }
}

/// Logs the commands instead of running them
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunRunner;

impl ToolRunner for DryRunRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<(), PackageError> {
        log::info!("Would run: {} {}", program, command_line(args));
        Ok(())
    }
}

impl<T: ToolRunner + ?Sized> ToolRunner for &T {
    fn run(&self, program: &str, args: &[OsString]) -> Result<(), PackageError> {
        (**self).run(program, args)
    }
}

impl<T: ToolRunner + ?Sized> ToolRunner for Box<T> {
    fn run(&self, program: &str, args: &[OsString]) -> Result<(), PackageError> {
        (**self).run(program, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_runner_success_and_failure() {
        assert!(SystemRunner.run("/bin/true", &[]).is_ok());
        assert!(matches!(
            SystemRunner.run("/bin/false", &[]),
            Err(PackageError::Tool { .. })
        ));
        assert!(matches!(
            SystemRunner.run("/nonexistent/dpkg-deb", &[]),
            Err(PackageError::Tool { .. })
        ));
    }

    #[test]
    fn test_dry_run_never_fails() {
        assert!(DryRunRunner.run("/nonexistent/scp", &["a".into()]).is_ok());
    }

    #[test]
    fn test_non_utf8_argument_passed_through() {
        use std::os::unix::ffi::OsStringExt;

        let dir = tempfile::TempDir::new().unwrap();
        let name = OsString::from_vec(b"pjc-mc_\xff.deb".to_vec());
        let path = dir.path().join(&name);

        SystemRunner
            .run("/usr/bin/touch", &[path.clone().into_os_string()])
            .unwrap();
        assert!(path.is_file());
    }
}
