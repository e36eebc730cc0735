//! Debian control file parser
//!
//! Reads the first paragraph of a `DEBIAN/control` file:
//!
//! ```text
//! Package: pjc-mc
//! Version: 2.1
//! Architecture: all
//! Description: PJC match control
//!  Continuation lines start with whitespace.
//! ```

use std::path::Path;

use super::PackageError;

/// Fields of a control paragraph, in file order
#[derive(Debug, Clone, Default)]
pub struct ControlFile {
    fields: Vec<(String, String)>,
}

impl ControlFile {
    pub fn load(path: &Path) -> Result<Self, PackageError> {
        let content = std::fs::read_to_string(path).map_err(|source| PackageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, PackageError> {
        let mut fields: Vec<(String, String)> = Vec::new();

        for (idx, line) in content.lines().enumerate() {
            if line.starts_with('#') {
                continue;
            }
            if line.trim().is_empty() {
                // End of the first paragraph
                if fields.is_empty() {
                    continue;
                }
                break;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                let Some((_, value)) = fields.last_mut() else {
                    return Err(PackageError::Malformed {
                        line: idx + 1,
                        content: line.to_string(),
                    });
                };
                value.push('\n');
                value.push_str(line.trim());
                continue;
            }

            let Some((name, value)) = line.split_once(':') else {
                return Err(PackageError::Malformed {
                    line: idx + 1,
                    content: line.to_string(),
                });
            };
            fields.push((name.trim().to_string(), value.trim().to_string()));
        }

        Ok(Self { fields })
    }

    /// Field value; names are case-insensitive
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, name: &'static str) -> Result<&str, PackageError> {
        self.get(name).ok_or(PackageError::MissingField(name))
    }

    pub fn package(&self) -> Result<&str, PackageError> {
        self.require("Package")
    }

    pub fn version(&self) -> Result<&str, PackageError> {
        self.require("Version")
    }

    /// Architecture, defaulting to `all`
    pub fn architecture(&self) -> &str {
        self.get("Architecture").unwrap_or("all")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTROL: &str = "\
Package: pjc-mc
Version: 2.1
Maintainer: PJC <pjc@example.org>
Depends: python (>= 2.7), python-tornado
Description: PJC match control
 Web application for the robotics tournament.
 .
 Runs on the scoring server.
";

    #[test]
    fn test_parse_fields() {
        let control = ControlFile::parse(CONTROL).unwrap();
        assert_eq!(control.package().unwrap(), "pjc-mc");
        assert_eq!(control.version().unwrap(), "2.1");
        assert_eq!(control.architecture(), "all");
        assert_eq!(control.get("depends"), Some("python (>= 2.7), python-tornado"));
    }

    #[test]
    fn test_continuation_lines() {
        let control = ControlFile::parse(CONTROL).unwrap();
        let desc = control.get("Description").unwrap();
        assert!(desc.starts_with("PJC match control\nWeb application"));
        assert!(desc.ends_with("Runs on the scoring server."));
    }

    #[test]
    fn test_only_first_paragraph() {
        let control = ControlFile::parse("\nPackage: a\nVersion: 1\n\nPackage: b\n").unwrap();
        assert_eq!(control.package().unwrap(), "a");
    }

    #[test]
    fn test_missing_version() {
        let control = ControlFile::parse("Package: pjc-mc\n").unwrap();
        assert!(matches!(control.version(), Err(PackageError::MissingField("Version"))));
    }

    #[test]
    fn test_malformed_line() {
        let err = ControlFile::parse("Package: pjc-mc\nno colon here\n").unwrap_err();
        assert!(matches!(err, PackageError::Malformed { line: 2, .. }));
    }

    #[test]
    fn test_leading_continuation_rejected() {
        assert!(ControlFile::parse(" orphan\n").is_err());
    }
}
