//! Content-type verification for downloaded PDFs.
//!
//! Files named `*.pdf` whose detected type is not `application/pdf` lose
//! their extension. Nothing is deleted; a second run leaves renamed files
//! alone because they no longer match the `.pdf` filter.

use crate::error::{Result, ScholarError};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// MIME type a verified file must report.
pub const PDF_MIME: &str = "application/pdf";

/// Reports the content type of a file on disk.
pub trait MimeDetector {
    fn detect(&self, path: &Path) -> Result<String>;
}

/// Asks the system `file` utility (`file --mime-type -b`).
#[derive(Debug, Default, Clone, Copy)]
pub struct FileCommandDetector;

impl MimeDetector for FileCommandDetector {
    fn detect(&self, path: &Path) -> Result<String> {
        let output = Command::new("file")
            .arg("--mime-type")
            .arg("-b")
            .arg(path)
            .output()?;

        if !output.status.success() {
            return Err(ScholarError::Parse(format!(
                "file command failed for {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Outcome of a verification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifySummary {
    pub valid: Vec<PathBuf>,
    /// `(old, new)` path pairs.
    pub renamed: Vec<(PathBuf, PathBuf)>,
    pub skipped: Vec<PathBuf>,
}

/// Check every `*.pdf` file in `dir` and strip the extension from impostors.
pub fn verify_directory(dir: &Path, detector: &dyn MimeDetector) -> Result<VerifySummary> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    entries.sort();

    info!(count = entries.len(), dir = %dir.display(), "Found files");

    let mut summary = VerifySummary::default();

    for path in entries {
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            summary.skipped.push(path);
            continue;
        };

        if !name.to_ascii_lowercase().ends_with(".pdf") {
            debug!(file = %name, "Skipping non-PDF file");
            summary.skipped.push(path);
            continue;
        }

        let mime = match detector.detect(&path) {
            Ok(mime) => mime,
            Err(e) => {
                warn!(file = %name, error = %e, "Could not detect content type");
                summary.skipped.push(path);
                continue;
            }
        };

        if mime == PDF_MIME {
            println!("✅ Valid PDF: {}", name);
            summary.valid.push(path);
        } else {
            let new_name = &name[..name.len() - 4];
            if new_name.is_empty() {
                warn!(file = %name, detected = %mime, "Not a PDF and no name left after stripping the extension");
                summary.skipped.push(path);
                continue;
            }
            let new_path = path.with_file_name(new_name);
            if let Err(e) = std::fs::rename(&path, &new_path) {
                warn!(file = %name, error = %e, "Rename failed");
                summary.skipped.push(path);
                continue;
            }
            println!("❌ Not a PDF: {} → Renamed to {}", name, new_name);
            info!(file = %name, detected = %mime, "Renamed mistyped download");
            summary.renamed.push((path, new_path));
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Sniffs the `%PDF-` header, standing in for the system detector.
    struct HeaderSniffer;

    impl MimeDetector for HeaderSniffer {
        fn detect(&self, path: &Path) -> Result<String> {
            let bytes = std::fs::read(path)?;
            Ok(if bytes.starts_with(b"%PDF-") {
                PDF_MIME.to_string()
            } else {
                "text/html".to_string()
            })
        }
    }

    #[test]
    fn test_mistyped_file_loses_extension() -> Result<()> {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join("good.pdf"), b"%PDF-1.4\n%%EOF\n")?;
        std::fs::write(dir.path().join("paywall.pdf"), b"<html>login</html>")?;
        std::fs::write(dir.path().join("readme.txt"), b"hello")?;
        std::fs::create_dir(dir.path().join("sub.pdf"))?;

        let summary = verify_directory(dir.path(), &HeaderSniffer)?;

        assert_eq!(summary.valid, vec![dir.path().join("good.pdf")]);
        assert_eq!(
            summary.renamed,
            vec![(dir.path().join("paywall.pdf"), dir.path().join("paywall"))]
        );
        assert!(dir.path().join("good.pdf").exists());
        assert!(dir.path().join("paywall").exists());
        assert!(!dir.path().join("paywall.pdf").exists());
        assert!(dir.path().join("sub.pdf").is_dir());
        Ok(())
    }

    #[test]
    fn test_bare_extension_skipped_and_pass_continues() -> Result<()> {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join(".pdf"), b"<html>blocked</html>")?;
        std::fs::write(dir.path().join("z_later.pdf"), b"<html>login</html>")?;

        let summary = verify_directory(dir.path(), &HeaderSniffer)?;

        assert_eq!(summary.skipped, vec![dir.path().join(".pdf")]);
        assert_eq!(
            summary.renamed,
            vec![(dir.path().join("z_later.pdf"), dir.path().join("z_later"))]
        );
        assert!(dir.path().join(".pdf").exists());
        Ok(())
    }

    #[test]
    fn test_failed_rename_skips_file() -> Result<()> {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join("a.pdf"), b"<html></html>")?;
        std::fs::write(dir.path().join("b.pdf"), b"<html></html>")?;
        // A non-empty directory at the target name makes the rename fail.
        std::fs::create_dir(dir.path().join("a"))?;
        std::fs::write(dir.path().join("a").join("keep"), b"x")?;

        let summary = verify_directory(dir.path(), &HeaderSniffer)?;

        assert_eq!(summary.skipped, vec![dir.path().join("a.pdf")]);
        assert_eq!(
            summary.renamed,
            vec![(dir.path().join("b.pdf"), dir.path().join("b"))]
        );
        assert!(dir.path().join("a.pdf").exists());
        Ok(())
    }

    #[test]
    fn test_second_pass_is_idempotent() -> Result<()> {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join("fake.PDF"), b"not a pdf")?;

        let first = verify_directory(dir.path(), &HeaderSniffer)?;
        assert_eq!(first.renamed.len(), 1);
        assert!(dir.path().join("fake").exists());

        let second = verify_directory(dir.path(), &HeaderSniffer)?;
        assert!(second.renamed.is_empty());
        assert!(second.valid.is_empty());
        assert_eq!(second.skipped, vec![dir.path().join("fake")]);
        Ok(())
    }
}
