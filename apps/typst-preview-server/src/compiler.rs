//! Typst CLI invocation
//!
//! The editor content is written to a fixed source file, the external
//! `typst` binary is run as `<bin> compile <source> <output>` and the
//! resulting PDF is read back. The source/output pair is shared by every
//! request, so one compile holds the lock from write to read.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::uploads::StagedImage;

/// File the editor content is written to, relative to the work directory
pub const SOURCE_FILE: &str = "input.typst";

/// File the compiler writes the PDF to, relative to the work directory
pub const OUTPUT_FILE: &str = "output.pdf";

/// Placeholder the editor inserts where an uploaded image should go
pub const IMAGE_PLACEHOLDER: &str = "![](data:image/*)";

/// Replace every image placeholder with a reference to `url`.
pub fn substitute_image_placeholder(content: &str, url: &str) -> String {
    content.replace(IMAGE_PLACEHOLDER, &format!("![]({})", url))
}

/// Compiler settings plus the lock guarding the shared source/output files
#[derive(Debug)]
pub struct TypstCompiler {
    program: PathBuf,
    source_path: PathBuf,
    output_path: PathBuf,
    timeout_ms: u64,
    lock: Mutex<()>,
}

impl TypstCompiler {
    pub fn new(program: impl Into<PathBuf>, work_dir: &Path, timeout_ms: u64) -> Self {
        Self {
            program: program.into(),
            source_path: work_dir.join(SOURCE_FILE),
            output_path: work_dir.join(OUTPUT_FILE),
            timeout_ms,
            lock: Mutex::new(()),
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Human-readable command line, used in logs and error messages
    pub fn command_line(&self) -> String {
        format!(
            "{} compile {} {}",
            self.program.display(),
            self.source_path.display(),
            self.output_path.display()
        )
    }

    /// Write `content`, run the compiler and return the PDF bytes.
    ///
    /// The file on disk is always `content` verbatim. When an image was
    /// staged, the placeholder substitution is computed afterwards but not
    /// written back, so it has no effect on the compiled output.
    pub async fn compile(
        &self,
        content: &str,
        image: Option<&StagedImage>,
    ) -> Result<Vec<u8>, ApiError> {
        let _guard = self.lock.lock().await;

        tokio::fs::write(&self.source_path, content).await?;

        if let Some(image) = image {
            let substituted = substitute_image_placeholder(content, &image.url);
            // TODO: confirm whether the substituted source should be written before compiling
            debug!(
                "Computed image substitution for {} ({} bytes, not written)",
                image.url,
                substituted.len()
            );
        }

        self.run().await?;

        let pdf = tokio::fs::read(&self.output_path).await?;
        info!("Compiled {} ({} bytes)", self.output_path.display(), pdf.len());
        Ok(pdf)
    }

    async fn run(&self) -> Result<(), ApiError> {
        let command = self.command_line();
        debug!("Running {}", command);

        let child = Command::new(&self.program)
            .arg("compile")
            .arg(&self.source_path)
            .arg(&self.output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ApiError::Spawn {
                command: command.clone(),
                source,
            })?;

        // Dropping the wait future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(
            Duration::from_millis(self.timeout_ms),
            child.wait_with_output(),
        )
        .await
        {
            Ok(result) => result.map_err(|source| ApiError::Spawn {
                command: command.clone(),
                source,
            })?,
            Err(_elapsed) => {
                warn!("Compiler timed out after {}ms: {}", self.timeout_ms, command);
                return Err(ApiError::Timeout(self.timeout_ms));
            }
        };

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        warn!("{} exited with {}: {}", command, output.status, stderr.trim_end());

        Err(ApiError::CompileFailed {
            command,
            status: output.status,
            stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn substitution_replaces_placeholders() {
        let content = "= Title\n![](data:image/*)\ntext\n![](data:image/*)\n";
        let out = substitute_image_placeholder(content, "file:///tmp/uploads/a.png");
        assert_eq!(
            out,
            "= Title\n![](file:///tmp/uploads/a.png)\ntext\n![](file:///tmp/uploads/a.png)\n"
        );
    }

    #[test]
    fn substitution_without_placeholder_is_identity() {
        let content = "#set page(width: 10cm)\nHello";
        assert_eq!(substitute_image_placeholder(content, "file:///x.png"), content);
    }

    #[test]
    fn paths_are_fixed_inside_work_dir() {
        let compiler = TypstCompiler::new("typst", Path::new("/srv/preview"), 1000);
        assert_eq!(compiler.source_path(), Path::new("/srv/preview/input.typst"));
        assert_eq!(compiler.output_path(), Path::new("/srv/preview/output.pdf"));
        assert_eq!(
            compiler.command_line(),
            "typst compile /srv/preview/input.typst /srv/preview/output.pdf"
        );
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = TypstCompiler::new(
            dir.path().join("no-such-typst"),
            dir.path(),
            1000,
        );

        let err = compiler.compile("Hello", None).await.unwrap_err();

        assert!(matches!(err, ApiError::Spawn { .. }), "got {:?}", err);
        // The source is written before the compiler is looked up
        assert_eq!(
            std::fs::read_to_string(dir.path().join(SOURCE_FILE)).unwrap(),
            "Hello"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_a_compile_failure() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = TypstCompiler::new("false", dir.path(), 5000);

        let err = compiler.compile("Hello", None).await.unwrap_err();

        match err {
            ApiError::CompileFailed { status, .. } => assert_eq!(status.code(), Some(1)),
            other => panic!("expected CompileFailed, got {:?}", other),
        }
    }
}
