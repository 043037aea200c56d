//! The external document compiler.
//!
//! The pipeline only needs `compile(source) -> pdf bytes`; [`TypstCompiler`]
//! provides it by shelling out to the `typst` CLI.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("failed to launch compiler {}: {source}", program.display())]
    Launch {
        program: PathBuf,
        source: std::io::Error,
    },

    #[error("compiler exited with {status} for {}: {stderr}", source_file.display())]
    Failed {
        source_file: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("failed to read compiled output {}: {source}", path.display())]
    Output {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Turns a rendered source file into PDF bytes.
#[async_trait]
pub trait DocumentCompiler: Send + Sync {
    async fn compile(&self, source: &Path) -> Result<Vec<u8>, CompileError>;
}

/// Invokes `typst compile <source> <source>.pdf`.
///
/// The PDF stays next to the source as the local copy of the document.
#[derive(Debug, Clone)]
pub struct TypstCompiler {
    program: PathBuf,
    root: Option<PathBuf>,
    font_paths: Vec<PathBuf>,
}

impl Default for TypstCompiler {
    fn default() -> Self {
        Self::new("typst")
    }
}

impl TypstCompiler {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            root: None,
            font_paths: Vec::new(),
        }
    }

    /// Project root for resolving absolute paths inside templates.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_paths.push(path.into());
        self
    }

    /// Output path for a source file.
    pub fn output_path(source: &Path) -> PathBuf {
        source.with_extension("pdf")
    }

    fn command(&self, source: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("compile");
        if let Some(root) = &self.root {
            cmd.arg("--root").arg(root);
        }
        for font_path in &self.font_paths {
            cmd.arg("--font-path").arg(font_path);
        }
        cmd.arg(source)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl DocumentCompiler for TypstCompiler {
    async fn compile(&self, source: &Path) -> Result<Vec<u8>, CompileError> {
        let output_path = Self::output_path(source);
        let output = self
            .command(source, &output_path)
            .output()
            .await
            .map_err(|source| CompileError::Launch {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(CompileError::Failed {
                source_file: source.to_path_buf(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        tokio::fs::read(&output_path)
            .await
            .map_err(|source| CompileError::Output {
                path: output_path,
                source,
            })
    }
}
