use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};
use tempfile::TempDir;

use crate::config::Compiler;
use crate::error::CompileError;

/// A compiled document still sitting in its scratch directory. Dropping it
/// without publishing removes everything the compiler produced.
#[derive(Debug)]
pub struct CompiledDocument {
    path: PathBuf,
    _scratch: TempDir,
}

impl CompiledDocument {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the document to `destination`, replacing any previous version
    /// in one step.
    pub fn publish(self, destination: &Path) -> Result<(), CompileError> {
        fs::rename(&self.path, destination)?;
        info!("Wrote {}", destination.display());
        Ok(())
    }
}

/// Compile `source` as `<base_name>.<source_extension>` in a scratch
/// directory inside `out_dir`, so the result can be published with a rename.
/// The scratch directory is a hidden `.texvoice-*` entry; a process killed
/// mid-compile leaves it behind for manual removal.
pub fn compile(
    compiler: &Compiler,
    out_dir: &Path,
    base_name: &str,
    source: &str,
) -> Result<CompiledDocument, CompileError> {
    fs::create_dir_all(out_dir)?;
    let scratch = tempfile::Builder::new()
        .prefix(".texvoice-")
        .tempdir_in(out_dir)?;

    let source_path = scratch
        .path()
        .join(base_name)
        .with_extension(&compiler.source_extension);
    fs::write(&source_path, source)?;

    let mut command = Command::new(&compiler.program);
    command.current_dir(scratch.path()).args(&compiler.args);
    if let Some(flag) = &compiler.output_directory_flag {
        command.arg(flag).arg(scratch.path());
    }
    command.arg(&source_path);

    debug!("Running {:?}", command);
    let status = command.status()?;
    if !status.success() {
        return Err(CompileError::Failed {
            program: compiler.program.clone(),
            status,
        });
    }

    let path = scratch
        .path()
        .join(base_name)
        .with_extension(&compiler.output_extension);
    if !path.exists() {
        return Err(CompileError::MissingOutput {
            program: compiler.program.clone(),
            path,
        });
    }

    Ok(CompiledDocument {
        path,
        _scratch: scratch,
    })
}

#[cfg(all(test, unix))]
pub mod tests {
    use super::*;

    /// Stands in for LaTeX: copies the source to the output name.
    pub fn copying_compiler() -> Compiler {
        Compiler {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "cp \"$0\" \"${0%.tex}.pdf\"".to_string()],
            output_directory_flag: None,
            ..Compiler::default()
        }
    }

    pub fn failing_compiler() -> Compiler {
        Compiler {
            program: "false".to_string(),
            args: Vec::new(),
            output_directory_flag: None,
            ..Compiler::default()
        }
    }

    fn entries(dir: &Path) -> Vec<PathBuf> {
        let mut entries: Vec<PathBuf> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        entries.sort();
        entries
    }

    #[test]
    fn publishes_compiled_document() -> Result<(), CompileError> {
        let dir = tempfile::tempdir()?;
        let document =
            compile(&copying_compiler(), dir.path(), "invoice-2024-0001", "body")?;
        assert_eq!(
            document.path().file_name().unwrap(),
            "invoice-2024-0001.pdf"
        );

        let destination = dir.path().join("invoice-2024-0001.pdf");
        document.publish(&destination)?;

        assert_eq!(fs::read_to_string(&destination)?, "body");
        assert_eq!(entries(dir.path()), vec![destination]);
        Ok(())
    }

    #[test]
    fn failure_leaves_nothing_behind() -> Result<(), CompileError> {
        let dir = tempfile::tempdir()?;
        let previous = dir.path().join("invoice-2024-0001.pdf");
        fs::write(&previous, "old")?;

        let result =
            compile(&failing_compiler(), dir.path(), "invoice-2024-0001", "body");
        match result {
            Err(CompileError::Failed { program, .. }) => assert_eq!(program, "false"),
            other => panic!("expected a failed compile, got {:?}", other),
        }
        assert_eq!(fs::read_to_string(&previous)?, "old");
        assert_eq!(entries(dir.path()), vec![previous]);
        Ok(())
    }

    #[test]
    fn silent_compiler_is_an_error() -> Result<(), CompileError> {
        let dir = tempfile::tempdir()?;
        let compiler = Compiler {
            program: "true".to_string(),
            args: Vec::new(),
            output_directory_flag: None,
            ..Compiler::default()
        };
        assert!(matches!(
            compile(&compiler, dir.path(), "invoice-2024-0001", "body"),
            Err(CompileError::MissingOutput { .. })
        ));
        Ok(())
    }
}
