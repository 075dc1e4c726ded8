//! Subprocess execution capability (DESIGN NOTES §9): the coordinator
//! only ever sees `(stdout, stderr, exit_code)` from a script artifact;
//! it never forks or manages a child process directly.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{Error, Result};
use crate::manifest::Artifact;

#[derive(Debug)]
pub struct SubprocessOutcome {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl SubprocessOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

pub trait SubprocessRunner: Send + Sync {
    /// Runs `script_path` (a file already written to disk with the
    /// artifact's payload) with `args`, returning once it exits.
    fn run(&self, script_path: &Path, args: &[String]) -> Result<SubprocessOutcome>;
}

/// The real runner: executes the script directly. The script file must
/// already be executable (the coordinator sets that bit after writing
/// the artifact's payload to a temp file).
pub struct ProcessSubprocessRunner;

impl SubprocessRunner for ProcessSubprocessRunner {
    fn run(&self, script_path: &Path, args: &[String]) -> Result<SubprocessOutcome> {
        let output = Command::new(script_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(Error::Io)?;

        Ok(SubprocessOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Phase argument a script artifact is invoked with, passed to the
/// script as its first argument (matching the convention scripts in the
/// original project rely on).
pub fn phase_arg(phase: crate::handler::ScriptPhase) -> &'static str {
    match phase {
        crate::handler::ScriptPhase::Pre => "preinst",
        crate::handler::ScriptPhase::Post => "postinst",
        crate::handler::ScriptPhase::Failure => "failure",
    }
}

/// Writes a script artifact's buffered payload to an executable temp
/// file under `dir`, named after the artifact.
pub fn write_script_file(dir: &Path, artifact: &Artifact, payload: &[u8]) -> Result<std::path::PathBuf> {
    let path = dir.join(&artifact.source_filename);
    let mut file = std::fs::File::create(&path).map_err(|err| Error::OpenFile(path.clone(), err))?;
    file.write_all(payload)?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&path)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms)?;
    }

    Ok(path)
}
