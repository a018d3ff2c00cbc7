//! External program invocation
//!
//! Every call to aptly, dpkg-sig, rpm, createrepo_c, gpg or git goes through a
//! [`ToolRunner`]. Arguments are passed as a vector, never through a shell, so
//! file names and URLs are not interpolated.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{RepoError, Result};

/// A single external program call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Arguments joined for display in logs and error messages
    pub fn display_args(&self) -> String {
        self.args
            .iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of an invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` if the process was killed by a signal
    pub code: Option<i32>,
    /// stdout followed by stderr
    pub output: String,
}

impl ToolOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            output: output.into(),
        }
    }

    pub fn failure(code: i32, output: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            output: output.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    fn status_text(&self) -> String {
        match self.code {
            Some(code) => format!("exit status: {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs external programs
pub trait ToolRunner: Send + Sync {
    /// Run the program to completion and capture its output.
    ///
    /// A non-zero exit is not an error here; see [`run_checked`].
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput>;
}

/// Run an invocation and turn a non-zero exit into [`RepoError::ToolFailed`]
pub fn run_checked(runner: &dyn ToolRunner, invocation: &Invocation) -> Result<ToolOutput> {
    let out = runner.run(invocation)?;
    if out.is_success() {
        Ok(out)
    } else {
        Err(RepoError::ToolFailed {
            program: invocation.program.clone(),
            args: invocation.display_args(),
            status: out.status_text(),
            output: out.output,
        })
    }
}

/// [`ToolRunner`] backed by `std::process::Command`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
        tracing::debug!(
            program = %invocation.program,
            args = %invocation.display_args(),
            "running external tool"
        );

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }

        let out = cmd.output().map_err(|e| RepoError::ToolUnavailable {
            program: invocation.program.clone(),
            message: e.to_string(),
        })?;

        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));

        Ok(ToolOutput {
            code: out.status.code(),
            output,
        })
    }
}

/// Locate a program on `PATH`
pub fn which(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner used by unit tests across the crate

    use std::sync::Mutex;

    use super::*;

    type Responder = Box<dyn Fn(&Invocation) -> Option<ToolOutput> + Send + Sync>;

    /// Records every invocation and answers from a list of responders.
    ///
    /// The first responder returning `Some` wins; unmatched calls succeed
    /// with empty output.
    #[derive(Default)]
    pub struct ScriptedRunner {
        calls: Mutex<Vec<Invocation>>,
        responders: Mutex<Vec<Responder>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Answer calls whose program and argument line contain `needle`
        pub fn on(self, program: &str, needle: &str, output: ToolOutput) -> Self {
            let program = program.to_string();
            let needle = needle.to_string();
            self.respond(move |inv| {
                (inv.program == program && inv.display_args().contains(&needle))
                    .then(|| output.clone())
            })
        }

        pub fn respond(
            self,
            f: impl Fn(&Invocation) -> Option<ToolOutput> + Send + Sync + 'static,
        ) -> Self {
            self.responders.lock().unwrap().push(Box::new(f));
            self
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }

        /// Each call rendered as `program arg arg ...`
        pub fn command_lines(&self) -> Vec<String> {
            self.calls()
                .iter()
                .map(|c| format!("{} {}", c.program, c.display_args()))
                .collect()
        }
    }

    impl ToolRunner for ScriptedRunner {
        fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
            self.calls.lock().unwrap().push(invocation.clone());
            let responders = self.responders.lock().unwrap();
            Ok(responders
                .iter()
                .find_map(|r| r(invocation))
                .unwrap_or_else(|| ToolOutput::success("")))
        }
    }
}
