//! External command execution for the source build

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use tracing::info;

/// Lines of tool output kept for error messages
const OUTPUT_TAIL_LINES: usize = 40;

/// A program invocation in a working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I, cwd: &Path) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: cwd.to_path_buf(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub code: Option<i32>,
    /// Last lines of combined stdout/stderr
    pub output_tail: String,
}

impl CommandOutcome {
    pub fn describe_exit(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs external programs; blocking, no timeout
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutcome>;
}

/// Runs commands as child processes, streaming their output to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

fn pump<R: Read>(reader: R, program: &str, tail: &Mutex<VecDeque<String>>) {
    for line in BufReader::new(reader).lines().map_while(Result::ok) {
        info!(target: "mlflow_dbapp::build", "[{}] {}", program, line);
        if let Ok(mut tail) = tail.lock() {
            if tail.len() == OUTPUT_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutcome> {
        info!("Running `{}` in {}", spec, spec.cwd.display());

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let tail = Mutex::new(VecDeque::with_capacity(OUTPUT_TAIL_LINES));

        std::thread::scope(|s| {
            if let Some(out) = stdout {
                s.spawn(|| pump(out, &spec.program, &tail));
            }
            if let Some(err) = stderr {
                s.spawn(|| pump(err, &spec.program, &tail));
            }
        });

        let status = child.wait()?;
        let output_tail = tail
            .into_inner()
            .unwrap_or_default()
            .into_iter()
            .collect::<Vec<_>>()
            .join("\n");

        Ok(CommandOutcome {
            success: status.success(),
            code: status.code(),
            output_tail,
        })
    }
}
