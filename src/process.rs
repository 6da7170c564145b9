//! Subprocess capability: run a program, stream its output lines, report its exit status.

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    /// Shell-style rendering for log and error messages.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        shell_words::join(parts)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Receives output lines as the subprocess produces them.
pub trait OutputSink: Send {
    fn line(&mut self, stream: Stream, line: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

impl OutputSink for CapturedOutput {
    fn line(&mut self, stream: Stream, line: &str) {
        let buf = match stream {
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        };
        buf.push_str(line);
        buf.push('\n');
    }
}

/// Forwards lines to a progress writer when `echo` is set; always logs them.
pub struct WriterSink<'a> {
    out: &'a mut (dyn Write + Send),
    echo: bool,
}

impl<'a> WriterSink<'a> {
    pub fn new(out: &'a mut (dyn Write + Send), echo: bool) -> Self {
        Self { out, echo }
    }
}

impl OutputSink for WriterSink<'_> {
    fn line(&mut self, _stream: Stream, line: &str) {
        debug!("{}", line);
        if self.echo {
            if let Err(e) = writeln!(self.out, "{line}") {
                warn!("Stopped echoing subprocess output: {}", e);
                self.echo = false;
            }
        }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Resolves `program` on the execution path.
    fn locate(&self, program: &str) -> Option<PathBuf>;

    /// Runs `spec` to completion, handing each output line to `sink`.
    async fn run(&self, spec: &CommandSpec, sink: &mut dyn OutputSink)
        -> std::io::Result<ExitStatus>;

    /// Runs `spec` and collects its output.
    async fn capture(&self, spec: &CommandSpec) -> std::io::Result<(ExitStatus, CapturedOutput)> {
        let mut captured = CapturedOutput::default();
        let status = self.run(spec, &mut captured).await?;
        Ok((status, captured))
    }
}

/// Spawns real processes through `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }

    async fn run(
        &self,
        spec: &CommandSpec,
        sink: &mut dyn OutputSink,
    ) -> std::io::Result<ExitStatus> {
        debug!("Running command: {}", spec.display());

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &spec.envs {
            cmd.env(key, value);
        }
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("stderr was not captured"))?;

        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut out_done = false;
        let mut err_done = false;

        while !(out_done && err_done) {
            tokio::select! {
                line = out_lines.next_line(), if !out_done => match line? {
                    Some(line) => sink.line(Stream::Stdout, &line),
                    None => out_done = true,
                },
                line = err_lines.next_line(), if !err_done => match line? {
                    Some(line) => sink.line(Stream::Stderr, &line),
                    None => err_done = true,
                },
            }
        }

        let status = child.wait().await?;
        debug!("Command `{}` exited with {:?}", spec.program, status.code());
        Ok(ExitStatus {
            code: status.code(),
        })
    }
}
