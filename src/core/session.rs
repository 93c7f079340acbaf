//! Persistent shell session and the step runner that drives it.
//!
//! All steps of a build run in one shell process so that `cd`, `export`
//! and sourced tool environments carry over from step to step. Each step
//! is submitted as a single line (built by `wrap`) that sources the script
//! and then echoes an empty line plus `<token> <status>`. The output stream
//! is read until the line starting with `<token>`, whose second field is the
//! script's exit status. The session stays open for the next step.
//!
//! The token only ever appears literally in that line and in a per-step
//! EXIT trap, never in a shell variable a step could read. `xtrace` and
//! `verbose` are switched off around the wrapper (and back on for the next
//! script) so tracing steps can't print it either.
//!
//! Output written after a terminator (background jobs) stays in the pipe
//! and is attributed to the next step's read loop.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SessionSettings;
use crate::domain::{CommandDef, ExecutionResult, ExitClass};

use super::emitter::Emitter;
use super::environment::{Environment, Redactor};
use super::error::LauncherError;
use super::script::materialize;
use super::sentinel::{scan_line, CompletionToken, Scan, EXIT_MARKER};

/// Run once when the shell starts: merge stderr into stdout
const BOOTSTRAP: &str = "exec 2>&1";

/// Silently record the `x`/`v` shell options in `__sd_opts` and turn them off
const SAVE_OPTS: &str = concat!(
    "__sd_opts=; ",
    "case $- in *x*) __sd_opts=x;; esac; ",
    "case $- in *v*) __sd_opts=${__sd_opts}v;; esac; ",
    "set +xv",
);

/// How long a closing shell gets before it is killed
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Single-quote `path` for the shell
fn quote(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

/// Single line running `body`, then reporting its status under `token`
///
/// A `body` that exits the shell is reported by the EXIT trap with the
/// `exit` marker instead.
fn wrap(token: &CompletionToken, body: &str) -> String {
    let token = token.as_str();
    format!(
        "trap '{{ __sd_rc=$?; set +xv; }} 2>/dev/null; echo; echo \"{token} $__sd_rc {marker}\"' EXIT; \
         [ -z \"$__sd_opts\" ] || set -$__sd_opts; \
         {body}; \
         {{ __sd_rc=$?; {save}; }} 2>/dev/null; \
         trap - EXIT; echo; echo \"{token} $__sd_rc\"",
        token = token,
        marker = EXIT_MARKER,
        body = body,
        save = SAVE_OPTS,
    )
}

/// One live shell process
pub struct Session {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    /// The shell ran its EXIT trap during the last exchange
    exited: bool,
}

impl Session {
    /// Spawn the shell in `dir` with exactly `env`
    pub async fn start(
        settings: &SessionSettings,
        dir: &Path,
        env: &Environment,
    ) -> Result<Self, String> {
        let mut child = Command::new(&settings.shell)
            .arg("-s")
            .current_dir(dir)
            .env_clear()
            .envs(env.iter())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("cannot start {}: {}", settings.shell.display(), e))?;

        let stdin = child.stdin.take().ok_or("shell stdin was not captured")?;
        let stdout = child.stdout.take().ok_or("shell stdout was not captured")?;

        let mut session = Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            exited: false,
        };
        session
            .submit(BOOTSTRAP)
            .await
            .map_err(|e| format!("initialising shell: {}", e))?;

        debug!(shell = %settings.shell.display(), dir = %dir.display(), "Shell session started");
        Ok(session)
    }

    /// The shell ran its EXIT trap and can't take more input
    pub fn has_exited(&self) -> bool {
        self.exited
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn submit(&mut self, line: &str) -> std::io::Result<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "shell input is closed")
        })?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await
    }

    /// Next line of combined output; `None` at end of stream
    async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        let mut buf = Vec::new();
        if self.stdout.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(None);
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    /// Submit `line` and read until `token`'s terminator, bounded by `limit`
    pub async fn exchange(
        &mut self,
        line: &str,
        token: &CompletionToken,
        emitter: &mut dyn Emitter,
        redactor: &Redactor,
        limit: Duration,
    ) -> Result<ExecutionResult, LauncherError> {
        if let Err(e) = self.submit(line).await {
            return Ok(ExecutionResult::undetermined(format!(
                "writing to shell: {}",
                e
            )));
        }

        match timeout(limit, self.read_until(token, emitter, redactor)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(limit_seconds = limit.as_secs_f64(), "Step timed out, killing shell");
                self.kill().await;
                Ok(ExecutionResult::undetermined(format!(
                    "no exit status after {:?}",
                    limit
                )))
            }
        }
    }

    async fn read_until(
        &mut self,
        token: &CompletionToken,
        emitter: &mut dyn Emitter,
        redactor: &Redactor,
    ) -> Result<ExecutionResult, LauncherError> {
        // An empty line is held back until the next one shows whether it
        // was the separator in front of the terminator
        let mut held_blank = false;

        loop {
            let line = match self.read_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    return Ok(ExecutionResult::undetermined(
                        "shell exited before reporting a status",
                    ))
                }
                Err(e) => {
                    return Ok(ExecutionResult::undetermined(format!(
                        "reading shell output: {}",
                        e
                    )))
                }
            };

            match scan_line(&line, token) {
                Scan::Output(text) => {
                    if std::mem::replace(&mut held_blank, text.is_empty()) {
                        emitter.write_line("").await?;
                    }
                    if !text.is_empty() {
                        emitter.write_line(&redactor.redact(&text)).await?;
                    }
                }
                Scan::Terminator {
                    status,
                    session_exited,
                } => {
                    self.exited = session_exited;
                    return Ok(ExecutionResult::from_status(status));
                }
                Scan::Malformed(_) => {
                    return Ok(ExecutionResult::undetermined("malformed status line"));
                }
            }
        }
    }

    /// Kill the shell immediately
    pub async fn kill(&mut self) {
        self.stdin.take();
        if let Err(e) = self.child.kill().await {
            debug!(error = %e, "Killing shell");
        }
    }

    /// End of transmission: close input and wait briefly for the shell
    pub async fn close(mut self) {
        self.stdin.take();

        match timeout(CLOSE_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "Shell session closed"),
            Ok(Err(e)) => warn!(error = %e, "Waiting for shell to exit"),
            Err(_) => {
                warn!("Shell did not exit after end of input, killing it");
                self.kill().await;
            }
        }
    }
}

/// Runs steps one at a time in a shared [`Session`]
pub struct StepRunner {
    settings: SessionSettings,
    dir: PathBuf,
    env: Environment,
    redactor: Redactor,
    script_path: PathBuf,
    session: Option<Session>,
}

impl StepRunner {
    /// `dir` is the session's working directory; each step is written to
    /// `script_path` before it runs.
    pub fn new(
        settings: SessionSettings,
        dir: PathBuf,
        env: Environment,
        redactor: Redactor,
        script_path: PathBuf,
    ) -> Self {
        Self {
            settings,
            dir,
            env,
            redactor,
            script_path,
            session: None,
        }
    }

    /// Run one step to completion
    ///
    /// `Err` only for failures outside the step's own execution (writing the
    /// script, writing to the emitter). Launch failures and lost statuses come
    /// back as an [`ExecutionResult`] so the caller can still report a code.
    pub async fn run(
        &mut self,
        step: &CommandDef,
        emitter: &mut dyn Emitter,
    ) -> Result<ExecutionResult, LauncherError> {
        materialize(&self.script_path, step).await?;

        if let Err(reason) = self.ensure_session(emitter).await? {
            return Ok(ExecutionResult::launch_failed(reason));
        }

        emitter.announce_step(step).await?;

        let token = CompletionToken::generate();
        let body = format!(". {} </dev/null", quote(&self.script_path));
        let line = format!(
            "export SD_STEP_ID={}; {}",
            Uuid::new_v4(),
            wrap(&token, &body)
        );

        let limit = self.settings.step_timeout;
        let Some(session) = self.session.as_mut() else {
            return Ok(ExecutionResult::launch_failed("shell session is not running"));
        };
        let result = session
            .exchange(&line, &token, emitter, &self.redactor, limit)
            .await?;

        if result.class == ExitClass::Undetermined {
            if let Some(mut session) = self.session.take() {
                session.kill().await;
            }
        }

        debug!(step = %step.name, code = result.exit_code, class = ?result.class, "Step finished");
        Ok(result)
    }

    /// Start (or restart) the shell and source the setup script
    ///
    /// The outer `Result` carries emitter failures, the inner one the reason
    /// a shell could not be launched.
    async fn ensure_session(
        &mut self,
        emitter: &mut dyn Emitter,
    ) -> Result<Result<(), String>, LauncherError> {
        match self.session.take() {
            Some(session) if !session.has_exited() => {
                self.session = Some(session);
                return Ok(Ok(()));
            }
            Some(session) => {
                warn!("Shell exited during the previous step; starting a new session, shell state is lost");
                session.close().await;
            }
            None => {}
        }

        let mut session = match Session::start(&self.settings, &self.dir, &self.env).await {
            Ok(session) => session,
            Err(reason) => return Ok(Err(reason)),
        };

        let setup = &self.settings.setup_script;
        let token = CompletionToken::generate();
        let line = wrap(
            &token,
            &format!("if [ -f {setup} ]; then . {setup} </dev/null; fi", setup = quote(setup)),
        );
        let result = session
            .exchange(&line, &token, emitter, &self.redactor, self.settings.step_timeout)
            .await?;

        if !result.is_success() || session.has_exited() {
            session.kill().await;
            return Ok(Err(format!(
                "setup script {} exited with code {}",
                setup.display(),
                result.exit_code
            )));
        }

        info!(pid = ?session.id(), "Shell session ready");
        self.session = Some(session);
        Ok(Ok(()))
    }

    /// Close the session, if one is running
    pub async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }
}
