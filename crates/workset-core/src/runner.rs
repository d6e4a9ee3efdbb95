use crate::error::Error;
use crate::locks::LockRegistry;
use crate::progress::{ProgressEvent, StageTracker, parse_line};
use std::collections::VecDeque;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// How many raw stderr records are kept for the failure log.
const OUTPUT_TAIL: usize = 20;

/// Cooperative cancellation flag shared between the caller and every
/// running pipeline. Cancelling stops new subprocess launches and kills
/// subprocesses already running; directory locks are released through the
/// normal join path either way.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Launches the version-control subprocess for one operation and turns its
/// diagnostic output into a stream of [`ProgressEvent`]s. All knowledge of
/// the tool's textual protocol lives here and in [`crate::progress`].
#[derive(Clone)]
pub struct CommandRunner {
    program: String,
    locks: Arc<LockRegistry>,
    cancel: CancelToken,
    lock_timeout: Option<Duration>,
}

impl CommandRunner {
    pub fn new(
        program: impl Into<String>,
        locks: Arc<LockRegistry>,
        cancel: CancelToken,
        lock_timeout: Option<Duration>,
    ) -> Self {
        Self {
            program: program.into(),
            locks,
            cancel,
            lock_timeout,
        }
    }

    /// Launch `<program> <args>` and stream parsed progress events from its
    /// stderr. `workdir: None` runs unlocked, for bootstrap operations whose
    /// target directory does not exist yet. The directory lock is held until
    /// the output is fully drained and the child has exited; a non-zero exit
    /// is logged with the output tail and simply closes the stream.
    pub fn run(&self, repo: &str, workdir: Option<&Path>, args: &[&str]) -> Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel();
        let lock = workdir.map(|dir| self.locks.handle_for(dir));
        let invocation = Invocation {
            repo: repo.to_string(),
            program: self.program.clone(),
            args: args.iter().map(|s| s.to_string()).collect(),
            cwd: workdir.map(Path::to_path_buf),
        };
        let cancel = self.cancel.clone();
        let lock_timeout = self.lock_timeout;
        thread::spawn(move || {
            let _guard = match lock.as_ref() {
                Some(handle) => match lock_timeout {
                    Some(wait) => match handle.lock_timeout(wait) {
                        Ok(guard) => Some(guard),
                        Err(err) => {
                            warn!(
                                repo = %invocation.repo,
                                command = %invocation.render(),
                                error = %err,
                                "skipping invocation"
                            );
                            return;
                        }
                    },
                    None => Some(handle.lock()),
                },
                None => None,
            };
            run_locked(&invocation, &cancel, tx);
        });
        rx
    }

    /// Run to completion and capture trimmed stdout. Queries and short
    /// mutations that stream nothing useful go through here; the directory
    /// lock still serializes them against streaming operations on the same
    /// directory.
    pub fn run_capture(&self, repo: &str, workdir: &Path, args: &[&str]) -> Result<String, Error> {
        let op = args.first().copied().unwrap_or(self.program.as_str());
        let handle = self.locks.handle_for(workdir);
        let _guard = match self.lock_timeout {
            Some(wait) => handle.lock_timeout(wait)?,
            None => handle.lock(),
        };
        if self.cancel.is_cancelled() {
            return Err(Error::Subprocess {
                op: op.to_string(),
                repo: repo.to_string(),
                detail: "cancelled".to_string(),
            });
        }
        let output = Command::new(&self.program)
            .args(args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| Error::Subprocess {
                op: op.to_string(),
                repo: repo.to_string(),
                detail: err.to_string(),
            })?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(Error::Subprocess {
                op: op.to_string(),
                repo: repo.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

struct Invocation {
    repo: String,
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl Invocation {
    fn render(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }
}

fn run_locked(invocation: &Invocation, cancel: &CancelToken, tx: Sender<ProgressEvent>) {
    if cancel.is_cancelled() {
        debug!(repo = %invocation.repo, "cancelled before launch");
        return;
    }
    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    if let Some(dir) = invocation.cwd.as_deref() {
        command.current_dir(dir);
    }
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(
                repo = %invocation.repo,
                command = %invocation.render(),
                error = %err,
                "failed to spawn subprocess"
            );
            return;
        }
    };
    let Some(stderr) = child.stderr.take() else {
        let _ = child.wait();
        return;
    };

    // Reader and waiter are paired: the lock held by our caller is only
    // released once the output is drained AND the process has exited.
    let repo = invocation.repo.clone();
    let reader = thread::spawn(move || read_progress(stderr, &repo, tx));
    let status = wait_with_cancel(&mut child, cancel);
    let tail = reader.join().unwrap_or_default();

    match status {
        Ok(status) if status.success() => {
            debug!(repo = %invocation.repo, command = %invocation.render(), "subprocess finished");
        }
        Ok(status) => {
            warn!(
                repo = %invocation.repo,
                command = %invocation.render(),
                code = ?status.code(),
                output = %tail.join(" | "),
                "subprocess exited with failure"
            );
        }
        Err(err) => {
            warn!(
                repo = %invocation.repo,
                command = %invocation.render(),
                error = %err,
                "failed waiting for subprocess"
            );
        }
    }
}

fn wait_with_cancel(child: &mut Child, cancel: &CancelToken) -> std::io::Result<ExitStatus> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if cancel.is_cancelled() {
            let _ = child.kill();
            return child.wait();
        }
        thread::sleep(Duration::from_millis(25));
    }
}

/// Drain the diagnostic channel, splitting records on `\n` OR `\r` (the tool
/// rewrites progress lines in place with bare carriage returns). Returns the
/// tail of raw records for failure logging.
fn read_progress(stderr: ChildStderr, repo: &str, tx: Sender<ProgressEvent>) -> Vec<String> {
    let mut state = ReaderState {
        repo,
        tx,
        tracker: StageTracker::default(),
        tail: VecDeque::new(),
        receiver_gone: false,
    };
    let mut record = Vec::new();
    let mut stderr = stderr;
    let mut buf = [0u8; 4096];
    loop {
        let n = match stderr.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };
        for &byte in &buf[..n] {
            if byte == b'\n' || byte == b'\r' {
                state.flush(&mut record);
            } else {
                record.push(byte);
            }
        }
    }
    state.flush(&mut record);
    state.tail.into_iter().collect()
}

struct ReaderState<'a> {
    repo: &'a str,
    tx: Sender<ProgressEvent>,
    tracker: StageTracker,
    tail: VecDeque<String>,
    receiver_gone: bool,
}

impl ReaderState<'_> {
    fn flush(&mut self, record: &mut Vec<u8>) {
        if record.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(record).into_owned();
        record.clear();
        if self.tail.len() == OUTPUT_TAIL {
            self.tail.pop_front();
        }
        self.tail.push_back(line.clone());
        let Some(parsed) = parse_line(&line) else {
            return;
        };
        let event = self.tracker.observe(self.repo, parsed);
        // keep draining even when the consumer is gone so the subprocess
        // can exit and the directory lock gets released
        if !self.receiver_gone && self.tx.send(event).is_err() {
            self.receiver_gone = true;
        }
    }
}
