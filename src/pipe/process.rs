//! Process substrate
//!
//! Runs the external command and drives a [`PipeHandler`] from a single
//! tokio task. Every hook is called from the `select!` loop below, so hooks
//! never run concurrently. Stdin writes go through a helper task fed by a
//! one-slot channel: holding a permit of that channel is what "stdin is
//! writable" means here.

use bytes::buf::Writer;
use bytes::{BufMut, Bytes, BytesMut};
use std::future::pending;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::constants::CHUNK_SIZE;
use crate::error::PipeError;
use crate::pipe::{Directive, PipeHandler, ProcessExit};

/// Shell the command line is handed to
const SHELL: &str = "sh";

/// Handle to a running process driver
pub struct ProcessHandle {
    command: String,
    kill_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ProcessHandle {
    /// Spawn `command` under `sh -c` and drive `handler` until the handler
    /// declines a restart or a stop is requested
    pub fn spawn<H>(runtime: &Handle, command: &str, handler: H, idle_interval: Duration) -> Self
    where
        H: PipeHandler + 'static,
    {
        Self::spawn_in(runtime, SHELL, command, handler, idle_interval)
    }

    pub(crate) fn spawn_in<H>(
        runtime: &Handle,
        shell: &'static str,
        command: &str,
        handler: H,
        idle_interval: Duration,
    ) -> Self
    where
        H: PipeHandler + 'static,
    {
        let (kill_tx, kill_rx) = oneshot::channel();
        let task = runtime.spawn(drive(
            shell,
            command.to_string(),
            handler,
            idle_interval,
            kill_rx,
        ));
        Self {
            command: command.to_string(),
            kill_tx: Some(kill_tx),
            task,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Ask the driver to terminate the process
    pub fn stop(&mut self) -> Result<(), PipeError> {
        match self.kill_tx.take() {
            Some(tx) => tx.send(()).map_err(|_| PipeError::NotRunning),
            None => Err(PipeError::NotRunning),
        }
    }

    /// Whether the driver has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the driver to exit
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!("Process driver for `{}` failed: {}", self.command, e);
        }
    }
}

fn spawn_child(shell: &str, command: &str) -> Result<Child, PipeError> {
    Command::new(shell)
        .arg("-c")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PipeError::SpawnFailed {
            command: command.to_string(),
            reason: e.to_string(),
        })
}

async fn drive<H: PipeHandler>(
    shell: &'static str,
    command: String,
    mut handler: H,
    idle_interval: Duration,
    mut kill_rx: oneshot::Receiver<()>,
) {
    let mut killed = false;
    loop {
        let exit = match spawn_child(shell, &command) {
            Ok(child) => {
                tracing::info!(pid = ?child.id(), "Started `{}`", command);
                run_session(child, &mut handler, idle_interval, &mut kill_rx, &mut killed).await
            }
            Err(e) => {
                tracing::error!("{}", e);
                ProcessExit::Error(e.to_string())
            }
        };

        let restart = handler.on_stop(exit);
        if !restart || killed {
            break;
        }
        // Restarts are not rate-limited; only let other tasks run.
        tokio::task::yield_now().await;
    }
    tracing::debug!("Process driver for `{}` finished", command);
}

async fn write_stdin(mut stdin: ChildStdin, mut rx: mpsc::Receiver<Bytes>) {
    while let Some(bytes) = rx.recv().await {
        if let Err(e) = stdin.write_all(&bytes).await {
            tracing::debug!("Process stdin closed: {}", e);
            return;
        }
    }
    let _ = stdin.shutdown().await;
}

async fn reserve(tx: Option<mpsc::Sender<Bytes>>) -> Option<mpsc::OwnedPermit<Bytes>> {
    match tx {
        Some(tx) => tx.reserve_owned().await.ok(),
        None => pending().await,
    }
}

async fn wait_until(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}

fn resume_after(directive: Directive, idle: bool, idle_interval: Duration) -> Option<Instant> {
    match directive {
        Directive::Delay(delay) => Some(Instant::now() + delay),
        Directive::Continue if idle => Some(Instant::now() + idle_interval),
        _ => None,
    }
}

/// Where stdin goes after one `on_stdin` call
enum StdinNext {
    /// Keep feeding, possibly after a pause
    Resume(Option<Instant>),
    /// Close the process's stdin
    Close,
}

/// Run `on_stdin` against a reserved slot of the stdin channel
fn feed_stdin<H: PipeHandler>(
    handler: &mut H,
    staging: &mut Writer<BytesMut>,
    permit: Option<mpsc::OwnedPermit<Bytes>>,
    idle_interval: Duration,
) -> StdinNext {
    let Some(permit) = permit else {
        tracing::debug!("Process stopped accepting input");
        return StdinNext::Close;
    };

    let directive = handler.on_stdin(staging);
    let bytes = staging.get_mut().split().freeze();
    let idle = bytes.is_empty();
    if !idle {
        permit.send(bytes);
    }

    if directive == Directive::Stop {
        StdinNext::Close
    } else {
        StdinNext::Resume(resume_after(directive, idle, idle_interval))
    }
}

/// Run one process generation to its exit
async fn run_session<H: PipeHandler>(
    mut child: Child,
    handler: &mut H,
    idle_interval: Duration,
    kill_rx: &mut oneshot::Receiver<()>,
    killed: &mut bool,
) -> ProcessExit {
    let (Some(stdin), Some(mut stdout), Some(mut stderr)) =
        (child.stdin.take(), child.stdout.take(), child.stderr.take())
    else {
        let _ = child.start_kill();
        return ProcessExit::Error(PipeError::MissingPipe("stdio").to_string());
    };

    let (tx, rx) = mpsc::channel::<Bytes>(1);
    let writer = tokio::spawn(write_stdin(stdin, rx));
    let mut staging = BytesMut::with_capacity(CHUNK_SIZE).writer();

    let directive = handler.on_start(&mut staging);
    let header = staging.get_mut().split().freeze();
    let mut feeding = if header.is_empty() || tx.send(header).await.is_ok() {
        Some(tx)
    } else {
        None
    };
    if directive == Directive::Stop {
        feeding = None;
    }

    let mut stdin_resume = resume_after(directive, false, idle_interval);
    let mut stdout_resume = None;
    let mut stdout_open = true;
    let mut stderr_open = true;
    let mut out_buf = vec![0u8; CHUNK_SIZE];
    let mut err_buf = vec![0u8; CHUNK_SIZE];

    while stdout_open || stderr_open {
        tokio::select! {
            permit = reserve(feeding.clone()), if stdin_resume.is_none() => {
                match feed_stdin(handler, &mut staging, permit, idle_interval) {
                    StdinNext::Resume(resume) => stdin_resume = resume,
                    StdinNext::Close => feeding = None,
                }
            }
            _ = wait_until(stdin_resume), if stdin_resume.is_some() => {
                stdin_resume = None;
            }
            read = stdout.read(&mut out_buf), if stdout_open && stdout_resume.is_none() => {
                match read {
                    Ok(0) => stdout_open = false,
                    Ok(n) => {
                        let directive = handler.on_stdout(&mut &out_buf[..n]);
                        stdout_resume = resume_after(directive, false, idle_interval);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to read process stdout: {}", e);
                        stdout_open = false;
                    }
                }
            }
            _ = wait_until(stdout_resume), if stdout_resume.is_some() => {
                stdout_resume = None;
            }
            read = stderr.read(&mut err_buf), if stderr_open => {
                match read {
                    Ok(0) | Err(_) => stderr_open = false,
                    Ok(n) => {
                        handler.on_stderr(&mut &err_buf[..n]);
                    }
                }
            }
            _ = &mut *kill_rx, if !*killed => {
                *killed = true;
                feeding = None;
                if let Err(e) = child.start_kill() {
                    tracing::debug!("Process already gone: {}", e);
                }
            }
        }
    }

    drop(feeding);
    let status = tokio::select! {
        status = child.wait() => status,
        _ = &mut *kill_rx, if !*killed => {
            *killed = true;
            let _ = child.start_kill();
            child.wait().await
        }
    };
    writer.abort();

    match status {
        Ok(status) if status.success() => ProcessExit::Clean,
        Ok(status) => ProcessExit::Error(status.to_string()),
        Err(e) => ProcessExit::Error(e.to_string()),
    }
}
