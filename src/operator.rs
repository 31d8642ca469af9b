//! Pipe operator
//!
//! The graph-facing side: a pullable audio source backed by the generator
//! the process output is decoded into, plus the lifecycle calls that start
//! and stop the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::audio::{AudioBlock, Source};
use crate::clock::Clock;
use crate::config::PipeConfig;
use crate::error::{PipeError, Result};
use crate::pipe::{DispositionRegister, PipeFeeder, PipeStats, ProcessHandle, ProcessState, Shared};

/// External process spliced into the graph as an audio transform
pub struct PipeOperator {
    config: PipeConfig,
    shared: Arc<Shared>,
    master: Arc<Clock>,
    slave: Arc<Clock>,
    process: Option<ProcessHandle>,
    /// Sleep requests for the current driver
    register: Arc<DispositionRegister>,
    /// Driver asked to stop but not yet joined
    stopping: Vec<ProcessHandle>,
    /// Pre-roll reached; cleared once the generator runs dry
    ready: AtomicBool,
    finalized: bool,
}

impl PipeOperator {
    /// Create an operator pulling from `upstream`, with its slave clock
    /// registered under `master`
    pub fn new<S>(config: PipeConfig, upstream: S, master: Arc<Clock>) -> Result<Self>
    where
        S: Source + 'static,
    {
        config.validate()?;
        let shared = Arc::new(Shared::new(config.format, Box::new(upstream)));
        let slave = master.register_subclock(format!("pipe({})", config.process));
        Ok(Self {
            config,
            shared,
            master,
            slave,
            process: None,
            register: Arc::new(DispositionRegister::new()),
            stopping: Vec::new(),
            ready: AtomicBool::new(false),
            finalized: false,
        })
    }

    pub fn config(&self) -> &PipeConfig {
        &self.config
    }

    /// The slave clock ticked by out-of-band pulls
    pub fn clock(&self) -> &Arc<Clock> {
        &self.slave
    }

    /// Spawn the process. Does nothing if it is already running.
    pub fn wake_up(&mut self) -> Result<()> {
        if let Some(process) = &self.process {
            if !process.is_finished() {
                return Ok(());
            }
        }
        let runtime = Handle::try_current().map_err(|_| PipeError::NoRuntime)?;

        self.stopping.retain(|process| !process.is_finished());
        let feeder = PipeFeeder::new(&self.config, self.shared.clone(), self.slave.clone());
        self.register = feeder.register();
        self.process = Some(ProcessHandle::spawn(
            &runtime,
            &self.config.process,
            feeder,
            self.config.idle_interval(),
        ));
        tracing::info!("Pipe operator woke up: `{}`", self.config.process);
        Ok(())
    }

    /// Terminate the process without restarting it
    pub fn sleep(&mut self) {
        self.register.request_sleep();
        let Some(mut process) = self.process.take() else {
            tracing::debug!("Pipe operator asleep already");
            return;
        };
        match process.stop() {
            Ok(()) => tracing::info!("Stopping `{}`", process.command()),
            Err(PipeError::NotRunning) => {
                tracing::debug!("`{}` had already stopped", process.command())
            }
            Err(e) => tracing::warn!("Failed to stop `{}`: {}", process.command(), e),
        }
        self.stopping.push(process);
    }

    /// Sleep and wait until the process and its driver are gone
    pub async fn shutdown(&mut self) {
        self.sleep();
        for process in self.stopping.drain(..) {
            process.join().await;
        }
    }

    /// Skip the rest of the current upstream track
    pub fn abort_track(&self) {
        self.shared.upstream.lock().abort_track();
    }

    /// Whether output can be pulled: the pre-roll is buffered, or the
    /// process is gone and only a tail remains
    pub fn is_ready(&self) -> bool {
        let generator = self.shared.generator.lock();
        if self.ready.load(Ordering::Acquire) {
            if generator.is_empty() {
                self.ready.store(false, Ordering::Release);
                return false;
            }
            return true;
        }

        let prerolled = !generator.is_empty()
            && (generator.duration() >= self.config.buffer_duration()
                || !self.shared.state().is_live());
        if prerolled {
            self.ready.store(true, Ordering::Release);
        }
        prerolled
    }

    /// Pull at most `max_frames` frames of output, stopping at a track end
    pub fn get(&mut self, max_frames: usize) -> Option<AudioBlock> {
        if !self.is_ready() {
            return None;
        }
        self.shared.generator.lock().get(max_frames)
    }

    /// Frames buffered and not yet pulled
    pub fn remaining(&self) -> usize {
        self.shared.generator.lock().length()
    }

    pub fn process_state(&self) -> ProcessState {
        self.shared.state()
    }

    /// Get statistics
    pub fn stats(&self) -> PipeStats {
        self.shared.stats()
    }

    /// Stop the process and detach the slave clock from its master
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.sleep();
        self.master.forget_subclock(&self.slave);
        self.finalized = true;
    }
}

impl Drop for PipeOperator {
    fn drop(&mut self) {
        self.finalize();
    }
}
