//! The operator's side of the process contract

use std::io::{Read, Write};
use std::sync::Arc;

use crate::clock::Clock;
use crate::codec::{ChunkQueue, PcmDecoder, PcmEncoder};
use crate::config::PipeConfig;
use crate::constants::CHUNK_SIZE;
use crate::pipe::backpressure::Backpressure;
use crate::pipe::restart::{decide, DispositionRegister, ProcessState, RestartPolicy};
use crate::pipe::shared::Shared;
use crate::pipe::{Directive, PipeHandler, ProcessExit};

/// Frames upstream audio into the process and decodes what comes back.
///
/// Each feeder drives one `wake_up` worth of processes. It owns its
/// disposition register, and its state updates stop applying once a newer
/// feeder has taken over the shared state.
pub struct PipeFeeder {
    shared: Arc<Shared>,
    register: Arc<DispositionRegister>,
    epoch: u64,
    queue: ChunkQueue,
    encoder: PcmEncoder,
    decoder: PcmDecoder,
    backpressure: Backpressure,
    policy: RestartPolicy,
    slave: Arc<Clock>,
}

impl PipeFeeder {
    pub fn new(config: &PipeConfig, shared: Arc<Shared>, slave: Arc<Clock>) -> Self {
        let epoch = shared.begin_epoch();
        Self {
            shared,
            register: Arc::new(DispositionRegister::new()),
            epoch,
            queue: ChunkQueue::new(),
            encoder: PcmEncoder::new(config.format),
            decoder: PcmDecoder::new(config.format),
            backpressure: Backpressure::new(config.max_duration(), config.format.sample_rate),
            policy: RestartPolicy {
                restart: config.restart,
                restart_on_error: config.restart_on_error,
            },
            slave,
        }
    }

    /// Register the operator uses to request a sleep
    pub fn register(&self) -> Arc<DispositionRegister> {
        self.register.clone()
    }

    fn set_state(&self, state: ProcessState) {
        if !self.shared.set_state_for(self.epoch, state) {
            tracing::debug!(epoch = self.epoch, ?state, "Stale driver left state alone");
        }
    }

    /// Chunks awaiting delivery
    pub fn queued_chunks(&self) -> usize {
        self.queue.len()
    }

    /// Pull one block out-of-band and frame it. Returns false if upstream
    /// had nothing to give.
    fn refill(&mut self) -> bool {
        let block = {
            let mut upstream = self.shared.upstream.lock();
            if !upstream.is_ready() {
                return false;
            }
            let block = upstream.pull_block();
            self.slave.end_tick();
            upstream.after_output();
            block
        };
        let Some(block) = block else {
            return false;
        };

        match self.encoder.frame(&block) {
            Ok(chunks) => {
                self.queue.extend(chunks);
                true
            }
            Err(e) => {
                tracing::warn!("Dropping upstream block: {}", e);
                false
            }
        }
    }
}

impl PipeHandler for PipeFeeder {
    fn on_start(&mut self, stdin: &mut dyn Write) -> Directive {
        let dropped = self.queue.discard_in_flight();
        if dropped > 0 {
            tracing::debug!("Discarded {} undelivered bytes of the previous process", dropped);
        }
        self.register.reset_generation();
        self.decoder.reset();
        self.set_state(ProcessState::Running);
        self.shared.count_generation();

        let header = self.encoder.wav_header();
        match stdin.write_all(&header) {
            Ok(()) => self.shared.add_written(header.len()),
            Err(e) => tracing::warn!("Failed to write WAV header: {}", e),
        }
        Directive::Continue
    }

    fn on_stdin(&mut self, stdin: &mut dyn Write) -> Directive {
        if self.queue.is_empty() {
            self.refill();
        }
        let Some(chunk) = self.queue.front_mut() else {
            return Directive::Continue;
        };

        let len = chunk.remaining_len().min(CHUNK_SIZE);
        let written = if len == 0 {
            0
        } else {
            match stdin.write(&chunk.remaining()[..len]) {
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!("Process stdin not writable: {}", e);
                    0
                }
            }
        };
        chunk.advance(written);
        self.shared.add_written(written);

        if !chunk.is_delivered() {
            return Directive::Continue;
        }
        let Some(chunk) = self.queue.pop() else {
            return Directive::Continue;
        };
        let disposition = chunk.into_disposition();
        let stop = disposition.stops_feeding();
        self.register.store(disposition);

        if stop {
            Directive::Stop
        } else {
            Directive::Continue
        }
    }

    fn on_stdout(&mut self, stdout: &mut dyn Read) -> Directive {
        let mut buf = [0u8; CHUNK_SIZE];
        let n = match stdout.read(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("Failed to read process output: {}", e);
                return Directive::Continue;
            }
        };
        self.shared.add_read(n);

        let samples = match self.decoder.decode(&buf[..n]) {
            Ok(samples) => samples,
            Err(e) => {
                tracing::warn!("Process output: {}", e);
                Vec::new()
            }
        };

        let buffered = {
            let mut generator = self.shared.generator.lock();
            generator.append_audio(&samples);
            generator.length()
        };

        let directive = self.backpressure.check(buffered);
        if let Directive::Delay(delay) = directive {
            self.shared.count_delay();
            tracing::trace!(?delay, buffered, "Pausing process output");
        }
        directive
    }

    fn on_stderr(&mut self, stderr: &mut dyn Read) -> Directive {
        let mut buf = [0u8; CHUNK_SIZE];
        match stderr.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                let text = String::from_utf8_lossy(&buf[..n]);
                tracing::warn!(target: "pipe_bridge::stderr", "{}", text.trim_end());
            }
            Err(e) => tracing::debug!("Failed to read process stderr: {}", e),
        }
        Directive::Continue
    }

    fn on_stop(&mut self, exit: ProcessExit) -> bool {
        let disposition = self.register.take();
        tracing::info!(?exit, ?disposition, "Process stopped");
        tracing::debug!(
            encoder = ?self.encoder.stats(),
            decoder = ?self.decoder.stats(),
            "Codec totals"
        );
        self.set_state(ProcessState::Exited {
            clean: !exit.is_error(),
        });

        let outcome = decide(&exit, disposition, self.policy);
        {
            let mut generator = self.shared.generator.lock();
            if let Some(metadata) = outcome.metadata {
                generator.append_metadata(metadata);
            }
            if outcome.track_break {
                generator.append_break();
            }
        }

        if outcome.restart {
            self.shared.count_restart();
            tracing::info!("Restarting process");
        }
        self.set_state(ProcessState::after_exit(outcome.restart));
        outcome.restart
    }
}
