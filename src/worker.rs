//! Background worker thread lifecycle
//!
//! Every pipeline stage (encoder, decoder, transport pumps) is a
//! [`ChunkProcessor`]: one method that moves one chunk of data from a
//! bounded channel to the next stage. [`Worker`] owns the thread that drives
//! a processor and implements the Stopped → Running → Stopped state machine
//! once for all of them.
//!
//! # Lifecycle
//!
//! - [`Worker::start`] spawns exactly one thread if stopped; it is a no-op
//!   while running.
//! - [`Worker::stop`] clears the running flag and joins the thread. Every
//!   processor blocks on its channels with a bounded poll timeout, so the
//!   flag is observed within one tick. `stop` is idempotent.
//! - A processor error is fatal: the thread logs it, reports
//!   [`WorkerEvent::Faulted`] and exits. The error is returned by the next
//!   `stop`.
//!
//! The thread hands the processor back when it exits, so a worker can be
//! restarted with its state intact.

use crate::error::{DriverError, Result};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// One step of a pipeline stage
pub trait ChunkProcessor: Send + 'static {
    /// Name used for the thread, logs and events
    fn name(&self) -> &'static str;

    /// Process at most one chunk of input
    ///
    /// Returns the number of items handled; `0` means the poll timed out
    /// without work. Any error stops the worker.
    fn process_chunk(&mut self, ctx: &WorkerContext) -> Result<usize>;
}

/// What a processor can see of its worker
#[derive(Debug, Clone)]
pub struct WorkerContext {
    running: Arc<AtomicBool>,
    poll_timeout: Duration,
}

impl WorkerContext {
    pub fn new(running: Arc<AtomicBool>, poll_timeout: Duration) -> Self {
        Self {
            running,
            poll_timeout,
        }
    }

    /// Whether the worker has been asked to keep going
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Upper bound for any single blocking call inside `process_chunk`
    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    /// The poll timeout in the form the channel API takes
    pub fn tick(&self) -> Option<Duration> {
        Some(self.poll_timeout)
    }
}

/// Lifecycle notifications from worker threads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Thread spawned and entering its loop
    Started { worker: &'static str },
    /// Thread left its loop
    Stopped {
        worker: &'static str,
        stats: WorkerStatsSnapshot,
    },
    /// Processor returned a fatal error
    Faulted { worker: &'static str, error: String },
}

// ==================== Statistics ====================

/// Counters shared between a worker thread and its owner
#[derive(Debug, Default)]
pub struct WorkerStats {
    iterations: AtomicU64,
    idle_iterations: AtomicU64,
    items: AtomicU64,
}

impl WorkerStats {
    fn record(&self, items: usize) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
        if items == 0 {
            self.idle_iterations.fetch_add(1, Ordering::Relaxed);
        } else {
            self.items.fetch_add(items as u64, Ordering::Relaxed);
        }
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            iterations: self.iterations.load(Ordering::Relaxed),
            idle_iterations: self.idle_iterations.load(Ordering::Relaxed),
            items: self.items.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`WorkerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct WorkerStatsSnapshot {
    /// Calls to `process_chunk`
    pub iterations: u64,
    /// Calls that found no work
    pub idle_iterations: u64,
    /// Items handled in total
    pub items: u64,
}

impl WorkerStatsSnapshot {
    /// Share of iterations that did work, as a percentage
    pub fn utilization(&self) -> f64 {
        if self.iterations == 0 {
            0.0
        } else {
            let busy = self.iterations - self.idle_iterations;
            (busy as f64 / self.iterations as f64) * 100.0
        }
    }
}

// ==================== Worker ====================

/// Owns the thread that drives a [`ChunkProcessor`]
pub struct Worker<P: ChunkProcessor> {
    name: &'static str,
    processor: Option<P>,
    handle: Option<JoinHandle<(P, Result<()>)>>,
    running: Arc<AtomicBool>,
    fault: Arc<Mutex<Option<String>>>,
    stats: Arc<WorkerStats>,
    events: Option<Sender<WorkerEvent>>,
    poll_timeout: Duration,
}

impl<P: ChunkProcessor> Worker<P> {
    /// Wrap a processor; the worker starts out stopped
    pub fn new(processor: P, poll_timeout: Duration) -> Self {
        Self {
            name: processor.name(),
            processor: Some(processor),
            handle: None,
            running: Arc::new(AtomicBool::new(false)),
            fault: Arc::new(Mutex::new(None)),
            stats: Arc::new(WorkerStats::default()),
            events: None,
            poll_timeout,
        }
    }

    /// Report lifecycle events on `sender`
    pub fn with_events(mut self, sender: Sender<WorkerEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the thread is alive and has not been asked to stop
    pub fn is_running(&self) -> bool {
        self.handle.is_some() && self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Why the thread died on its own, if it did
    ///
    /// `Some` once the processor faulted or the thread panicked, until the
    /// next [`stop`](Self::stop) collects the thread.
    pub fn fault(&self) -> Option<String> {
        let handle = self.handle.as_ref()?;
        let recorded = self.fault.lock().unwrap_or_else(PoisonError::into_inner).clone();
        // A thread that ended with no recorded error panicked.
        recorded.or_else(|| handle.is_finished().then(|| "worker thread panicked".to_string()))
    }

    /// The processor, while the worker is stopped
    pub fn processor(&self) -> Option<&P> {
        self.processor.as_ref()
    }

    /// Mutable access to the processor, while the worker is stopped
    pub fn processor_mut(&mut self) -> Option<&mut P> {
        self.processor.as_mut()
    }

    /// Spawn the worker thread
    ///
    /// Does nothing if the thread is already running.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        let mut processor = self.processor.take().ok_or_else(|| DriverError::WorkerFault {
            worker: self.name.to_string(),
            message: "processor lost in an earlier panic".to_string(),
        })?;

        self.running.store(true, Ordering::SeqCst);
        *self.fault.lock().unwrap_or_else(PoisonError::into_inner) = None;
        let ctx = WorkerContext::new(self.running.clone(), self.poll_timeout);
        let fault = self.fault.clone();
        let stats = self.stats.clone();
        let events = self.events.clone();
        let name = self.name;

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                tracing::info!("Worker '{}' started", name);
                send_event(&events, WorkerEvent::Started { worker: name });

                let mut result = Ok(());
                while ctx.is_running() {
                    match processor.process_chunk(&ctx) {
                        Ok(items) => stats.record(items),
                        Err(e) => {
                            tracing::error!("Worker '{}' faulted: {}", name, e);
                            send_event(
                                &events,
                                WorkerEvent::Faulted {
                                    worker: name,
                                    error: e.to_string(),
                                },
                            );
                            *fault.lock().unwrap_or_else(PoisonError::into_inner) =
                                Some(e.to_string());
                            ctx.running.store(false, Ordering::SeqCst);
                            result = Err(e);
                            break;
                        }
                    }
                }

                let snapshot = stats.snapshot();
                tracing::info!(
                    "Worker '{}' stopped after {} iterations ({} items)",
                    name,
                    snapshot.iterations,
                    snapshot.items
                );
                send_event(
                    &events,
                    WorkerEvent::Stopped {
                        worker: name,
                        stats: snapshot,
                    },
                );
                (processor, result)
            });

        match handle {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(DriverError::Io(e))
            }
        }
    }

    /// Ask the thread to exit and wait for it
    ///
    /// Returns the fault that stopped the thread, if any. Calling `stop` on a
    /// stopped worker is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        match handle.join() {
            Ok((processor, result)) => {
                self.processor = Some(processor);
                result.map_err(|e| DriverError::WorkerFault {
                    worker: self.name.to_string(),
                    message: e.to_string(),
                })
            }
            Err(_) => Err(DriverError::WorkerFault {
                worker: self.name.to_string(),
                message: "worker thread panicked".to_string(),
            }),
        }
    }
}

impl<P: ChunkProcessor> Drop for Worker<P> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("{}", e);
        }
    }
}

fn send_event(events: &Option<Sender<WorkerEvent>>, event: WorkerEvent) {
    if let Some(sender) = events {
        // The owner may have stopped listening; events are advisory.
        let _ = sender.try_send(event);
    }
}
