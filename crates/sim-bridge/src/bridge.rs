//! Facade used by the driving loop.
//!
//! ```text
//! Driving loop (producer)                  Worker thread
//!     |                                          |
//!     |--submit_input()--> [Input slot]          |
//!     |--signal()-------------------------->  wait()
//!     |--enqueue_command()--> [CommandQueue] --> drain_into(engine)
//!     |                                        read Input, clamp dt
//!     |                                        engine.advance(dt)
//!     |<--latest_output()--- [Output slot] <--- publish Output
//! ```
//!
//! Every producer-side call is non-blocking except `start` (waits for the
//! engine to be built) and `stop` (joins the worker).

use crate::clamp::StepBounds;
use crate::command::{CommandQueue, CommandSender, EngineControl};
use crate::diagnostics::{DiagnosticsSink, TracingDiagnostics};
use crate::engine::SimulationEngine;
use crate::error::{BridgeError, EngineError, WorkerFault};
use crate::exchange::{Input, Output, StateExchange};
use crate::signal::WakeSignal;
use crate::staleness::{Staleness, StalenessMonitor, StalenessStats};
use crate::worker::{self, ExecutionStats, WorkerLink, WorkerState, WorkerStatus};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub step_bounds: StepBounds,
    /// Output may trail the last submitted input by this many cycles before
    /// it is reported as stale.
    pub max_lag_cycles: u64,
    pub thread_name: String,
    /// Worker stack size in bytes; platform default when `None`.
    pub stack_size: Option<usize>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            step_bounds: StepBounds::default(),
            max_lag_cycles: 1,
            thread_name: "sim-worker".to_string(),
            stack_size: None,
        }
    }
}

/// Output together with how far it trails the producer.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSample {
    pub output: Output,
    pub staleness: Staleness,
}

#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    pub stats: ExecutionStats,
    pub fault: Option<WorkerFault>,
    /// False when no worker thread was running (or it could not be joined).
    pub joined: bool,
    pub shutdown_us: u64,
    pub staleness: StalenessStats,
}

enum Lifecycle<E> {
    Idle(CommandQueue<E>),
    Running(JoinHandle<ExecutionStats>),
    Stopped,
}

/// Thread-safe bridge between a real-time driving loop and a simulation
/// engine advanced on its own worker thread.
///
/// `submit_input` takes `&mut self`: there is exactly one input producer per
/// bridge. Commands may come from any thread through [`command_sender`].
///
/// [`command_sender`]: SimulationBridge::command_sender
pub struct SimulationBridge<E: SimulationEngine> {
    config: BridgeConfig,
    link: WorkerLink,
    commands: CommandSender<E>,
    lifecycle: Lifecycle<E>,
    last_submitted: u64,
    monitor: StalenessMonitor,
}

impl<E: SimulationEngine> SimulationBridge<E> {
    pub fn new(config: BridgeConfig) -> Self {
        let queue = CommandQueue::new();
        let commands = queue.sender();
        let monitor = StalenessMonitor::new(config.max_lag_cycles);
        Self {
            config,
            link: WorkerLink {
                exchange: Arc::new(StateExchange::new()),
                signal: Arc::new(WakeSignal::new()),
                status: Arc::new(WorkerStatus::new()),
                diagnostics: Arc::new(TracingDiagnostics),
            },
            commands,
            lifecycle: Lifecycle::Idle(queue),
            last_submitted: 0,
            monitor,
        }
    }

    /// Route staleness, cycle and fault reports to `sink`. Set before `start`.
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.link.diagnostics = sink;
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Build the engine on the worker thread and start the step loop.
    ///
    /// Blocks until `factory` has returned. A spawn or factory error is
    /// returned here and leaves the bridge unstarted with its queued commands
    /// intact, so `start` may be retried.
    pub fn start<F>(&mut self, factory: F) -> Result<(), BridgeError>
    where
        F: FnOnce() -> Result<E, EngineError> + Send + 'static,
    {
        let queue = match &self.lifecycle {
            Lifecycle::Idle(queue) => queue.clone(),
            Lifecycle::Running(_) => return Err(BridgeError::AlreadyStarted),
            Lifecycle::Stopped => return Err(BridgeError::Stopped),
        };

        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let handle = worker::spawn(
            &self.config.thread_name,
            self.config.stack_size,
            factory,
            queue,
            self.link.clone(),
            self.config.step_bounds,
            ready_tx,
        )?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(
                    thread = %self.config.thread_name,
                    min_step_s = self.config.step_bounds.min_s(),
                    max_step_s = self.config.step_bounds.max_s(),
                    max_lag_cycles = self.config.max_lag_cycles,
                    "Simulation bridge started"
                );
                self.lifecycle = Lifecycle::Running(handle);
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = handle.join();
                warn!(error = %err, "Engine construction failed; bridge left unstarted");
                Err(BridgeError::Configuration(err))
            }
            Err(_) => {
                let _ = handle.join();
                self.lifecycle = Lifecycle::Stopped;
                Err(BridgeError::SimulationUnavailable {
                    fault: WorkerFault::ThreadLost,
                })
            }
        }
    }

    /// Start with an engine built on the caller's thread.
    pub fn attach(&mut self, engine: E) -> Result<(), BridgeError> {
        self.start(move || Ok(engine))
    }

    /// Publish the next input and wake the worker. Returns the sequence id
    /// stamped on the input (1 for the first submit).
    pub fn submit_input(&mut self, mut input: Input) -> Result<u64, BridgeError> {
        self.ensure_available()?;
        self.last_submitted += 1;
        input.sequence_id = self.last_submitted;
        self.link.exchange.submit_input(input);
        self.link.signal.signal();
        Ok(self.last_submitted)
    }

    /// Queue a closure to run on the worker before its next step.
    ///
    /// Allowed before `start`; such commands run on the first cycle.
    pub fn enqueue_command<F>(&self, command: F) -> Result<(), BridgeError>
    where
        F: FnOnce(&mut E) + Send + 'static,
    {
        match &self.lifecycle {
            Lifecycle::Idle(_) => {}
            Lifecycle::Running(_) => self.ensure_available()?,
            Lifecycle::Stopped => return Err(BridgeError::Stopped),
        }
        self.commands.enqueue(command)
    }

    pub fn send_control(&self, control: EngineControl) -> Result<(), BridgeError> {
        self.enqueue_command(move |engine: &mut E| control.apply(engine))
    }

    /// Handle for enqueueing commands from other threads.
    pub fn command_sender(&self) -> CommandSender<E> {
        self.commands.clone()
    }

    /// Destroy the current engine and build a new one, on the worker thread
    /// between two steps. A failing factory keeps the current engine.
    pub fn replace_engine<F>(&self, factory: F) -> Result<(), BridgeError>
    where
        F: FnOnce() -> Result<E, EngineError> + Send + 'static,
    {
        self.enqueue_command(move |engine: &mut E| match factory() {
            Ok(fresh) => {
                let previous = std::mem::replace(engine, fresh);
                info!(
                    previous = previous.name(),
                    current = engine.name(),
                    "Simulation engine replaced"
                );
            }
            Err(err) => {
                warn!(error = %err, "Engine replacement failed; keeping current engine");
            }
        })
    }

    /// Most recent published output. May lag the last submitted input.
    ///
    /// The returned value also becomes [`last_observed_output`].
    ///
    /// [`last_observed_output`]: SimulationBridge::last_observed_output
    pub fn latest_output(&self) -> Result<Output, BridgeError> {
        self.ensure_available()?;
        let output = self.link.exchange.read_output();
        self.link.exchange.record_observed(output.clone());
        Ok(output)
    }

    /// The output the driving loop last read, which may be older than the
    /// latest published one. Available in every lifecycle state.
    pub fn last_observed_output(&self) -> Output {
        self.link.exchange.last_observed()
    }

    /// Latest output plus a staleness check; lagging samples are reported
    /// to the diagnostics sink.
    pub fn sample_output(&self) -> Result<OutputSample, BridgeError> {
        let output = self.latest_output()?;
        let (staleness, report) = self
            .monitor
            .observe(self.last_submitted, output.sequence_id);
        if let Some(report) = report {
            self.link.diagnostics.stale_output(&report);
        }
        Ok(OutputSample { output, staleness })
    }

    pub fn state(&self) -> WorkerState {
        self.link.status.state()
    }

    /// Cycles completed by the worker so far.
    pub fn heartbeat(&self) -> u64 {
        self.link.status.cycles()
    }

    pub fn last_submitted(&self) -> u64 {
        self.last_submitted
    }

    pub fn staleness_stats(&self) -> StalenessStats {
        self.monitor.stats()
    }

    /// Stop and join the worker. Safe to call repeatedly and before `start`.
    ///
    /// An in-flight step runs to completion first.
    pub fn stop(&mut self) -> ShutdownReport {
        match std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped) {
            Lifecycle::Running(handle) => {
                let started = Instant::now();
                self.link.status.request_stop();
                self.link.signal.request_stop();
                let (stats, joined) = match handle.join() {
                    Ok(stats) => (stats, true),
                    Err(_) => (ExecutionStats::default(), false),
                };
                let report = ShutdownReport {
                    stats,
                    fault: self.link.status.fault(),
                    joined,
                    shutdown_us: started.elapsed().as_micros() as u64,
                    staleness: self.monitor.stats(),
                };
                info!(
                    cycles_executed = report.stats.cycles_executed,
                    commands_applied = report.stats.commands_applied,
                    clamped_steps = report.stats.clamped_steps,
                    max_cycle_us = report.stats.max_cycle_us,
                    stale_samples = report.staleness.stale_samples,
                    faulted = report.fault.is_some(),
                    "Simulation bridge stopped"
                );
                report
            }
            Lifecycle::Idle(queue) => {
                debug!(pending_commands = queue.len(), "Stopping bridge that never started");
                self.link.status.mark_stopped();
                ShutdownReport::default()
            }
            Lifecycle::Stopped => ShutdownReport::default(),
        }
    }

    fn ensure_available(&self) -> Result<(), BridgeError> {
        match &self.lifecycle {
            Lifecycle::Idle(_) => Err(BridgeError::NotStarted),
            Lifecycle::Stopped => Err(BridgeError::Stopped),
            Lifecycle::Running(handle) => {
                if let Some(fault) = self.link.status.fault() {
                    return Err(BridgeError::SimulationUnavailable { fault });
                }
                if handle.is_finished() {
                    return Err(BridgeError::SimulationUnavailable {
                        fault: WorkerFault::ThreadLost,
                    });
                }
                Ok(())
            }
        }
    }
}

impl<E: SimulationEngine> Drop for SimulationBridge<E> {
    fn drop(&mut self) {
        if matches!(self.lifecycle, Lifecycle::Running(_)) {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingEngine;

    #[test]
    fn operations_before_start_fail_cleanly() {
        let mut bridge: SimulationBridge<RecordingEngine> =
            SimulationBridge::new(BridgeConfig::default());
        assert!(matches!(
            bridge.submit_input(Input::default()),
            Err(BridgeError::NotStarted)
        ));
        assert!(matches!(bridge.latest_output(), Err(BridgeError::NotStarted)));
        assert!(bridge.send_control(EngineControl::StartUp).is_ok());
        assert_eq!(bridge.state(), WorkerState::Created);
    }

    #[test]
    fn stop_without_start_is_a_noop() {
        let mut bridge: SimulationBridge<RecordingEngine> =
            SimulationBridge::new(BridgeConfig::default());
        let report = bridge.stop();
        assert!(!report.joined);
        assert_eq!(report.stats.cycles_executed, 0);
        assert!(matches!(
            bridge.attach(RecordingEngine::new()),
            Err(BridgeError::Stopped)
        ));
    }

    #[test]
    fn double_start_is_rejected() {
        let mut bridge = SimulationBridge::new(BridgeConfig::default());
        bridge.attach(RecordingEngine::new()).unwrap();
        assert!(matches!(
            bridge.attach(RecordingEngine::new()),
            Err(BridgeError::AlreadyStarted)
        ));
        assert!(bridge.stop().joined);
    }

    #[test]
    fn factory_error_leaves_bridge_restartable() {
        let mut bridge: SimulationBridge<RecordingEngine> =
            SimulationBridge::new(BridgeConfig::default());
        let err = bridge
            .start(|| Err(EngineError::Factory("script did not compile".into())))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(_)));
        assert_eq!(bridge.state(), WorkerState::Created);

        bridge.attach(RecordingEngine::new()).unwrap();
        assert_eq!(bridge.submit_input(Input::default()).unwrap(), 1);
        bridge.stop();
    }

    #[test]
    fn spawn_failure_keeps_queued_commands() {
        let mut bridge: SimulationBridge<RecordingEngine> = SimulationBridge::new(BridgeConfig {
            stack_size: Some(1 << 60),
            ..BridgeConfig::default()
        });
        bridge
            .enqueue_command(|engine: &mut RecordingEngine| engine.mark(7))
            .unwrap();

        let err = bridge.attach(RecordingEngine::new()).unwrap_err();
        assert!(matches!(err, BridgeError::Spawn(_)));
        assert_eq!(bridge.state(), WorkerState::Created);
        assert!(matches!(bridge.latest_output(), Err(BridgeError::NotStarted)));

        bridge.config.stack_size = None;
        let (engine, probe) = RecordingEngine::probed();
        bridge.attach(engine).unwrap();
        bridge.submit_input(Input::default()).unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while bridge.latest_output().unwrap().sequence_id < 1 {
            assert!(std::time::Instant::now() < deadline, "worker never cycled");
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert_eq!(probe.lock().unwrap().markers(), vec![7]);
        bridge.stop();
    }

    #[test]
    fn operations_after_stop_fail() {
        let mut bridge = SimulationBridge::new(BridgeConfig::default());
        bridge.attach(RecordingEngine::new()).unwrap();
        bridge.stop();
        assert!(matches!(
            bridge.submit_input(Input::default()),
            Err(BridgeError::Stopped)
        ));
        assert!(matches!(
            bridge.enqueue_command(|_: &mut RecordingEngine| {}),
            Err(BridgeError::Stopped)
        ));
        assert!(matches!(bridge.latest_output(), Err(BridgeError::Stopped)));
        assert!(!bridge.stop().joined);
    }

    #[test]
    fn last_observed_tracks_reads_not_publishes() {
        let mut bridge = SimulationBridge::new(BridgeConfig::default());
        bridge.attach(RecordingEngine::new()).unwrap();
        bridge.link.exchange.publish_output(Output {
            sequence_id: 3,
            ..Output::default()
        });
        assert_eq!(bridge.last_observed_output().sequence_id, 0);
        assert_eq!(bridge.latest_output().unwrap().sequence_id, 3);
        assert_eq!(bridge.last_observed_output().sequence_id, 3);
        bridge.stop();
        assert_eq!(bridge.last_observed_output().sequence_id, 3);
    }

    #[test]
    fn sequence_ids_start_at_one() {
        let mut bridge = SimulationBridge::new(BridgeConfig::default());
        bridge.attach(RecordingEngine::new()).unwrap();
        assert_eq!(bridge.submit_input(Input::default()).unwrap(), 1);
        assert_eq!(bridge.submit_input(Input::default()).unwrap(), 2);
        assert_eq!(bridge.last_submitted(), 2);
    }
}
