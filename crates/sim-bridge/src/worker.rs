use crate::clamp::{StepBounds, StepDelta};
use crate::command::CommandQueue;
use crate::diagnostics::{CycleReport, DiagnosticsSink};
use crate::engine::SimulationEngine;
use crate::error::{BridgeError, EngineError, WorkerFault};
use crate::exchange::{Input, Output, StateExchange};
use crate::signal::{Wake, WakeSignal};
use crossbeam_channel::Sender;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Created = 0,
    Running = 1,
    StopRequested = 2,
    Stopped = 3,
    Faulted = 4,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::StopRequested,
            3 => Self::Stopped,
            _ => Self::Faulted,
        }
    }
}

/// Liveness shared between the worker thread and the bridge.
#[derive(Debug)]
pub struct WorkerStatus {
    state: AtomicU8,
    cycles: AtomicU64,
    fault: Mutex<Option<WorkerFault>>,
}

impl WorkerStatus {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(WorkerState::Created as u8),
            cycles: AtomicU64::new(0),
            fault: Mutex::new(None),
        }
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Completed cycles; doubles as the heartbeat.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    pub fn fault(&self) -> Option<WorkerFault> {
        self.fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn mark_running(&self) {
        self.transition(WorkerState::Created, WorkerState::Running);
    }

    /// Only a live worker moves to `StopRequested`; a faulted one stays faulted.
    pub(crate) fn request_stop(&self) {
        if !self.transition(WorkerState::Running, WorkerState::StopRequested) {
            self.transition(WorkerState::Created, WorkerState::StopRequested);
        }
    }

    pub(crate) fn mark_stopped(&self) {
        if self.state() != WorkerState::Faulted {
            self.state
                .store(WorkerState::Stopped as u8, Ordering::Release);
        }
    }

    pub(crate) fn record_fault(&self, fault: WorkerFault) {
        *self.fault.lock().unwrap_or_else(PoisonError::into_inner) = Some(fault);
        self.state
            .store(WorkerState::Faulted as u8, Ordering::Release);
    }

    fn beat(&self) {
        self.cycles.fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for WorkerStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Default, Debug)]
pub struct ExecutionStats {
    pub cycles_executed: u64,
    pub commands_applied: u64,
    pub clamped_steps: u64,
    pub simulated_time_s: f64,
    pub last_cycle_us: u64,
    pub max_cycle_us: u64,
}

/// Handles the worker shares with the bridge.
#[derive(Clone)]
pub struct WorkerLink {
    pub exchange: Arc<StateExchange>,
    pub signal: Arc<WakeSignal>,
    pub status: Arc<WorkerStatus>,
    pub diagnostics: Arc<dyn DiagnosticsSink>,
}

/// Owns the engine and runs the step loop. Sole caller of engine methods.
pub struct SimulationWorker<E: SimulationEngine> {
    engine: E,
    commands: CommandQueue<E>,
    link: WorkerLink,
    step_bounds: StepBounds,
    stats: ExecutionStats,
}

impl<E: SimulationEngine> SimulationWorker<E> {
    pub fn new(
        engine: E,
        commands: CommandQueue<E>,
        link: WorkerLink,
        step_bounds: StepBounds,
    ) -> Self {
        Self {
            engine,
            commands,
            link,
            step_bounds,
            stats: ExecutionStats::default(),
        }
    }

    /// Wait/cycle loop. Returns `Ok` on a stop request, `Err` on the first fault.
    pub fn run(&mut self) -> Result<(), WorkerFault> {
        self.link.status.mark_running();
        loop {
            match self.link.signal.wait() {
                Wake::Stop => return Ok(()),
                Wake::Cycle => self.run_cycle()?,
            }
        }
    }

    /// Drain commands, apply input, advance once, publish output.
    pub fn run_cycle(&mut self) -> Result<(), WorkerFault> {
        let cycle_start = Instant::now();
        let cycle = self.stats.cycles_executed + 1;

        let commands_applied = self.commands.drain_into(&mut self.engine);

        let input = self.link.exchange.read_input();
        let step = StepDelta::new(input.delta_time_s).clamp(&self.step_bounds);
        self.apply_input(&input);

        self.engine.advance(step.duration());

        if !self.engine.is_healthy() {
            return Err(WorkerFault::EngineUnhealthy { cycle });
        }
        let output = Output::from_engine(&self.engine, input.sequence_id);
        output.check_finite(cycle)?;
        self.link.exchange.publish_output(output.clone());

        let elapsed = cycle_start.elapsed();
        let cycle_us = elapsed.as_micros() as u64;
        self.stats.cycles_executed = cycle;
        self.stats.commands_applied += commands_applied as u64;
        self.stats.simulated_time_s += step.seconds();
        self.stats.last_cycle_us = cycle_us;
        self.stats.max_cycle_us = self.stats.max_cycle_us.max(cycle_us);
        if step.was_adjusted() {
            self.stats.clamped_steps += 1;
        }
        self.link.status.beat();

        self.link.diagnostics.cycle_completed(&CycleReport {
            cycle,
            sequence_id: input.sequence_id,
            commands_applied,
            step: step.duration(),
            step_adjustment: step.adjustment(),
            elapsed,
            output,
        });
        Ok(())
    }

    /// Input owns the dyno: it follows the wheels while they touch the ground
    /// and a gear is engaged, overriding anything a command set this cycle.
    fn apply_input(&mut self, input: &Input) {
        let ratio = self.engine.gear_ratio();
        let coupled = input.ground_contact && ratio != 0.0;
        self.engine.set_dyno_enabled(coupled);
        if coupled {
            let demand = if input.drive_speed_demand_rpm.is_finite() {
                input.drive_speed_demand_rpm.abs()
            } else {
                0.0
            };
            self.engine.set_dyno_speed(demand * ratio);
        }
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Run the loop with panics contained; records how the worker ended.
    fn run_to_completion(&mut self) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run()));
        let fault = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(fault)) => Some(fault),
            Err(payload) => Some(WorkerFault::Panicked {
                cycle: self.stats.cycles_executed + 1,
                message: panic_message(&*payload),
            }),
        };

        match fault {
            Some(fault) => {
                tracing::error!(
                    fault = %fault,
                    cycles_executed = self.stats.cycles_executed,
                    "Simulation worker stopped on fault"
                );
                self.link.diagnostics.worker_fault(&fault);
                self.link.status.record_fault(fault);
            }
            None => {
                self.link.status.mark_stopped();
                tracing::debug!(
                    cycles_executed = self.stats.cycles_executed,
                    "Simulation worker exited"
                );
            }
        }
    }
}

pub(crate) type ReadySender = Sender<Result<(), EngineError>>;

/// Spawn the worker thread. The engine is built on that thread; the outcome
/// goes back over `ready` so the caller can fail synchronously.
pub(crate) fn spawn<E, F>(
    thread_name: &str,
    stack_size: Option<usize>,
    factory: F,
    commands: CommandQueue<E>,
    link: WorkerLink,
    step_bounds: StepBounds,
    ready: ReadySender,
) -> Result<JoinHandle<ExecutionStats>, BridgeError>
where
    E: SimulationEngine,
    F: FnOnce() -> Result<E, EngineError> + Send + 'static,
{
    let mut builder = thread::Builder::new().name(thread_name.to_string());
    if let Some(bytes) = stack_size {
        builder = builder.stack_size(bytes);
    }
    builder
        .spawn(move || {
            let built = panic::catch_unwind(AssertUnwindSafe(factory)).unwrap_or_else(|payload| {
                Err(EngineError::Factory(panic_message(&*payload)))
            });
            let engine = match built {
                Ok(engine) => engine,
                Err(err) => {
                    let _ = ready.send(Err(err));
                    return ExecutionStats::default();
                }
            };
            tracing::info!(engine = engine.name(), "Simulation engine ready");
            let _ = ready.send(Ok(()));

            let mut worker = SimulationWorker::new(engine, commands, link, step_bounds);
            worker.run_to_completion();
            worker.stats.clone()
        })
        .map_err(BridgeError::Spawn)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|msg| msg.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::TracingDiagnostics;
    use crate::testing::{InjectedFault, RecordingEngine};
    use std::time::Duration;

    fn link() -> WorkerLink {
        WorkerLink {
            exchange: Arc::new(StateExchange::new()),
            signal: Arc::new(WakeSignal::new()),
            status: Arc::new(WorkerStatus::new()),
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }

    fn worker(engine: RecordingEngine) -> SimulationWorker<RecordingEngine> {
        SimulationWorker::new(engine, CommandQueue::new(), link(), StepBounds::default())
    }

    #[test]
    fn cycle_drains_commands_before_advancing() {
        let (engine, probe) = RecordingEngine::probed();
        let mut worker = worker(engine);
        worker.commands.enqueue(|e: &mut RecordingEngine| e.mark(1));
        worker.commands.enqueue(|e: &mut RecordingEngine| e.mark(2));

        worker.run_cycle().unwrap();

        let probe = probe.lock().unwrap();
        assert_eq!(probe.markers(), vec![1, 2]);
        assert!(matches!(
            probe.events.last(),
            Some(crate::testing::ProbeEvent::Advance(_))
        ));
        assert_eq!(worker.stats().commands_applied, 2);
    }

    #[test]
    fn output_echoes_input_sequence() {
        let mut worker = worker(RecordingEngine::new());
        let mut input = Input::new(0.016, 0.0, false);
        input.sequence_id = 41;
        worker.link.exchange.submit_input(input);
        worker.run_cycle().unwrap();
        assert_eq!(worker.link.exchange.read_output().sequence_id, 41);
        assert_eq!(worker.link.status.cycles(), 1);
    }

    #[test]
    fn oversized_step_is_clamped_and_counted() {
        let (engine, probe) = RecordingEngine::probed();
        let mut worker = worker(engine);
        worker
            .link
            .exchange
            .submit_input(Input::new(10.0, 0.0, false));
        worker.run_cycle().unwrap();

        let advances = probe.lock().unwrap().advances();
        assert_eq!(advances.len(), 1);
        assert!(StepBounds::default().contains(advances[0]));
        assert!((advances[0].as_secs_f64() - 1.0 / 30.0).abs() < 1e-6);
        assert_eq!(worker.stats().clamped_steps, 1);
    }

    #[test]
    fn dyno_tracks_wheels_only_with_ground_contact_in_gear() {
        let mut worker = worker(RecordingEngine::new());
        worker.engine.set_gear(1);

        worker
            .link
            .exchange
            .submit_input(Input::new(0.016, 1000.0, true));
        worker.run_cycle().unwrap();
        assert!(worker.engine().dyno_enabled);
        assert!((worker.engine().dyno_speed - 2070.0).abs() < 1e-9);

        worker
            .link
            .exchange
            .submit_input(Input::new(0.016, 1000.0, false));
        worker.run_cycle().unwrap();
        assert!(!worker.engine().dyno_enabled);

        worker.engine.set_gear(crate::engine::NEUTRAL_GEAR);
        worker
            .link
            .exchange
            .submit_input(Input::new(0.016, 1000.0, true));
        worker.run_cycle().unwrap();
        assert!(!worker.engine().dyno_enabled);
    }

    #[test]
    fn unhealthy_engine_is_a_fault() {
        let engine = RecordingEngine::new().with_fault(InjectedFault::UnhealthyAt(2));
        let mut worker = worker(engine);
        worker.run_cycle().unwrap();
        assert_eq!(
            worker.run_cycle(),
            Err(WorkerFault::EngineUnhealthy { cycle: 2 })
        );
    }

    #[test]
    fn nan_output_is_a_fault() {
        let mut engine = RecordingEngine::new().with_fault(InjectedFault::NanTorqueAt(1));
        engine.set_gear(0);
        let mut worker = worker(engine);
        assert!(matches!(
            worker.run_cycle(),
            Err(WorkerFault::NonFiniteOutput { cycle: 1, .. })
        ));
    }

    #[test]
    fn panic_is_contained_and_recorded() {
        let engine = RecordingEngine::new().with_fault(InjectedFault::PanicAt(1));
        let mut worker = worker(engine);
        worker.link.signal.signal();
        worker.run_to_completion();
        assert_eq!(worker.link.status.state(), WorkerState::Faulted);
        assert!(matches!(
            worker.link.status.fault(),
            Some(WorkerFault::Panicked { cycle: 1, .. })
        ));
    }

    #[test]
    fn stop_request_ends_loop() {
        let mut worker = worker(RecordingEngine::new().with_step_delay(Duration::from_millis(1)));
        worker.link.signal.signal();
        worker.link.signal.request_stop();
        worker.run_to_completion();
        assert_eq!(worker.link.status.state(), WorkerState::Stopped);
        assert_eq!(worker.stats().cycles_executed, 0);
    }

    #[test]
    fn status_transitions() {
        let status = WorkerStatus::new();
        assert_eq!(status.state(), WorkerState::Created);
        status.mark_running();
        assert_eq!(status.state(), WorkerState::Running);
        status.request_stop();
        assert_eq!(status.state(), WorkerState::StopRequested);
        status.mark_stopped();
        assert_eq!(status.state(), WorkerState::Stopped);

        let faulted = WorkerStatus::new();
        faulted.record_fault(WorkerFault::ThreadLost);
        faulted.request_stop();
        faulted.mark_stopped();
        assert_eq!(faulted.state(), WorkerState::Faulted);
    }
}
