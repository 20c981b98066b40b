//! Deferred engine mutations applied by the worker before each step.
//!
//! Any thread may enqueue; only the worker drains. Commands from different
//! producers are applied in the order the channel received them, nothing
//! stronger.

use crate::engine::{SimulationEngine, NEUTRAL_GEAR};
use crate::error::BridgeError;
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

/// A unit of deferred work run exactly once against the engine.
pub type SimulationCommand<E> = Box<dyn FnOnce(&mut E) + Send + 'static>;

/// Unbounded MPSC queue of [`SimulationCommand`]s.
///
/// Enqueueing never blocks; the queue grows as needed. The worker drains it
/// completely before every `advance`.
pub struct CommandQueue<E> {
    tx: Sender<SimulationCommand<E>>,
    rx: Receiver<SimulationCommand<E>>,
}

impl<E> CommandQueue<E> {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// Producer handle that can be cloned across threads.
    pub fn sender(&self) -> CommandSender<E> {
        CommandSender {
            tx: self.tx.clone(),
        }
    }

    pub fn enqueue<F>(&self, command: F)
    where
        F: FnOnce(&mut E) + Send + 'static,
    {
        // Cannot fail: this queue owns the receiving end.
        let _ = self.tx.send(Box::new(command));
    }

    /// Pop and apply commands until the queue is empty. Returns how many ran.
    pub fn drain_into(&self, engine: &mut E) -> usize {
        let mut applied = 0;
        while let Ok(command) = self.rx.try_recv() {
            command(engine);
            applied += 1;
        }
        applied
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Clones share one channel; the queue stays open while any clone is alive.
impl<E> Clone for CommandQueue<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<E> Default for CommandQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable enqueue handle for a [`CommandQueue`].
pub struct CommandSender<E> {
    tx: Sender<SimulationCommand<E>>,
}

impl<E> Clone for CommandSender<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E> CommandSender<E> {
    /// Fails only after the worker has shut down and dropped the queue.
    pub fn enqueue<F>(&self, command: F) -> Result<(), BridgeError>
    where
        F: FnOnce(&mut E) + Send + 'static,
    {
        self.tx
            .send(Box::new(command))
            .map_err(|_| BridgeError::Stopped)
    }
}

impl<E: SimulationEngine> CommandSender<E> {
    pub fn send_control(&self, control: EngineControl) -> Result<(), BridgeError> {
        self.enqueue(move |engine: &mut E| control.apply(engine))
    }
}

/// Discrete driver actions, the tagged form of the common commands.
///
/// The dyno is not a control: the worker sets dyno enable and speed from
/// every [`Input`](crate::exchange::Input) after draining commands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EngineControl {
    /// Throttle position, clamped into `[0, 1]`.
    SpeedControl(f64),
    Ignition(bool),
    Starter(bool),
    Gear(i32),
    ShiftUp,
    ShiftDown,
    /// Enable ignition and starter together.
    StartUp,
}

impl EngineControl {
    pub fn apply<E: SimulationEngine + ?Sized>(self, engine: &mut E) {
        match self {
            Self::SpeedControl(value) => {
                let value = if value.is_finite() {
                    value.clamp(0.0, 1.0)
                } else {
                    0.0
                };
                engine.set_speed_control(value);
            }
            Self::Ignition(enabled) => engine.set_ignition_enabled(enabled),
            Self::Starter(enabled) => engine.set_starter_enabled(enabled),
            Self::Gear(gear) => engine.set_gear(bounded_gear(engine, gear)),
            Self::ShiftUp => {
                let next = bounded_gear(engine, engine.gear() + 1);
                engine.set_gear(next);
                tracing::debug!(gear = next, "shifted up");
            }
            Self::ShiftDown => {
                let next = bounded_gear(engine, engine.gear() - 1);
                engine.set_gear(next);
                tracing::debug!(gear = next, neutral = next == NEUTRAL_GEAR, "shifted down");
            }
            Self::StartUp => {
                engine.set_ignition_enabled(true);
                engine.set_starter_enabled(true);
            }
        }
    }
}

fn bounded_gear<E: SimulationEngine + ?Sized>(engine: &E, gear: i32) -> i32 {
    gear.clamp(NEUTRAL_GEAR, (engine.gear_count() - 1).max(NEUTRAL_GEAR))
}
