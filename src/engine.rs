//! Engine instances and their load lifecycle
//!
//! An [`EngineHandle`] publishes an explicit [`EngineState`] through a
//! `tokio::sync::watch` channel. Legal transitions:
//!
//! ```text
//! Unloaded -> Loading -> Ready
//!                    \-> Failed
//! ```
//!
//! `Ready` is terminal; a handle never transitions out of it. A cancelled
//! or failed load ends in `Failed` without ever being `Ready`.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{ErrorCategory, ErrorKind, HostError, Result};
use crate::heap::EngineHeap;
use crate::primitive::{Argon2Primitive, HashCall};

/// An instantiated engine: a primitive plus the heap its call buffers are
/// allocated from.
pub struct Engine {
    primitive: Arc<dyn Argon2Primitive>,
    heap: EngineHeap,
    gate: Option<Mutex<()>>,
}

impl Engine {
    pub fn new(primitive: Arc<dyn Argon2Primitive>) -> Self {
        let gate = if primitive.is_reentrant() {
            None
        } else {
            Some(Mutex::new(()))
        };
        Self {
            primitive,
            heap: EngineHeap::new(),
            gate,
        }
    }

    pub fn primitive(&self) -> &dyn Argon2Primitive {
        self.primitive.as_ref()
    }

    pub fn heap(&self) -> &EngineHeap {
        &self.heap
    }

    /// Invoke the primitive, serialized when the primitive is not reentrant.
    pub(crate) fn invoke(&self, call: HashCall<'_>) -> i32 {
        match &self.gate {
            Some(gate) => {
                let _guard = gate.lock().unwrap_or_else(PoisonError::into_inner);
                self.primitive.hash_ext(call)
            }
            None => self.primitive.hash_ext(call),
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("serialized", &self.gate.is_some())
            .field("live_buffers", &self.heap.live_buffers())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum EngineState {
    Unloaded,
    Loading,
    Ready(Arc<Engine>),
    Failed { kind: ErrorKind, reason: String },
}

impl EngineState {
    pub fn is_ready(&self) -> bool {
        matches!(self, EngineState::Ready(_))
    }

    fn name(&self) -> &'static str {
        match self {
            EngineState::Unloaded => "unloaded",
            EngineState::Loading => "loading",
            EngineState::Ready(_) => "ready",
            EngineState::Failed { .. } => "failed",
        }
    }
}

/// Cloneable reference to one engine instance and its lifecycle.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    state: Arc<watch::Sender<EngineState>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl EngineHandle {
    /// A handle in the `Unloaded` state.
    pub fn new() -> Self {
        let (state, _) = watch::channel(EngineState::Unloaded);
        Self {
            state: Arc::new(state),
            task: Arc::new(Mutex::new(None)),
        }
    }

    /// A handle that is immediately `Ready` with the given primitive.
    pub fn from_primitive(primitive: Arc<dyn Argon2Primitive>) -> Self {
        let handle = Self::new();
        handle.begin_loading();
        handle.complete(Engine::new(primitive));
        handle
    }

    pub fn state(&self) -> EngineState {
        self.state.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.state.borrow().is_ready()
    }

    /// The ready engine, or a `NotReady` error without waiting.
    pub fn engine(&self) -> Result<Arc<Engine>> {
        match &*self.state.borrow() {
            EngineState::Ready(engine) => Ok(Arc::clone(engine)),
            other => Err(HostError::with_kind(
                ErrorCategory::User,
                ErrorKind::NotReady,
                format!("engine is not ready (state: {})", other.name()),
            )),
        }
    }

    /// Wait until the load completes. Fails if the load failed or was
    /// cancelled, or if no load was ever started.
    pub async fn wait_ready(&self) -> Result<Arc<Engine>> {
        let mut rx = self.state.subscribe();
        loop {
            {
                let state = rx.borrow_and_update();
                match &*state {
                    EngineState::Ready(engine) => return Ok(Arc::clone(engine)),
                    EngineState::Failed { kind, reason } => {
                        return Err(HostError::with_kind(
                            ErrorCategory::User,
                            *kind,
                            format!("engine failed to load: {}", reason),
                        ));
                    }
                    EngineState::Unloaded => {
                        return Err(HostError::with_kind(
                            ErrorCategory::User,
                            ErrorKind::NotReady,
                            "engine load was never started",
                        ));
                    }
                    EngineState::Loading => {}
                }
            }
            // The sender lives in `self`, so it cannot be dropped while we wait.
            rx.changed().await.map_err(|e| {
                HostError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::InternalInvariant,
                    "engine state channel closed",
                    e,
                )
            })?;
        }
    }

    /// Abandon an in-flight load. Has no effect once the engine is ready.
    pub fn cancel(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
        self.fail(ErrorKind::Cancelled, "load cancelled".to_string());
    }

    pub(crate) fn begin_loading(&self) -> bool {
        self.transition(|state| matches!(state, EngineState::Unloaded), EngineState::Loading)
    }

    pub(crate) fn complete(&self, engine: Engine) -> bool {
        self.transition(
            |state| matches!(state, EngineState::Loading),
            EngineState::Ready(Arc::new(engine)),
        )
    }

    pub(crate) fn fail(&self, kind: ErrorKind, reason: String) -> bool {
        self.transition(
            |state| matches!(state, EngineState::Unloaded | EngineState::Loading),
            EngineState::Failed { kind, reason },
        )
    }

    pub(crate) fn attach_task(&self, task: JoinHandle<()>) {
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    fn transition(&self, allowed: impl FnOnce(&EngineState) -> bool, next: EngineState) -> bool {
        self.state.send_if_modified(|state| {
            if !allowed(state) {
                return false;
            }
            debug!(from = state.name(), to = next.name(), "engine state transition");
            *state = next;
            true
        })
    }
}

impl Default for EngineHandle {
    fn default() -> Self {
        Self::new()
    }
}
