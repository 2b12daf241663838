use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::ai::{AiError, Responder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);

impl TaskId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One dispatched prompt. Owned by the unit that runs it, then handed to the
/// delivery context inside its [`Outcome`].
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub prompt: String,
    pub issued_at: DateTime<Utc>,
    pub state: TaskState,
}

impl Task {
    fn new(prompt: String) -> Self {
        Self {
            id: TaskId::new(),
            prompt,
            issued_at: Utc::now(),
            state: TaskState::Pending,
        }
    }

    fn start(&mut self) {
        debug_assert_eq!(self.state, TaskState::Pending);
        self.state = TaskState::Running;
    }

    fn finish(&mut self, succeeded: bool) {
        debug_assert!(matches!(self.state, TaskState::Pending | TaskState::Running));
        self.state = if succeeded {
            TaskState::Completed
        } else {
            TaskState::Failed
        };
    }
}

/// The single result delivered for a dispatched task.
#[derive(Debug)]
pub struct Outcome {
    pub task: Task,
    pub result: Result<String, AiError>,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Units allowed on the network at once; the rest wait as `Pending`.
    pub max_concurrency: usize,
    /// Cancel every earlier unit still in flight when a new prompt is dispatched.
    pub supersede: bool,
    pub model: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            supersede: true,
            model: None,
        }
    }
}

/// Lets the dispatcher cancel one task without touching the others.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    cancel: CancellationToken,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Runs provider calls off the delivery context.
///
/// Each `dispatch` spawns one unit on the tokio runtime. Exactly one [`Outcome`]
/// is sent on the delivery channel per unit, whether it succeeds, fails or is
/// cancelled. If the receiving side is gone the outcome is dropped.
pub struct AiWorker {
    responder: Arc<dyn Responder>,
    permits: Arc<Semaphore>,
    delivery: mpsc::UnboundedSender<Outcome>,
    shutdown: CancellationToken,
    in_flight: Arc<Mutex<HashMap<TaskId, CancellationToken>>>,
    config: WorkerConfig,
}

impl AiWorker {
    pub fn new(
        responder: Arc<dyn Responder>,
        config: WorkerConfig,
        delivery: mpsc::UnboundedSender<Outcome>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrency.max(1)));

        Self {
            responder,
            permits,
            delivery,
            shutdown: CancellationToken::new(),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    pub fn dispatch(&self, prompt: impl Into<String>) -> TaskHandle {
        let task = Task::new(prompt.into());
        let id = task.id;
        let cancel = self.shutdown.child_token();

        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if self.config.supersede {
                for (old_id, token) in in_flight.drain() {
                    tracing::debug!("Task {} superseded by {}", old_id, id);
                    token.cancel();
                }
            }
            in_flight.insert(id, cancel.clone());
        }

        tracing::debug!("Task {} dispatched ({} chars)", id, task.prompt.len());

        let unit = Unit {
            responder: self.responder.clone(),
            permits: self.permits.clone(),
            delivery: self.delivery.clone(),
            in_flight: self.in_flight.clone(),
            cancel: cancel.clone(),
            model: self.config.model.clone(),
        };
        tokio::spawn(unit.run(task));

        TaskHandle { id, cancel }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Cancel every outstanding task. Each still reports its `Cancelled` outcome.
    pub fn shutdown(&self) {
        tracing::info!("Worker shutting down ({} tasks in flight)", self.in_flight());
        self.shutdown.cancel();
    }
}

struct Unit {
    responder: Arc<dyn Responder>,
    permits: Arc<Semaphore>,
    delivery: mpsc::UnboundedSender<Outcome>,
    in_flight: Arc<Mutex<HashMap<TaskId, CancellationToken>>>,
    cancel: CancellationToken,
    model: Option<String>,
}

impl Unit {
    async fn run(self, mut task: Task) {
        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = self.permits.clone().acquire_owned() => permit.ok(),
        };

        let result = match permit {
            None => Err(AiError::Cancelled),
            Some(_permit) => {
                task.start();
                tracing::debug!("Task {} running", task.id);

                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Err(AiError::Cancelled),
                    result = self.responder.get_response(&task.prompt, self.model.as_deref()) => result,
                }
            }
        };

        task.finish(result.is_ok());
        match &result {
            Ok(text) => tracing::debug!("Task {} completed ({} chars)", task.id, text.len()),
            Err(e) => tracing::debug!("Task {} failed: {}", task.id, e.kind()),
        }

        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&task.id);
        }

        let _ = self.delivery.send(Outcome { task, result });
    }
}
