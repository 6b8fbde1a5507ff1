//! The serialized executor.
//!
//! One dedicated thread owns the [`Orchestrator`]. The local REPL and the
//! remote listener never touch it directly: they queue [`Job`]s and wait for
//! the reply, either on an async runtime or by blocking. Because the thread
//! handles one job at a time, two units can never interleave their
//! snapshot, diff and commit steps.

use std::thread::JoinHandle;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::error::{LiveloadError, Result};
use crate::orchestrator::{Orchestrator, UnitOutcome};

/// Stack size of the executor thread. Deeply nested user code recurses in
/// the interpreter.
pub const EXECUTOR_STACK: usize = 64 * 1024 * 1024;

enum Job {
    Eval {
        code: String,
        target: Option<String>,
        reply: oneshot::Sender<Result<UnitOutcome>>,
    },
    Switch {
        target: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
    Shutdown,
}

/// Snapshot of the engine state, served by `%status` and `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub context: String,
    pub modules: Vec<String>,
    pub trace: bool,
    pub live_instances: usize,
}

/// Owns the executor thread. Dropping it drains the queue up to a shutdown
/// job and joins the thread.
pub struct Executor {
    handle: EngineHandle,
    thread: Option<JoinHandle<()>>,
}

impl Executor {
    pub fn spawn(orchestrator: Orchestrator) -> Result<Self> {
        let (jobs, queue) = mpsc::unbounded_channel();
        let thread = std::thread::Builder::new()
            .name("liveload-executor".into())
            .stack_size(EXECUTOR_STACK)
            .spawn(move || run(orchestrator, queue))?;
        Ok(Self {
            handle: EngineHandle { jobs },
            thread: Some(thread),
        })
    }

    /// A cloneable handle producers submit jobs through.
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        let _ = self.handle.jobs.send(Job::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run(mut orchestrator: Orchestrator, mut queue: mpsc::UnboundedReceiver<Job>) {
    info!(context = orchestrator.context_name(), "executor started");
    while let Some(job) = queue.blocking_recv() {
        match job {
            Job::Eval {
                code,
                target,
                reply,
            } => {
                let outcome = orchestrator.run_unit(&code, target.as_deref());
                // the requester may have given up waiting
                let _ = reply.send(outcome);
            }
            Job::Switch { target, reply } => {
                let _ = reply.send(orchestrator.switch(&target));
            }
            Job::Status { reply } => {
                let runtime = orchestrator.runtime();
                let _ = reply.send(EngineStatus {
                    context: orchestrator.context_name().to_owned(),
                    modules: runtime.modules.names(),
                    trace: orchestrator.trace(),
                    live_instances: runtime.instances.live_count(),
                });
            }
            Job::Shutdown => {
                debug!("shutdown requested");
                break;
            }
        }
    }
    info!("executor stopped");
}

/// Producer side of the executor queue.
#[derive(Clone)]
pub struct EngineHandle {
    jobs: mpsc::UnboundedSender<Job>,
}

impl EngineHandle {
    fn send<T>(&self, job: impl FnOnce(oneshot::Sender<T>) -> Job) -> Result<oneshot::Receiver<T>> {
        let (reply, receiver) = oneshot::channel();
        self.jobs
            .send(job(reply))
            .map_err(|_| LiveloadError::ExecutorGone)?;
        Ok(receiver)
    }

    fn eval_job(code: String, target: Option<&str>) -> impl FnOnce(oneshot::Sender<Result<UnitOutcome>>) -> Job {
        let target = target.map(str::to_owned);
        move |reply| Job::Eval {
            code,
            target,
            reply,
        }
    }

    fn switch_job(target: &str) -> impl FnOnce(oneshot::Sender<Result<()>>) -> Job {
        let target = target.to_owned();
        move |reply| Job::Switch { target, reply }
    }

    /// Runs one unit, against `target` when it is given.
    pub async fn submit(&self, code: impl Into<String>, target: Option<&str>) -> Result<UnitOutcome> {
        let receiver = self.send(Self::eval_job(code.into(), target))?;
        receiver.await.map_err(|_| LiveloadError::ExecutorGone)?
    }

    /// Blocking variant of [`EngineHandle::submit`]. Must not be called from
    /// within an async runtime.
    pub fn submit_blocking(&self, code: impl Into<String>, target: Option<&str>) -> Result<UnitOutcome> {
        let receiver = self.send(Self::eval_job(code.into(), target))?;
        receiver.blocking_recv().map_err(|_| LiveloadError::ExecutorGone)?
    }

    pub async fn switch(&self, target: &str) -> Result<()> {
        let receiver = self.send(Self::switch_job(target))?;
        receiver.await.map_err(|_| LiveloadError::ExecutorGone)?
    }

    pub fn switch_blocking(&self, target: &str) -> Result<()> {
        let receiver = self.send(Self::switch_job(target))?;
        receiver.blocking_recv().map_err(|_| LiveloadError::ExecutorGone)?
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        let receiver = self.send(|reply| Job::Status { reply })?;
        receiver.await.map_err(|_| LiveloadError::ExecutorGone)
    }

    pub fn status_blocking(&self) -> Result<EngineStatus> {
        let receiver = self.send(|reply| Job::Status { reply })?;
        receiver.blocking_recv().map_err(|_| LiveloadError::ExecutorGone)
    }
}
