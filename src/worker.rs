//! Background planning thread with message-passing submission.
//!
//! Requests run one at a time on a single worker thread. Every request gets a
//! monotonically increasing id and only the most recent one is live: waiting
//! on an older handle fails with [`PlanError::Superseded`], requests still
//! queued behind a newer one are skipped, and responses to older requests are
//! dropped when they arrive. In-flight work is never interrupted.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::error::PlanError;
use crate::layers::AutoPaintResult;
use crate::{PlanRequest, Planner};

/// Ticket for a submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlanHandle {
    id: u64,
}

impl PlanHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// A finished computation, tagged with the id of the request that produced it.
#[derive(Debug)]
pub struct PlanResponse {
    pub id: u64,
    pub result: Result<AutoPaintResult, PlanError>,
}

struct Job {
    id: u64,
    request: PlanRequest,
}

pub struct PlanWorker {
    jobs: Option<Sender<Job>>,
    responses: Receiver<PlanResponse>,
    latest: u64,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Default for PlanWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanWorker {
    /// Start a worker with a fresh [`Planner`] and the default cache size.
    pub fn new() -> Self {
        Self::with_planner(Planner::default())
    }

    /// Start a worker that owns `planner`; its result cache lives on the worker thread.
    pub fn with_planner(planner: Planner) -> Self {
        Self::spawn(move |request| planner.plan(request))
    }

    pub(crate) fn spawn<F>(mut compute: F) -> Self
    where
        F: FnMut(&PlanRequest) -> Result<AutoPaintResult, PlanError> + Send + 'static,
    {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (response_tx, response_rx) = mpsc::channel::<PlanResponse>();
        let running = Arc::new(AtomicBool::new(true));
        let running_flag = Arc::clone(&running);

        let thread = thread::spawn(move || {
            while let Ok(mut job) = job_rx.recv() {
                // Only the newest queued job can still be the latest request.
                while let Ok(newer) = job_rx.try_recv() {
                    debug!(id = job.id, latest = newer.id, "skipping superseded plan request");
                    job = newer;
                }
                if !running_flag.load(Ordering::Relaxed) {
                    break;
                }

                let Job { id, request } = job;
                let result = match panic::catch_unwind(AssertUnwindSafe(|| compute(&request))) {
                    Ok(result) => result,
                    Err(payload) => Err(PlanError::Internal {
                        id,
                        message: panic_message(payload.as_ref()),
                    }),
                };
                if response_tx.send(PlanResponse { id, result }).is_err() {
                    break;
                }
            }
        });

        Self {
            jobs: Some(job_tx),
            responses: response_rx,
            latest: 0,
            running,
            thread: Some(thread),
        }
    }

    /// Queue `request`. It supersedes every earlier submission.
    pub fn submit(&mut self, request: PlanRequest) -> Result<PlanHandle, PlanError> {
        let jobs = self.jobs.as_ref().ok_or(PlanError::WorkerDisconnected)?;
        let id = self.latest + 1;
        jobs.send(Job { id, request })
            .map_err(|_| PlanError::WorkerDisconnected)?;
        self.latest = id;
        debug!(id, "plan request submitted");
        Ok(PlanHandle { id })
    }

    /// Id of the most recent submission, 0 before the first.
    pub fn latest_id(&self) -> u64 {
        self.latest
    }

    /// Block until the response for `handle` arrives.
    ///
    /// Fails immediately with `Superseded` when a newer request has been
    /// submitted since `handle`.
    pub fn wait(&mut self, handle: PlanHandle) -> Result<AutoPaintResult, PlanError> {
        if handle.id != self.latest {
            return Err(PlanError::Superseded {
                id: handle.id,
                latest: self.latest,
            });
        }
        loop {
            let response = self.responses.recv().map_err(|_| PlanError::WorkerDisconnected)?;
            if let Some(result) = self.accept(response) {
                return result;
            }
        }
    }

    /// Non-blocking check for the latest request's response.
    ///
    /// Returns `None` while it is still running. Stale responses found along
    /// the way are dropped.
    pub fn poll(&mut self) -> Option<Result<AutoPaintResult, PlanError>> {
        loop {
            match self.responses.try_recv() {
                Ok(response) => {
                    if let Some(result) = self.accept(response) {
                        return Some(result);
                    }
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => return Some(Err(PlanError::WorkerDisconnected)),
            }
        }
    }

    fn accept(&self, response: PlanResponse) -> Option<Result<AutoPaintResult, PlanError>> {
        if response.id == self.latest {
            Some(response.result)
        } else {
            debug!(id = response.id, latest = self.latest, "discarding stale plan response");
            None
        }
    }
}

impl Drop for PlanWorker {
    fn drop(&mut self) {
        // The worker finishes its current job, then exits without starting queued ones.
        self.running.store(false, Ordering::Relaxed);
        self.jobs.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "computation panicked".to_string()
    }
}
