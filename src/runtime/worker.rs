use super::context;
use super::pool::Shared;
use super::Shutdown;
use crate::queue::{SpscQueue, Steal, StealQueue};
use crate::task::{self, Task};
use std::sync::Arc;

/// A single worker thread of the pool.
///
/// Each worker owns a bounded work-stealing deque (continuations and
/// refilled work; other workers steal from its top) and a bounded SPSC
/// submission queue written by the pool's round-robin dispatch. The worker
/// thread is the only consumer of both.
pub(crate) struct Worker {
    index: usize,

    /// Local work-stealing deque.
    wsq: StealQueue<Task>,

    /// Submission queue; the external submitter is the producer.
    spscq: SpscQueue<Task>,

    /// Shutdown flag and active-worker counter, shared with siblings.
    shared: Arc<Shared>,
}

impl Worker {
    pub(crate) fn new(index: usize, queue_capacity: usize, shared: Arc<Shared>) -> Self {
        Self {
            index,
            wsq: StealQueue::with_capacity(queue_capacity),
            spscq: SpscQueue::with_capacity(queue_capacity),
            shared,
        }
    }

    /// Producer side of the submission queue. Called only by the pool's
    /// round-robin dispatch; hands the task back when the queue is full.
    pub(crate) fn submit(&self, task: Task) -> Result<(), Task> {
        self.spscq.push(task)
    }

    /// Owner-side push, used for continuation locality. Fails when the
    /// deque is full.
    pub(crate) fn enqueue_local(&self, task: Task) -> Result<(), Task> {
        self.wsq.push(task)
    }

    /// Thief entry point for sibling workers.
    pub(crate) fn steal(&self) -> Steal<Task> {
        self.wsq.steal()
    }

    /// Approximate deque backlog; drives steal amounts and saturation.
    pub(crate) fn wsq_len(&self) -> usize {
        self.wsq.len()
    }

    /// The scheduling loop. Runs on the worker's own thread until shutdown.
    ///
    /// Per iteration: refill the deque from the submission queue when the
    /// deque is empty, pop and run own work, otherwise steal half of a
    /// round-robin victim's backlog. On soft shutdown a drained worker goes
    /// inactive exactly once and keeps stealing until the whole pool is
    /// idle, so no enqueued task is stranded; hard shutdown exits at the
    /// next iteration regardless of queue contents.
    pub(crate) fn run(&self, workers: &[Worker]) {
        let _binding = context::enter(self);

        let stealing_enabled = workers.len() >= 2;
        let mut victim = self.index;
        let mut active = true;
        let mut scratch = Vec::with_capacity(self.wsq.capacity());

        tracing::trace!(worker = self.index, "worker started");

        loop {
            let shutdown = self.shared.shutdown_state();
            if shutdown == Some(Shutdown::Hard) {
                break;
            }

            if self.wsq.is_empty() {
                self.refill(&mut scratch);
            }

            if let Some(task) = self.wsq.pop() {
                task::execute(task);
            } else if stealing_enabled {
                // Next victim in round-robin order, skipping self.
                loop {
                    victim = (victim + 1) % workers.len();
                    if victim != self.index {
                        break;
                    }
                }
                self.steal_from(&workers[victim]);
            }

            if shutdown == Some(Shutdown::Soft) && self.wsq.is_empty() && self.spscq.is_empty() {
                if active {
                    active = false;
                    self.shared.worker_inactive();
                }
                if self.shared.active_workers() == 0 {
                    break;
                }
            }
        }

        tracing::trace!(
            worker = self.index,
            wsq_left = self.wsq.len(),
            spscq_left = self.spscq.len(),
            "worker exited"
        );
    }

    /// Moves submitted tasks into the deque until one side runs out.
    ///
    /// The deque pops LIFO, so the batch is installed in reverse: execution
    /// then follows submission order, which is the contract for a single
    /// worker with no thieves.
    fn refill(&self, scratch: &mut Vec<Task>) {
        while scratch.len() < self.wsq.capacity() {
            match self.spscq.pop() {
                Some(task) => scratch.push(task),
                None => break,
            }
        }
        for task in scratch.drain(..).rev() {
            if let Err(task) = self.wsq.push(task) {
                task::execute(task);
            }
        }
    }

    /// Takes up to half of the victim's (approximate) backlog, stopping at
    /// the first unsuccessful steal.
    fn steal_from(&self, victim: &Worker) {
        let budget = victim.wsq_len() / 2;
        for _ in 0..budget {
            match victim.steal().success() {
                Some(task) => {
                    if let Err(task) = self.wsq.push(task) {
                        task::execute(task);
                        break;
                    }
                }
                None => break,
            }
        }
    }
}
