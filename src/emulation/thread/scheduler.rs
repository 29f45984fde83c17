//! Round-robin scheduling of the threads of a domain.

use log::trace;

use crate::{
    emulation::{
        runtime::DomainContext,
        thread::{Thread, ThreadId, ThreadStatus},
    },
    Result,
};

/// How many steps a thread may take each time it is served.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StepBudget {
    /// Run until the thread blocks or finishes
    #[default]
    Unbounded,
    /// Run at most this many steps (at least one)
    Steps(u64),
}

impl StepBudget {
    fn exhausted(self, steps: u64) -> bool {
        match self {
            StepBudget::Unbounded => false,
            StepBudget::Steps(limit) => steps >= limit.max(1),
        }
    }
}

/// What happened during one [`Scheduler::tick`].
#[derive(Debug, Default)]
pub struct TickReport {
    /// Threads that were given their slot, in serving order
    pub served: Vec<ThreadId>,
    /// Threads that were found blocked
    pub blocked: Vec<ThreadId>,
    /// Threads that finished and were removed
    pub finished: Vec<Thread>,
    /// Steps that made progress
    pub steps: u64,
}

impl TickReport {
    /// Returns true if any thread made progress.
    #[must_use]
    pub fn progressed(&self) -> bool {
        self.steps > 0
    }

    /// Ids of the removed threads.
    pub fn removed(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.finished.iter().map(Thread::id)
    }
}

enum Slot {
    Exhausted,
    Blocked,
    Finished,
}

/// Serves threads round-robin with a wrapping cursor.
///
/// A tick makes at most one attempt per live thread and ends after the first thread that did
/// work, either by exhausting its budget or by finishing. Blocked threads are skipped. A
/// finished thread is removed at the cursor, which then already points at its successor.
#[derive(Debug, Default)]
pub struct Scheduler {
    cursor: usize,
    budget: StepBudget,
}

impl Scheduler {
    /// Create a scheduler granting `budget` steps per slot.
    #[must_use]
    pub fn new(budget: StepBudget) -> Scheduler {
        Scheduler { cursor: 0, budget }
    }

    /// The step budget per slot.
    #[must_use]
    pub fn budget(&self) -> StepBudget {
        self.budget
    }

    /// Index of the thread served next.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Serve the threads once.
    ///
    /// # Errors
    /// Returns the error of a faulting thread; the thread is left in place.
    pub fn tick(&mut self, threads: &mut Vec<Thread>, ctx: &mut DomainContext) -> Result<TickReport> {
        let mut report = TickReport::default();

        for _ in 0..threads.len() {
            if threads.is_empty() {
                break;
            }
            if self.cursor >= threads.len() {
                self.cursor = 0;
            }

            let thread = &mut threads[self.cursor];
            let id = thread.id();
            report.served.push(id);

            match self.serve(thread, ctx, &mut report.steps)? {
                Slot::Finished => {
                    trace!("Thread {} finished", id);
                    report.finished.push(threads.remove(self.cursor));
                    break;
                }
                Slot::Exhausted => {
                    self.cursor += 1;
                    break;
                }
                Slot::Blocked => {
                    trace!("Thread {} is blocked", id);
                    report.blocked.push(id);
                    self.cursor += 1;
                }
            }
        }

        Ok(report)
    }

    fn serve(&self, thread: &mut Thread, ctx: &mut DomainContext, total: &mut u64) -> Result<Slot> {
        let mut steps = 0;
        loop {
            match thread.step(ctx)? {
                ThreadStatus::Continue => {
                    steps += 1;
                    *total += 1;
                    if self.budget.exhausted(steps) {
                        return Ok(Slot::Exhausted);
                    }
                }
                ThreadStatus::Blocked(_) => return Ok(Slot::Blocked),
                ThreadStatus::Finished => {
                    *total += 1;
                    return Ok(Slot::Finished);
                }
            }
        }
    }
}
