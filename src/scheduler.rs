//! Partition-scheduled parallel brute force.
//!
//! The point ids are cut into `p` contiguous partitions and the all-pairs
//! workload into `p * (p + 1) / 2` tasks, one per unordered partition pair
//! (self-pairs included). Workers repeatedly select a task, compare the two
//! blocks, and complete the task.
//!
//! Selecting a task locks every other pending task that shares one of its
//! partitions, so at any moment each partition is touched by at most one
//! running task. The accumulators of a partition live in the coordinator's
//! board while idle and are moved into the worker's [`Lease`] on selection,
//! then moved back on completion. Task execution therefore needs no locking
//! at all, and a missing block at selection time is reported as a broken
//! protocol instead of a data race.
//!
//! All bookkeeping sits behind one mutex; a condvar wakes workers that found
//! nothing available while other tasks were still locked.

use std::ops::Range;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace, warn};

use crate::brute_force::{check_k, compare_blocks, compare_range};
use crate::candidates::CandidateHeap;
use crate::config::validate_schedule;
use crate::error::{KnnError, Result};
use crate::neighbors::NeighborTable;
use crate::points::PointSet;

/// Marks an id that is not in a [`TaskSet`]
const ABSENT: usize = usize::MAX;

/// Contiguous block of point ids
#[derive(Clone, Debug)]
struct Partition {
    range: Range<usize>,
    /// Tasks referencing this partition that have not been selected yet
    pending: Vec<usize>,
}

/// Unordered partition pair `first <= second`
#[derive(Clone, Copy, Debug)]
struct Task {
    first: usize,
    second: usize,
    /// Number of running tasks that conflict with this one
    locks: usize,
}

/// Set of task ids with O(1) insert, remove, and random pick.
#[derive(Clone, Debug)]
struct TaskSet {
    members: Vec<usize>,
    /// Position of each id in `members`, or `ABSENT`
    slots: Vec<usize>,
}

impl TaskSet {
    fn new(universe: usize) -> Self {
        TaskSet {
            members: Vec::with_capacity(universe),
            slots: vec![ABSENT; universe],
        }
    }

    fn insert(&mut self, id: usize) -> bool {
        if self.slots[id] != ABSENT {
            return false;
        }
        self.slots[id] = self.members.len();
        self.members.push(id);
        true
    }

    fn remove(&mut self, id: usize) -> bool {
        let pos = self.slots[id];
        if pos == ABSENT {
            return false;
        }
        let removed = self.members.swap_remove(pos);
        debug_assert_eq!(removed, id);
        if let Some(&moved) = self.members.get(pos) {
            self.slots[moved] = pos;
        }
        self.slots[id] = ABSENT;
        true
    }

    fn pick<R: Rng>(&mut self, rng: &mut R) -> Option<usize> {
        if self.members.is_empty() {
            return None;
        }
        let id = self.members[rng.random_range(0..self.members.len())];
        let removed = self.remove(id);
        debug_assert!(removed, "picked task {id} was not a member");
        Some(id)
    }

    fn len(&self) -> usize {
        self.members.len()
    }

    fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Describes one task to a [`TaskObserver`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskInfo {
    /// Task id, stable for the whole run
    pub id: usize,
    /// Lower partition id
    pub first: usize,
    /// Upper partition id, equal to `first` for a self-pair
    pub second: usize,
    /// Point ids of the first partition
    pub first_range: Range<usize>,
    /// Point ids of the second partition
    pub second_range: Range<usize>,
}

impl TaskInfo {
    /// True for a partition paired with itself
    pub fn is_self_pair(&self) -> bool {
        self.first == self.second
    }

    /// Distance evaluations this task performs
    pub fn comparisons(&self) -> u64 {
        let a = self.first_range.len() as u64;
        if self.is_self_pair() {
            a * a.saturating_sub(1) / 2
        } else {
            a * self.second_range.len() as u64
        }
    }
}

/// Hooks called around every task execution, outside the scheduler lock.
///
/// `task_started` runs after the task was selected and its partitions
/// leased; `task_finished` runs before they are handed back.
pub trait TaskObserver: Sync {
    /// Called by `worker` before comparing the task's blocks
    fn task_started(&self, _worker: usize, _task: &TaskInfo) {}
    /// Called by `worker` after the comparisons, before completion
    fn task_finished(&self, _worker: usize, _task: &TaskInfo) {}
}

/// Logs task boundaries at trace level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TraceObserver;

impl TaskObserver for TraceObserver {
    fn task_started(&self, worker: usize, task: &TaskInfo) {
        trace!(
            worker,
            task = task.id,
            first = task.first,
            first_begin = task.first_range.start,
            first_end = task.first_range.end,
            second = task.second,
            second_begin = task.second_range.start,
            second_end = task.second_range.end,
            "task started"
        );
    }

    fn task_finished(&self, worker: usize, task: &TaskInfo) {
        trace!(worker, task = task.id, "task finished");
    }
}

/// A selected task plus exclusive ownership of its partitions' accumulators.
#[derive(Debug)]
pub(crate) struct Lease {
    info: TaskInfo,
    first: Vec<CandidateHeap>,
    /// `None` for a self-pair
    second: Option<Vec<CandidateHeap>>,
}

impl Lease {
    pub(crate) fn info(&self) -> &TaskInfo {
        &self.info
    }

    /// Runs the comparisons of this task.
    fn execute(&mut self, points: &PointSet) {
        let first_offset = self.info.first_range.start;
        match &mut self.second {
            None => compare_range(points, &mut self.first, first_offset),
            Some(second) => compare_blocks(
                points,
                &mut self.first,
                first_offset,
                second,
                self.info.second_range.start,
            ),
        }
    }
}

/// Summary of a finished run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleReport {
    /// Tasks executed in total
    pub tasks: usize,
    /// Tasks executed by each worker; worker 0 is the calling thread
    pub tasks_per_worker: Vec<usize>,
    /// Distance evaluations performed
    pub comparisons: u64,
    /// Wall time of the whole run
    pub elapsed: Duration,
}

/// Coordinator state, only touched under the scheduler mutex
#[derive(Debug)]
struct Board {
    tasks: Vec<Task>,
    partitions: Vec<Partition>,
    available: TaskSet,
    locked: TaskSet,
    /// Accumulators per partition; `None` while leased
    blocks: Vec<Option<Vec<CandidateHeap>>>,
    rng: StdRng,
    executed: usize,
    comparisons: u64,
    /// Set when a worker failed; every worker stops selecting
    poisoned: bool,
}

impl Board {
    fn new(points: usize, k: usize, partition_count: usize, rng: StdRng) -> Self {
        let partitions: Vec<Partition> = (0..partition_count)
            .map(|i| Partition {
                range: i * points / partition_count..(i + 1) * points / partition_count,
                pending: Vec::with_capacity(partition_count),
            })
            .collect();

        let mut board = Board {
            tasks: Vec::with_capacity(partition_count * (partition_count + 1) / 2),
            blocks: partitions
                .iter()
                .map(|p| Some(vec![CandidateHeap::new(k); p.range.len()]))
                .collect(),
            partitions,
            available: TaskSet::new(0),
            locked: TaskSet::new(0),
            rng,
            executed: 0,
            comparisons: 0,
            poisoned: false,
        };

        for first in 0..partition_count {
            for second in first..partition_count {
                let id = board.tasks.len();
                board.tasks.push(Task { first, second, locks: 0 });
                board.partitions[first].pending.push(id);
                if first != second {
                    board.partitions[second].pending.push(id);
                }
            }
        }

        let task_count = board.tasks.len();
        board.available = TaskSet::new(task_count);
        board.locked = TaskSet::new(task_count);
        for id in 0..task_count {
            let inserted = board.available.insert(id);
            debug_assert!(inserted, "task {id} created twice");
        }
        board
    }

    fn info(&self, id: usize) -> TaskInfo {
        let task = self.tasks[id];
        TaskInfo {
            id,
            first: task.first,
            second: task.second,
            first_range: self.partitions[task.first].range.clone(),
            second_range: self.partitions[task.second].range.clone(),
        }
    }

    /// Takes task `id` out of circulation, locks its conflicts, and leases
    /// its partitions.
    fn lease(&mut self, id: usize) -> Result<Lease> {
        let Task { first, second, locks } = self.tasks[id];
        if locks != 0 {
            return Err(KnnError::Invariant(format!(
                "task {id} selected while {locks} conflicting tasks are running"
            )));
        }

        self.partitions[first].pending.retain(|&t| t != id);
        if second != first {
            self.partitions[second].pending.retain(|&t| t != id);
        }

        let Board {
            tasks,
            partitions,
            available,
            locked,
            ..
        } = self;
        let extra: &[usize] = if second != first {
            &partitions[second].pending
        } else {
            &[]
        };
        for &other in partitions[first].pending.iter().chain(extra) {
            lock_task(tasks, available, locked, other)?;
        }

        let first_block = self.take_block(first, id)?;
        let second_block = if second != first {
            Some(self.take_block(second, id)?)
        } else {
            None
        };

        Ok(Lease {
            info: self.info(id),
            first: first_block,
            second: second_block,
        })
    }

    fn take_block(&mut self, partition: usize, task: usize) -> Result<Vec<CandidateHeap>> {
        self.blocks[partition].take().ok_or_else(|| {
            KnnError::Invariant(format!(
                "partition {partition} already leased when task {task} was selected"
            ))
        })
    }

    fn put_block(&mut self, partition: usize, block: Vec<CandidateHeap>) -> Result<()> {
        let slot = &mut self.blocks[partition];
        if slot.is_some() {
            return Err(KnnError::Invariant(format!(
                "partition {partition} returned while not leased"
            )));
        }
        *slot = Some(block);
        Ok(())
    }

    /// Returns a lease's partitions and unlocks the tasks it blocked.
    fn release(&mut self, lease: Lease) -> Result<()> {
        let Lease { info, first, second } = lease;
        self.put_block(info.first, first)?;
        if let Some(second) = second {
            self.put_block(info.second, second)?;
        }

        let Board {
            tasks,
            partitions,
            available,
            locked,
            ..
        } = self;
        let extra: &[usize] = if info.is_self_pair() {
            &[]
        } else {
            &partitions[info.second].pending
        };
        for &other in partitions[info.first].pending.iter().chain(extra) {
            unlock_task(tasks, available, locked, other)?;
        }

        self.executed += 1;
        self.comparisons += info.comparisons();
        Ok(())
    }
}

fn lock_task(
    tasks: &mut [Task],
    available: &mut TaskSet,
    locked: &mut TaskSet,
    id: usize,
) -> Result<()> {
    let task = &mut tasks[id];
    task.locks += 1;
    if task.locks == 1 && !(available.remove(id) && locked.insert(id)) {
        return Err(KnnError::Invariant(format!(
            "task {id} locked but was not available"
        )));
    }
    Ok(())
}

fn unlock_task(
    tasks: &mut [Task],
    available: &mut TaskSet,
    locked: &mut TaskSet,
    id: usize,
) -> Result<()> {
    let task = &mut tasks[id];
    if task.locks == 0 {
        return Err(KnnError::Invariant(format!(
            "task {id} unlocked more often than locked"
        )));
    }
    task.locks -= 1;
    if task.locks == 0 && !(locked.remove(id) && available.insert(id)) {
        return Err(KnnError::Invariant(format!(
            "task {id} released but was not locked"
        )));
    }
    Ok(())
}

/// Runs the block-decomposed brute force on a pool of worker threads.
///
/// # Example
/// ```
/// use allknn::prelude::*;
/// use rand::SeedableRng;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(1);
/// let points = PointSet::uniform(200, 8, &mut rng).unwrap();
/// let (table, report) = Scheduler::new(&points, 5, 6, 3).unwrap().with_seed(9).run().unwrap();
/// assert_eq!(table.len(), 200);
/// assert_eq!(report.tasks, 21);
/// ```
#[derive(Debug)]
pub struct Scheduler<'a> {
    points: &'a PointSet,
    k: usize,
    workers: usize,
    board: Mutex<Board>,
    task_freed: Condvar,
}

impl<'a> Scheduler<'a> {
    /// Lays out `partitions` partitions and all their pair tasks.
    ///
    /// # Errors
    /// [`KnnError::InvalidConfig`] if `k` is not in `1..points.len()` or if
    /// `partitions` or `workers` is zero.
    pub fn new(points: &'a PointSet, k: usize, partitions: usize, workers: usize) -> Result<Self> {
        check_k(points, k)?;
        validate_schedule(partitions, workers)?;

        if partitions > points.len() {
            warn!(
                partitions,
                points = points.len(),
                "more partitions than points, some partitions are empty"
            );
        }
        let task_count = partitions * (partitions + 1) / 2;
        if workers > task_count {
            warn!(workers, tasks = task_count, "more workers than tasks, some will idle");
        }

        Ok(Scheduler {
            points,
            k,
            workers,
            board: Mutex::new(Board::new(points.len(), k, partitions, StdRng::from_os_rng())),
            task_freed: Condvar::new(),
        })
    }

    /// Seeds the task picker, making the selection order reproducible for
    /// a single worker.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.board.get_mut().rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Number of partition-pair tasks, `p * (p + 1) / 2`
    pub fn task_count(&self) -> usize {
        self.board.lock().tasks.len()
    }

    /// Number of partitions
    pub fn partition_count(&self) -> usize {
        self.board.lock().partitions.len()
    }

    /// Point id ranges of all partitions, in order
    pub fn partition_ranges(&self) -> Vec<Range<usize>> {
        self.board
            .lock()
            .partitions
            .iter()
            .map(|p| p.range.clone())
            .collect()
    }

    /// Runs every task and seals the neighbor lists.
    ///
    /// # Errors
    /// [`KnnError::Invariant`] if the locking protocol breaks down.
    pub fn run(self) -> Result<(NeighborTable, ScheduleReport)> {
        self.run_observed(&TraceObserver)
    }

    /// Like [`Scheduler::run`], reporting each task to `observer`.
    ///
    /// The calling thread is worker 0; `workers - 1` more are spawned.
    ///
    /// # Errors
    /// [`KnnError::Invariant`] if the locking protocol breaks down, for
    /// example when a task finds its partition already leased.
    pub fn run_observed(
        self,
        observer: &dyn TaskObserver,
    ) -> Result<(NeighborTable, ScheduleReport)> {
        let start = Instant::now();
        let scheduler = &self;

        let tasks_per_worker = std::thread::scope(|scope| {
            let handles: Vec<_> = (1..scheduler.workers)
                .map(|worker| scope.spawn(move || scheduler.work(worker, observer)))
                .collect();

            let mut counts = vec![0; scheduler.workers];
            let mut failure = None;
            match scheduler.work(0, observer) {
                Ok(count) => counts[0] = count,
                Err(err) => failure = Some(err),
            }
            for (i, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(Ok(count)) => counts[i + 1] = count,
                    Ok(Err(err)) => {
                        failure.get_or_insert(err);
                    }
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            match failure {
                Some(err) => Err(err),
                None => Ok(counts),
            }
        })?;

        let board = self.board.into_inner();
        if !board.available.is_empty()
            || !board.locked.is_empty()
            || board.executed != board.tasks.len()
        {
            return Err(KnnError::Invariant(format!(
                "run ended with {} of {} tasks executed ({} available, {} locked)",
                board.executed,
                board.tasks.len(),
                board.available.len(),
                board.locked.len()
            )));
        }

        let mut heaps = Vec::with_capacity(self.points.len());
        for (partition, block) in board.blocks.into_iter().enumerate() {
            let block = block.ok_or_else(|| {
                KnnError::Invariant(format!("partition {partition} never returned"))
            })?;
            heaps.extend(block);
        }

        let report = ScheduleReport {
            tasks: board.executed,
            tasks_per_worker,
            comparisons: board.comparisons,
            elapsed: start.elapsed(),
        };
        debug!(
            points = self.points.len(),
            k = self.k,
            partitions = board.partitions.len(),
            workers = self.workers,
            tasks = report.tasks,
            comparisons = report.comparisons,
            elapsed_ms = report.elapsed.as_secs_f64() * 1000.0,
            "partitioned run finished"
        );
        Ok((NeighborTable::from_heaps(self.k, heaps), report))
    }

    /// Worker loop: select, execute, complete, until no work is left.
    fn work(&self, worker: usize, observer: &dyn TaskObserver) -> Result<usize> {
        let _guard = PoisonOnPanic(self);
        let mut executed = 0;
        let outcome = loop {
            let mut lease = match self.select() {
                Ok(Some(lease)) => lease,
                Ok(None) => break Ok(executed),
                Err(err) => break Err(err),
            };
            observer.task_started(worker, lease.info());
            lease.execute(self.points);
            observer.task_finished(worker, lease.info());
            if let Err(err) = self.complete(lease) {
                break Err(err);
            }
            executed += 1;
        };
        if outcome.is_err() {
            self.poison();
        }
        outcome
    }

    /// Blocks until a task is available, or returns `None` when none will be.
    fn select(&self) -> Result<Option<Lease>> {
        let mut board = self.board.lock();
        loop {
            if board.poisoned {
                return Ok(None);
            }
            let board_ref = &mut *board;
            if let Some(id) = board_ref.available.pick(&mut board_ref.rng) {
                return board.lease(id).map(Some);
            }
            if board.locked.is_empty() {
                return Ok(None);
            }
            self.task_freed.wait(&mut board);
        }
    }

    fn complete(&self, lease: Lease) -> Result<()> {
        self.board.lock().release(lease)?;
        self.task_freed.notify_all();
        Ok(())
    }

    fn poison(&self) {
        self.board.lock().poisoned = true;
        self.task_freed.notify_all();
    }
}

/// Stops the other workers if this one unwinds, so none waits forever on
/// partitions that will never be returned.
struct PoisonOnPanic<'s, 'a>(&'s Scheduler<'a>);

impl Drop for PoisonOnPanic<'_, '_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.poison();
        }
    }
}
