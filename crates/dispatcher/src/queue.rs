//! 作业优先级队列
//!
//! 就绪作业按（优先级降序、计划时间升序、入队顺序）出队；延迟作业在
//! `ready_at` 之前不可见。队列按 job_id 去重，重复入队以最后一次为准。

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use regreport_core::{Priority, ScheduledJob};

/// 队列中的作业
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    pub job_id: String,
    pub priority: Priority,
    pub scheduled_time: DateTime<Utc>,
}

impl From<&ScheduledJob> for QueuedJob {
    fn from(job: &ScheduledJob) -> Self {
        Self {
            job_id: job.job_id.clone(),
            priority: job.priority,
            scheduled_time: job.scheduled_time,
        }
    }
}

/// 就绪堆中的条目
#[derive(Debug)]
struct ReadyEntry {
    job: QueuedJob,
    seq: u64,
}

impl PartialEq for ReadyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for ReadyEntry {}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // 最大堆：优先级高者先出，同优先级计划时间早者先出，再按入队顺序
        self.job
            .priority
            .cmp(&other.job.priority)
            .then_with(|| other.job.scheduled_time.cmp(&self.job.scheduled_time))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// 延迟条目，按 (ready_at, seq) 排序
#[derive(Debug)]
struct DelayedEntry {
    ready_at: DateTime<Utc>,
    seq: u64,
    job: QueuedJob,
}

impl PartialEq for DelayedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for DelayedEntry {}

impl PartialOrd for DelayedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ready_at
            .cmp(&other.ready_at)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    ready: BinaryHeap<ReadyEntry>,
    delayed: BinaryHeap<Reverse<DelayedEntry>>,
    /// job_id -> 当前有效条目的序号，其余同ID条目出堆时丢弃
    members: HashMap<String, u64>,
    next_seq: u64,
}

impl QueueState {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn is_current(&self, job_id: &str, seq: u64) -> bool {
        self.members.get(job_id) == Some(&seq)
    }

    /// 把到期的延迟条目移入就绪堆
    fn promote_due(&mut self, now: DateTime<Utc>) {
        while let Some(Reverse(entry)) = self.delayed.peek() {
            if entry.ready_at > now {
                break;
            }
            let Some(Reverse(entry)) = self.delayed.pop() else {
                break;
            };
            if self.is_current(&entry.job.job_id, entry.seq) {
                self.ready.push(ReadyEntry {
                    job: entry.job,
                    seq: entry.seq,
                });
            }
        }
    }
}

/// 线程安全的延迟优先级队列，锁不会跨越 `.await`
#[derive(Debug, Default)]
pub struct JobQueue {
    state: Mutex<QueueState>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 立即就绪入队，替换同ID的旧条目
    pub fn push(&self, job: QueuedJob) {
        let mut state = self.state();
        let seq = state.next_seq();
        state.members.insert(job.job_id.clone(), seq);
        state.ready.push(ReadyEntry { job, seq });
    }

    /// 延迟到 `ready_at` 后才可出队，替换同ID的旧条目
    pub fn push_delayed(&self, job: QueuedJob, ready_at: DateTime<Utc>) {
        let mut state = self.state();
        let seq = state.next_seq();
        state.members.insert(job.job_id.clone(), seq);
        state.delayed.push(Reverse(DelayedEntry { ready_at, seq, job }));
    }

    /// 取出当前最优先的就绪作业
    pub fn pop_ready(&self, now: DateTime<Utc>) -> Option<QueuedJob> {
        let mut state = self.state();
        state.promote_due(now);
        while let Some(entry) = state.ready.pop() {
            if state.is_current(&entry.job.job_id, entry.seq) {
                state.members.remove(&entry.job.job_id);
                return Some(entry.job);
            }
        }
        None
    }

    pub fn remove(&self, job_id: &str) -> bool {
        self.state().members.remove(job_id).is_some()
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.state().members.contains_key(job_id)
    }

    /// 队列中的作业数量（含延迟作业）
    pub fn len(&self) -> usize {
        self.state().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 最早的延迟作业就绪时间
    pub fn next_ready_at(&self) -> Option<DateTime<Utc>> {
        let state = self.state();
        state
            .delayed
            .iter()
            .filter(|Reverse(entry)| state.is_current(&entry.job.job_id, entry.seq))
            .map(|Reverse(entry)| entry.ready_at)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn job(id: &str, priority: Priority, minute: u32) -> QueuedJob {
        QueuedJob {
            job_id: id.to_string(),
            priority,
            scheduled_time: Utc.with_ymd_and_hms(2024, 6, 28, 9, minute, 0).unwrap(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 28, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_priority_then_scheduled_time() {
        let queue = JobQueue::new();
        queue.push(job("low", Priority::Low, 0));
        queue.push(job("high-late", Priority::High, 30));
        queue.push(job("high-early", Priority::High, 10));
        queue.push(job("critical", Priority::Critical, 59));

        let order: Vec<String> = std::iter::from_fn(|| queue.pop_ready(now()))
            .map(|j| j.job_id)
            .collect();
        assert_eq!(order, vec!["critical", "high-early", "high-late", "low"]);
    }

    #[test]
    fn test_fifo_within_equal_keys() {
        let queue = JobQueue::new();
        queue.push(job("a", Priority::Medium, 0));
        queue.push(job("b", Priority::Medium, 0));
        assert_eq!(queue.pop_ready(now()).unwrap().job_id, "a");
        assert_eq!(queue.pop_ready(now()).unwrap().job_id, "b");
    }

    #[test]
    fn test_delayed_entries_hidden_until_ready() {
        let queue = JobQueue::new();
        queue.push_delayed(job("later", Priority::Emergency, 0), now() + Duration::seconds(30));
        queue.push(job("now", Priority::Low, 0));

        assert_eq!(queue.pop_ready(now()).unwrap().job_id, "now");
        assert!(queue.pop_ready(now()).is_none());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_ready_at(), Some(now() + Duration::seconds(30)));

        let popped = queue.pop_ready(now() + Duration::seconds(30)).unwrap();
        assert_eq!(popped.job_id, "later");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_dedup_by_job_id() {
        let queue = JobQueue::new();
        queue.push_delayed(job("j1", Priority::Medium, 0), now() + Duration::minutes(5));
        queue.push(job("j1", Priority::Medium, 0));
        queue.push(job("j1", Priority::Medium, 0));

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop_ready(now()).unwrap().job_id, "j1");
        assert!(queue.pop_ready(now() + Duration::minutes(10)).is_none());
    }

    #[test]
    fn test_remove() {
        let queue = JobQueue::new();
        queue.push(job("j1", Priority::High, 0));
        assert!(queue.contains("j1"));
        assert!(queue.remove("j1"));
        assert!(!queue.remove("j1"));
        assert!(queue.pop_ready(now()).is_none());
    }
}
