//! 按报告类别划分的并发资源池
//!
//! 计数使用无锁的 `AtomicUsize`，获取成功返回 [`ResourceLease`]，
//! 租约在显式释放或析构时恰好归还一次。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use metrics::{counter, gauge};
use regreport_config::ResourcePoolsConfig;
use regreport_core::ResourcePoolSnapshot;
use tracing::{debug, info, warn};

/// 未知类别使用的资源池
pub const GENERAL_POOL: &str = "general";

#[derive(Debug)]
pub struct ResourcePool {
    name: String,
    max_concurrent_jobs: usize,
    current_jobs: AtomicUsize,
}

impl ResourcePool {
    pub fn new(name: impl Into<String>, max_concurrent_jobs: usize) -> Self {
        Self {
            name: name.into(),
            max_concurrent_jobs,
            current_jobs: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 当前占用数小于上限时占用一个槽位
    pub fn try_acquire(self: &Arc<Self>) -> Option<ResourceLease> {
        let max = self.max_concurrent_jobs;
        self.current_jobs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < max).then_some(current + 1)
            })
            .ok()
            .map(|_| ResourceLease {
                pool: Arc::clone(self),
                released: false,
            })
    }

    /// 归还一个槽位，不会低于零
    fn release(&self) {
        let result = self
            .current_jobs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            });
        if result.is_err() {
            warn!("资源池 {} 释放时计数已为零", self.name);
        }
    }

    pub fn current_jobs(&self) -> usize {
        self.current_jobs.load(Ordering::Acquire)
    }

    pub fn max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs
    }

    pub fn snapshot(&self) -> ResourcePoolSnapshot {
        ResourcePoolSnapshot {
            pool_name: self.name.clone(),
            max_concurrent_jobs: self.max_concurrent_jobs,
            current_jobs: self.current_jobs(),
        }
    }
}

/// 资源租约
#[derive(Debug)]
pub struct ResourceLease {
    pool: Arc<ResourcePool>,
    released: bool,
}

impl ResourceLease {
    pub fn pool_name(&self) -> &str {
        self.pool.name()
    }

    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.pool.release();
            debug!("资源池 {} 已释放槽位", self.pool.name());
        }
    }
}

impl Drop for ResourceLease {
    fn drop(&mut self) {
        self.release_once();
    }
}

/// 资源池集合
#[derive(Debug)]
pub struct ResourceManager {
    pools: HashMap<String, Arc<ResourcePool>>,
    contentions: AtomicU64,
}

impl ResourceManager {
    pub fn new(pools: impl IntoIterator<Item = (String, usize)>) -> Self {
        let mut pools: HashMap<String, Arc<ResourcePool>> = pools
            .into_iter()
            .map(|(name, max)| (name.clone(), Arc::new(ResourcePool::new(name, max))))
            .collect();
        pools
            .entry(GENERAL_POOL.to_string())
            .or_insert_with(|| Arc::new(ResourcePool::new(GENERAL_POOL, 1)));
        Self {
            pools,
            contentions: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &ResourcePoolsConfig) -> Self {
        Self::new(
            config
                .pools()
                .into_iter()
                .map(|(name, max)| (name.to_string(), max)),
        )
    }

    /// 按名称查找资源池，未知名称落到 general
    pub fn pool(&self, name: &str) -> Option<&Arc<ResourcePool>> {
        self.pools.get(name).or_else(|| self.pools.get(GENERAL_POOL))
    }

    pub fn try_acquire(&self, name: &str) -> Option<ResourceLease> {
        let pool = self.pool(name)?;
        match pool.try_acquire() {
            Some(lease) => {
                gauge!("regreport_resource_pool_in_use", "pool" => pool.name().to_string())
                    .set(pool.current_jobs() as f64);
                Some(lease)
            }
            None => {
                self.contentions.fetch_add(1, Ordering::Relaxed);
                counter!("regreport_resource_contentions_total", "pool" => pool.name().to_string())
                    .increment(1);
                None
            }
        }
    }

    pub fn contentions(&self) -> u64 {
        self.contentions.load(Ordering::Relaxed)
    }

    /// 按名称排序的资源池快照
    pub fn snapshots(&self) -> Vec<ResourcePoolSnapshot> {
        let mut snapshots: Vec<_> = self.pools.values().map(|pool| pool.snapshot()).collect();
        snapshots.sort_by(|a, b| a.pool_name.cmp(&b.pool_name));
        snapshots
    }

    pub fn log_utilization(&self) {
        for snapshot in self.snapshots() {
            gauge!("regreport_resource_pool_utilization", "pool" => snapshot.pool_name.clone())
                .set(snapshot.utilization());
            info!(
                pool = %snapshot.pool_name,
                current = snapshot.current_jobs,
                max = snapshot.max_concurrent_jobs,
                "资源池使用率 {:.1}%",
                snapshot.utilization() * 100.0
            );
        }
    }
}
