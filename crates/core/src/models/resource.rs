use serde::{Deserialize, Serialize};

/// 资源池使用情况快照
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourcePoolSnapshot {
    pub pool_name: String,
    pub max_concurrent_jobs: usize,
    pub current_jobs: usize,
}

impl ResourcePoolSnapshot {
    /// 使用率（0.0 - 1.0）
    pub fn utilization(&self) -> f64 {
        if self.max_concurrent_jobs == 0 {
            return 1.0;
        }
        self.current_jobs as f64 / self.max_concurrent_jobs as f64
    }
}
