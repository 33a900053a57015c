//! 缓存指标记录器
//!
//! 命中/未命中/写入/删除/错误的并发安全计数，
//! 全部使用原子递增，绝不做读-改-写（并发下会丢失更新）

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 指标快照
///
/// 一致的时间点拷贝，非可变引用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    /// hits / (hits + misses)，分母为0时为0
    pub hit_rate: f64,
    pub avg_duration_ms: f64,
    pub last_reset: DateTime<Utc>,
}

/// 并发安全的指标记录器
#[derive(Debug)]
pub struct MetricsRecorder {
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
    duration_ms_total: AtomicU64,
    duration_samples: AtomicU64,
    // 只在显式reset时写入
    last_reset: RwLock<DateTime<Utc>>,
}

impl MetricsRecorder {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            duration_ms_total: AtomicU64::new(0),
            duration_samples: AtomicU64::new(0),
            last_reset: RwLock::new(Utc::now()),
        }
    }

    pub fn record_hit(&self) {
        if self.enabled {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_miss(&self) {
        if self.enabled {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_set(&self) {
        if self.enabled {
            self.sets.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_delete(&self) {
        self.record_deletes(1);
    }

    pub fn record_deletes(&self, count: u64) {
        if self.enabled {
            self.deletes.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn record_error(&self) {
        if self.enabled {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_duration(&self, ms: u64) {
        if self.enabled {
            self.duration_ms_total.fetch_add(ms, Ordering::Relaxed);
            self.duration_samples.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 生成时间点快照
    pub fn snapshot(&self) -> MetricsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let samples = self.duration_samples.load(Ordering::Relaxed);
        let total_ms = self.duration_ms_total.load(Ordering::Relaxed);

        let hit_rate = if hits + misses == 0 {
            0.0
        } else {
            hits as f64 / (hits + misses) as f64
        };
        let avg_duration_ms = if samples == 0 {
            0.0
        } else {
            total_ms as f64 / samples as f64
        };

        let last_reset = self
            .last_reset
            .read()
            .map(|guard| *guard)
            .unwrap_or_else(|_| Utc::now());

        MetricsSnapshot {
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            hit_rate,
            avg_duration_ms,
            last_reset,
        }
    }

    /// 清零计数器并记录重置时间
    ///
    /// 显式的管理操作，绝不自动触发
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.sets.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.duration_ms_total.store(0, Ordering::Relaxed);
        self.duration_samples.store(0, Ordering::Relaxed);
        if let Ok(mut guard) = self.last_reset.write() {
            *guard = Utc::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_hit_rate_zero_when_no_lookups() {
        let metrics = MetricsRecorder::new(true);
        assert_eq!(metrics.snapshot().hit_rate, 0.0);
    }

    #[test]
    fn test_basic_counting() {
        let metrics = MetricsRecorder::new(true);
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();
        metrics.record_set();
        metrics.record_deletes(5);
        metrics.record_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.hits, 3);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.sets, 1);
        assert_eq!(snapshot.deletes, 5);
        assert_eq!(snapshot.errors, 1);
        assert!((snapshot.hit_rate - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reset_zeroes_and_stamps() {
        let metrics = MetricsRecorder::new(true);
        metrics.record_hit();
        metrics.record_miss();
        let before = metrics.snapshot().last_reset;

        metrics.reset();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.hits, 0);
        assert_eq!(snapshot.misses, 0);
        assert!(snapshot.last_reset >= before);
    }

    #[test]
    fn test_disabled_recorder_is_noop() {
        let metrics = MetricsRecorder::new(false);
        metrics.record_hit();
        metrics.record_miss();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.hits, 0);
        assert_eq!(snapshot.misses, 0);
    }

    /// 并发下不丢失任何递增
    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_no_lost_updates_under_concurrency() {
        let metrics = Arc::new(MetricsRecorder::new(true));
        let tasks_count = 64u64;
        let increments_per_task = 250u64;

        let mut tasks = Vec::new();
        for _ in 0..tasks_count {
            let metrics = Arc::clone(&metrics);
            tasks.push(tokio::spawn(async move {
                for _ in 0..increments_per_task {
                    metrics.record_miss();
                }
            }));
        }
        for task in tasks {
            task.await.expect("任务不应panic");
        }

        assert_eq!(
            metrics.snapshot().misses,
            tasks_count * increments_per_task
        );
    }

    #[test]
    fn test_avg_duration() {
        let metrics = MetricsRecorder::new(true);
        metrics.record_duration(10);
        metrics.record_duration(20);
        metrics.record_duration(30);
        assert!((metrics.snapshot().avg_duration_ms - 20.0).abs() < f64::EPSILON);
    }
}
