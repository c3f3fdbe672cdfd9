use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::GeometryCache;
use crate::config::{shared_thresholds, GeoFilterConfig, OptimizationThresholds, SharedThresholds};
use crate::core::{BackendFactory, FilterTaskContext};
use crate::filter::{FilterOrchestrator, PredicateSource};
use crate::optimize::OptimizationAdvisor;

/// 进程级组合根：启动时构造一次，持有共享几何缓存与可热更新阈值。
///
/// 编排器 / 顾问都从这里取依赖，不存在全局可变状态。
pub struct GeoFilter {
    config: GeoFilterConfig,
    cache: Arc<GeometryCache>,
    thresholds: SharedThresholds,
}

impl GeoFilter {
    pub fn new(config: GeoFilterConfig) -> Self {
        let cache = Arc::new(GeometryCache::from_settings(&config.cache));
        let thresholds = shared_thresholds(config.optimization.clone());
        tracing::info!(
            "GeoFilter ready: cache {} entries / {}s TTL, combine {}",
            config.cache.max_entries,
            config.cache.ttl_secs,
            config.filter.combine_operator
        );
        Self {
            config,
            cache,
            thresholds,
        }
    }

    pub fn config(&self) -> &GeoFilterConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<GeometryCache> {
        &self.cache
    }

    pub fn thresholds(&self) -> &SharedThresholds {
        &self.thresholds
    }

    /// 运行时替换阈值；进行中的任务在下一次读取时生效
    pub fn update_thresholds(&self, thresholds: OptimizationThresholds) {
        tracing::info!("Optimization thresholds updated: {:?}", thresholds);
        self.thresholds.store(Arc::new(thresholds));
    }

    pub fn orchestrator(
        &self,
        factory: Arc<dyn BackendFactory>,
        predicates: PredicateSource,
    ) -> FilterOrchestrator {
        FilterOrchestrator::new(factory, predicates)
            .with_cache(self.cache.clone())
            .with_thresholds(self.thresholds.clone())
    }

    /// 新任务上下文，合并运算符取自配置
    pub fn task_context(&self) -> FilterTaskContext {
        FilterTaskContext::new().with_combine_operator(self.config.filter.combine_operator)
    }

    pub fn advisor(&self) -> OptimizationAdvisor {
        OptimizationAdvisor::new(self.thresholds.clone())
    }

    /// 后台周期清理过期缓存条目
    pub fn spawn_cache_sweeper(&self, interval: Duration) -> std::io::Result<CacheSweeper> {
        let cache = self.cache.clone();
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = std::thread::Builder::new()
            .name("geofilter-cache-sweep".to_string())
            .spawn(move || {
                while flag.load(Ordering::Relaxed) {
                    std::thread::park_timeout(interval);
                    if !flag.load(Ordering::Relaxed) {
                        break;
                    }
                    let removed = cache.sweep_expired();
                    if removed > 0 {
                        tracing::debug!("Cache sweep removed {} expired entries", removed);
                    }
                }
            })?;
        Ok(CacheSweeper {
            running,
            handle: Some(handle),
        })
    }
}

impl Default for GeoFilter {
    fn default() -> Self {
        Self::new(GeoFilterConfig::default())
    }
}

/// 清理线程句柄；drop 时停止并等待线程退出
pub struct CacheSweeper {
    running: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl CacheSweeper {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                tracing::warn!("Cache sweeper thread panicked");
            }
        }
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}
