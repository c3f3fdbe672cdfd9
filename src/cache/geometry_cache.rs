use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::CacheSettings;
use crate::stats::CacheStats;

struct CacheEntry {
    geometry_text: Arc<str>,
    srid: i32,
    source_layer_id: String,
    created_at: Instant,
    last_accessed_at: Instant,
    access_count: u64,
    /// LRU 辅助：单调递增的访问序号（比 Instant 更稳定地区分先后）
    lru_tick: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) > ttl
    }
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// 辅助索引：source layer -> keys（每次插入/删除同步维护）
    by_layer: HashMap<String, HashSet<String>>,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl CacheInner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        if let Some(keys) = self.by_layer.get_mut(&entry.source_layer_id) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_layer.remove(&entry.source_layer_id);
            }
        }
        Some(entry)
    }

    fn evict_lru(&mut self) -> bool {
        let lru_key = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.lru_tick)
            .map(|(k, _)| k.clone());

        match lru_key {
            Some(key) => {
                self.remove_entry(&key);
                self.evictions += 1;
                tracing::debug!("Geometry cache LRU eviction: {}", key);
                true
            }
            None => false,
        }
    }
}

/// 几何序列化缓存：key -> (WKT, SRID)。
///
/// - 容量上限 `max_entries`，超出按 LRU 淘汰
/// - 超过 TTL 的条目在 `get` 时惰性过期（单独计为 expiration）
/// - 超长文本不入缓存
/// - 所有变更操作串行化在同一把锁后；缓存内部无 I/O
pub struct GeometryCache {
    inner: Mutex<CacheInner>,
    max_entries: usize,
    ttl: Duration,
    max_text_length: usize,
}

impl GeometryCache {
    pub fn new(max_entries: usize, ttl: Duration, max_text_length: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            max_entries: max_entries.max(1),
            ttl,
            max_text_length,
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(settings.max_entries, settings.ttl(), settings.max_text_length)
    }

    pub fn get(&self, key: &str) -> Option<(Arc<str>, i32)> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(key) {
            None => {
                inner.misses += 1;
                return None;
            }
            Some(e) => e.is_expired(now, self.ttl),
        };

        if expired {
            inner.remove_entry(key);
            inner.expirations += 1;
            inner.misses += 1;
            tracing::debug!("Geometry cache entry expired: {}", key);
            return None;
        }

        let tick = inner.next_tick();
        inner.hits += 1;
        let entry = inner.entries.get_mut(key)?;
        entry.last_accessed_at = now;
        entry.access_count += 1;
        entry.lru_tick = tick;
        Some((entry.geometry_text.clone(), entry.srid))
    }

    /// 返回 false 表示未缓存（文本超长）
    pub fn put(&self, key: &str, text: &str, srid: i32, source_layer_id: &str) -> bool {
        let mut inner = self.inner.lock();

        if text.len() > self.max_text_length {
            // 旧值与新几何不一致，一并丢弃
            inner.remove_entry(key);
            tracing::debug!(
                "Geometry too large to cache ({} > {} chars): {}",
                text.len(),
                self.max_text_length,
                key
            );
            return false;
        }

        inner.remove_entry(key);
        while inner.entries.len() >= self.max_entries {
            if !inner.evict_lru() {
                break;
            }
        }

        let now = Instant::now();
        let tick = inner.next_tick();
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                geometry_text: Arc::from(text),
                srid,
                source_layer_id: source_layer_id.to_string(),
                created_at: now,
                last_accessed_at: now,
                access_count: 0,
                lru_tick: tick,
            },
        );
        inner
            .by_layer
            .entry(source_layer_id.to_string())
            .or_default()
            .insert(key.to_string());
        true
    }

    /// 命中直接返回；未命中则在锁外计算并尝试写入
    pub fn get_or_compute<F>(
        &self,
        key: &str,
        compute: F,
        source_layer_id: &str,
    ) -> Option<(Arc<str>, i32)>
    where
        F: FnOnce() -> Option<(String, i32)>,
    {
        if let Some(hit) = self.get(key) {
            return Some(hit);
        }
        let (text, srid) = compute()?;
        self.put(key, &text, srid, source_layer_id);
        Some((Arc::from(text), srid))
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.inner.lock().remove_entry(key).is_some()
    }

    /// 删除源图层相关的全部条目，返回删除数量
    pub fn invalidate_for_layer(&self, source_layer_id: &str) -> usize {
        let mut inner = self.inner.lock();
        let keys: Vec<String> = match inner.by_layer.get(source_layer_id) {
            Some(keys) => keys.iter().cloned().collect(),
            None => return 0,
        };
        let removed = keys
            .iter()
            .filter(|k| inner.remove_entry(k).is_some())
            .count();
        if removed > 0 {
            tracing::debug!(
                "Invalidated {} geometry cache entries for layer {}",
                removed,
                source_layer_id
            );
        }
        removed
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.by_layer.clear();
    }

    /// 主动清理过期条目
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now, self.ttl))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.remove_entry(key);
        }
        inner.expirations += expired.len() as u64;
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let lookups = inner.hits + inner.misses;
        CacheStats {
            entries: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                inner.hits as f64 / lookups as f64
            },
            evictions: inner.evictions,
            expirations: inner.expirations,
            layers: inner.by_layer.len(),
            cached_bytes: inner
                .entries
                .values()
                .map(|e| e.geometry_text.len() as u64)
                .sum(),
        }
    }
}
