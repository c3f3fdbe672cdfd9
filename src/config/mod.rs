use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::core::CombineOperator;

/// 顶层配置（TOML）。所有字段都有默认值，缺省文件 / 部分文件均合法。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoFilterConfig {
    pub filter: FilterSettings,
    pub cache: CacheSettings,
    pub optimization: OptimizationThresholds,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// "AND" | "OR" | "AND NOT"
    pub combine_operator: CombineOperator,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub max_entries: usize,
    pub ttl_secs: u64,
    /// 超过该长度的几何文本不入缓存，每次重新计算
    pub max_text_length: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: 50,
            ttl_secs: 300,
            max_text_length: 1_000_000,
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// 优化启发式与回退守卫使用的阈值
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationThresholds {
    /// 远程图层建议质心替代的要素数下限
    pub centroid_distant_threshold: u64,
    /// PostgreSQL 大表执行失败时不回退 OGR 的要素数上限
    pub large_remote_fallback_threshold: u64,
    /// 建议减少缓冲段数的要素数下限
    pub large_layer_threshold: u64,
    /// 缓冲段数超过该值视为"高"
    pub high_buffer_segments: u32,
    pub reduced_buffer_segments: u32,
    /// 无空间索引时建议建索引的要素数下限
    pub spatial_index_threshold: u64,
}

impl Default for OptimizationThresholds {
    fn default() -> Self {
        Self {
            centroid_distant_threshold: 5_000,
            large_remote_fallback_threshold: 100_000,
            large_layer_threshold: 50_000,
            high_buffer_segments: 5,
            reduced_buffer_segments: 3,
            spatial_index_threshold: 50_000,
        }
    }
}

/// 可在运行时替换的阈值（UI 调参后 `store`，编排器 / 顾问下次读取即生效）
pub type SharedThresholds = Arc<ArcSwap<OptimizationThresholds>>;

pub fn shared_thresholds(t: OptimizationThresholds) -> SharedThresholds {
    Arc::new(ArcSwap::from_pointee(t))
}

impl GeoFilterConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let cfg: Self = toml::from_str(s).context("invalid geofilter config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("in {}", path.display()))
    }

    /// 文件不存在时回退默认值；存在但损坏时报错（避免静默吞掉用户配置）
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };
        if !path.exists() {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let cfg = Self::load(&path)?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(cfg)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.cache.max_entries > 0, "cache.max_entries must be > 0");
        anyhow::ensure!(
            self.optimization.reduced_buffer_segments > 0,
            "optimization.reduced_buffer_segments must be > 0"
        );
        Ok(())
    }
}

/// `<config_dir>/geofilter/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("geofilter").join("config.toml"))
}
