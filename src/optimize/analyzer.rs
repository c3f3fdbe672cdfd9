use rayon::prelude::*;
use serde::Serialize;

use crate::core::{LayerRef, ProviderType};

/// 数据所在位置
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    LocalFile,
    LocalEmbeddedDb,
    RemoteDb,
    RemoteService,
}

impl LocationType {
    pub fn is_remote(self) -> bool {
        matches!(self, LocationType::RemoteDb | LocationType::RemoteService)
    }
}

/// 粗粒度几何复杂度（按每要素平均顶点数）
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryComplexity {
    Unknown,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl GeometryComplexity {
    pub fn from_avg_vertices(avg: Option<f64>) -> Self {
        match avg {
            None => GeometryComplexity::Unknown,
            Some(v) if !v.is_finite() || v < 0.0 => GeometryComplexity::Unknown,
            Some(v) if v < 50.0 => GeometryComplexity::Low,
            Some(v) if v < 500.0 => GeometryComplexity::Medium,
            Some(v) if v < 5_000.0 => GeometryComplexity::High,
            Some(_) => GeometryComplexity::VeryHigh,
        }
    }

    pub fn is_high(self) -> bool {
        self >= GeometryComplexity::High
    }
}

/// 图层画像。按需计算，不跨图层变更缓存（要素数会变）。
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LayerProfile {
    pub layer_id: String,
    pub location_type: LocationType,
    /// 未知时为 0
    pub feature_count: u64,
    pub geometry_complexity: GeometryComplexity,
    pub has_spatial_index: Option<bool>,
}

const EMBEDDED_DB_EXTENSIONS: [&str; 5] = [".sqlite", ".spatialite", ".gpkg", ".db", ".sqlite3"];
const SERVICE_PROVIDER_HINTS: [&str; 4] = ["url=http", "url='http", "typename=", "service=wfs"];

/// 由数据源描述推断位置
pub fn classify_source(provider: ProviderType, uri: &str) -> LocationType {
    let lower = uri.trim().to_ascii_lowercase();

    if lower.starts_with("http://")
        || lower.starts_with("https://")
        || SERVICE_PROVIDER_HINTS.iter().any(|h| lower.contains(h))
    {
        return LocationType::RemoteService;
    }

    match provider {
        ProviderType::Postgres => return LocationType::RemoteDb,
        ProviderType::Spatialite => return LocationType::LocalEmbeddedDb,
        ProviderType::Ogr | ProviderType::Memory => {}
    }

    if lower.contains("host=")
        || lower.starts_with("postgres://")
        || lower.starts_with("postgresql://")
        || lower.starts_with("service=")
    {
        return LocationType::RemoteDb;
    }

    // 去掉 `|layername=...` 等 OGR 选项再看扩展名
    let path = lower.split('|').next().unwrap_or(&lower);
    if EMBEDDED_DB_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return LocationType::LocalEmbeddedDb;
    }

    LocationType::LocalFile
}

/// 纯函数式图层分析器
pub struct LayerAnalyzer;

impl LayerAnalyzer {
    pub fn analyze(layer: &LayerRef) -> LayerProfile {
        let location_type = classify_source(layer.provider_type(), &layer.source_uri());
        let profile = LayerProfile {
            layer_id: layer.id().to_string(),
            location_type,
            feature_count: layer.feature_count().unwrap_or(0),
            geometry_complexity: GeometryComplexity::from_avg_vertices(
                layer.avg_vertices_per_feature(),
            ),
            has_spatial_index: layer.has_spatial_index(),
        };
        tracing::debug!(
            "Layer {} profile: {:?}, {} features, complexity {:?}",
            layer.name(),
            profile.location_type,
            profile.feature_count,
            profile.geometry_complexity
        );
        profile
    }

    /// 批量分析（并行）；结果顺序与输入一致
    pub fn analyze_many(layers: &[LayerRef]) -> Vec<LayerProfile> {
        layers.par_iter().map(Self::analyze).collect()
    }
}
