use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// 图层数据源的原生 provider 类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// 网络关系/空间数据库（PostgreSQL/PostGIS）
    Postgres,
    /// 本地嵌入式空间数据库（Spatialite / GeoPackage）
    Spatialite,
    /// 通用表格/文件驱动（OGR）
    Ogr,
    /// 内存图层
    Memory,
}

impl ProviderType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderType::Postgres => "postgres",
            ProviderType::Spatialite => "spatialite",
            ProviderType::Ogr => "ogr",
            ProviderType::Memory => "memory",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "postgis" => Some(ProviderType::Postgres),
            "spatialite" | "sqlite" | "gpkg" | "geopackage" => Some(ProviderType::Spatialite),
            "ogr" => Some(ProviderType::Ogr),
            "memory" => Some(ProviderType::Memory),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 矢量图层句柄抽象（由宿主应用实现）。
///
/// ## 契约
/// - `is_valid` 为 false 表示底层资源已被并发删除，句柄不可再使用。
/// - `set_subset_string` 只允许在图层所属（UI）上下文调用；后台 worker 必须走排队回调。
pub trait VectorLayer: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn is_valid(&self) -> bool;
    fn provider_type(&self) -> ProviderType;
    /// 数据源描述：文件路径 / 连接串 / 服务 URL
    fn source_uri(&self) -> String;
    /// 要素数量；未知时为 None
    fn feature_count(&self) -> Option<u64>;
    /// 当前生效的过滤表达式（无过滤时为空串）
    fn subset_string(&self) -> String;
    fn set_subset_string(&self, subset: &str) -> bool;
    /// 每个要素的平均顶点数（采样估计）
    fn avg_vertices_per_feature(&self) -> Option<f64> {
        None
    }
    fn has_spatial_index(&self) -> Option<bool> {
        None
    }
}

pub type LayerRef = Arc<dyn VectorLayer>;

/// 表达式构建器需要的图层元数据
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LayerProps {
    pub layer_name: String,
    pub schema: Option<String>,
    pub table: Option<String>,
    pub primary_key: Option<String>,
    pub geometry_field: Option<String>,
    pub srid: Option<i32>,
    /// 其他 provider 相关的键值
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl LayerProps {
    pub fn new(layer_name: impl Into<String>) -> Self {
        Self {
            layer_name: layer_name.into(),
            ..Default::default()
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }
}
