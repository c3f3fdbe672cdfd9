use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::context::FilterTaskContext;
use crate::core::layer::{LayerRef, ProviderType};

/// 已知后端的封闭集合（按枚举选择，编译期穷尽）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Postgresql,
    Spatialite,
    /// 通用文件驱动：所有回退路径的终点
    Ogr,
    Memory,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Postgresql => "postgresql",
            BackendKind::Spatialite => "spatialite",
            BackendKind::Ogr => "ogr",
            BackendKind::Memory => "memory",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" | "postgis" => Some(BackendKind::Postgresql),
            "spatialite" | "sqlite" => Some(BackendKind::Spatialite),
            "ogr" | "generic-file" => Some(BackendKind::Ogr),
            "memory" => Some(BackendKind::Memory),
            _ => None,
        }
    }

    /// 该后端需要 `SourceGeometrySet` 中的哪一项
    pub fn geometry_provider(self) -> GeometryProviderKey {
        match self {
            BackendKind::Postgresql => GeometryProviderKey::Postgresql,
            BackendKind::Spatialite => GeometryProviderKey::Spatialite,
            BackendKind::Ogr | BackendKind::Memory => GeometryProviderKey::Ogr,
        }
    }

    /// 强制后端时用于工厂查找的 provider 类型
    pub fn provider_type(self) -> ProviderType {
        match self {
            BackendKind::Postgresql => ProviderType::Postgres,
            BackendKind::Spatialite => ProviderType::Spatialite,
            BackendKind::Ogr => ProviderType::Ogr,
            BackendKind::Memory => ProviderType::Memory,
        }
    }

    /// 执行失败后是否允许回退到 OGR（仅数据库家族）
    pub fn supports_execution_fallback(self) -> bool {
        matches!(self, BackendKind::Postgresql | BackendKind::Spatialite)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 源几何的表示族
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryProviderKey {
    /// 数据库原生几何文本（PostGIS SQL）
    Postgresql,
    /// WKT 文本
    Spatialite,
    /// 图层原生几何对象
    Ogr,
}

impl fmt::Display for GeometryProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GeometryProviderKey::Postgresql => "postgresql",
            GeometryProviderKey::Spatialite => "spatialite",
            GeometryProviderKey::Ogr => "ogr",
        };
        f.write_str(s)
    }
}

/// 新过滤与已有过滤的合并算子
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombineOperator {
    #[default]
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
    #[serde(rename = "AND NOT")]
    AndNot,
}

impl CombineOperator {
    pub fn as_sql(self) -> &'static str {
        match self {
            CombineOperator::And => "AND",
            CombineOperator::Or => "OR",
            CombineOperator::AndNot => "AND NOT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let norm = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match norm.to_ascii_uppercase().as_str() {
            "AND" => Some(CombineOperator::And),
            "OR" => Some(CombineOperator::Or),
            "AND NOT" => Some(CombineOperator::AndNot),
            _ => None,
        }
    }
}

impl fmt::Display for CombineOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// 存储引擎适配器（每个后端一个实现）。
///
/// ## 契约
/// - `apply_filter` 同步执行；超时等由后端自行处理，以 `false` 表示失败。
/// - `combine` 为 None 时新表达式直接替换旧过滤，`previous` 仅作结果缓存关联。
/// - `warnings` 在任意调用后读取，返回非致命告警。
pub trait BackendPort: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn name(&self) -> &str {
        self.kind().name()
    }

    fn apply_filter(
        &self,
        layer: &LayerRef,
        expression: &str,
        previous: Option<&str>,
        combine: Option<CombineOperator>,
    ) -> bool;

    fn warnings(&self) -> Vec<String> {
        Vec::new()
    }
}

/// 后端工厂（由宿主提供）：按有效 provider 类型解析后端实例
pub trait BackendFactory: Send + Sync {
    /// `force_ogr` 为 true 时必须返回 OGR 后端（回退路径使用）
    fn get_backend(
        &self,
        provider: ProviderType,
        layer: &LayerRef,
        ctx: &FilterTaskContext,
        force_ogr: bool,
    ) -> Box<dyn BackendPort>;
}
