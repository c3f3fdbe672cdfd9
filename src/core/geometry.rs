use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::cache::GeometryCache;
use crate::core::backend::GeometryProviderKey;
use crate::core::layer::LayerRef;

/// 延迟计算 WKT 的闭包：返回 (wkt, srid)，失败返回 None
pub type WktComputeFn = Arc<dyn Fn() -> Option<(String, i32)> + Send + Sync>;

/// 尚未序列化的源几何：首次需要时经由 GeometryCache 计算
#[derive(Clone)]
pub struct DeferredWkt {
    pub cache_key: String,
    pub source_layer_id: String,
    pub compute: WktComputeFn,
}

impl DeferredWkt {
    pub fn new(
        cache_key: impl Into<String>,
        source_layer_id: impl Into<String>,
        compute: WktComputeFn,
    ) -> Self {
        Self {
            cache_key: cache_key.into(),
            source_layer_id: source_layer_id.into(),
            compute,
        }
    }

    /// 有缓存走缓存，否则直接计算
    pub fn resolve(&self, cache: Option<&GeometryCache>) -> Option<(Arc<str>, i32)> {
        match cache {
            Some(c) => {
                c.get_or_compute(&self.cache_key, || (self.compute)(), &self.source_layer_id)
            }
            None => (self.compute)().map(|(wkt, srid)| (Arc::from(wkt), srid)),
        }
    }
}

/// 某个后端族所需的源几何（不透明载荷）
#[derive(Clone)]
pub enum SourceGeometry {
    /// 数据库原生几何表达式（如 `ST_GeomFromText(...)`）
    Sql(String),
    Wkt { wkt: Arc<str>, srid: i32 },
    /// 承载源几何的图层原生对象（OGR / memory 后端）
    Layer(LayerRef),
    Deferred(DeferredWkt),
}

impl SourceGeometry {
    pub fn is_empty(&self) -> bool {
        match self {
            SourceGeometry::Sql(s) => s.trim().is_empty(),
            SourceGeometry::Wkt { wkt, .. } => wkt.trim().is_empty(),
            SourceGeometry::Layer(l) => !l.is_valid() || l.feature_count() == Some(0),
            SourceGeometry::Deferred(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SourceGeometry::Sql(s) => Some(s.as_str()),
            SourceGeometry::Wkt { wkt, .. } => Some(&**wkt),
            _ => None,
        }
    }
}

impl fmt::Debug for SourceGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceGeometry::Sql(s) => write!(f, "Sql({} chars)", s.len()),
            SourceGeometry::Wkt { wkt, srid } => {
                write!(f, "Wkt({} chars, srid={})", wkt.len(), srid)
            }
            SourceGeometry::Layer(l) => write!(f, "Layer({})", l.id()),
            SourceGeometry::Deferred(d) => write!(f, "Deferred({})", d.cache_key),
        }
    }
}

/// 每个后端族一份预处理好的源几何；编排器只读
#[derive(Clone, Debug, Default)]
pub struct SourceGeometrySet {
    entries: HashMap<GeometryProviderKey, SourceGeometry>,
}

impl SourceGeometrySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: GeometryProviderKey, geom: SourceGeometry) -> Self {
        self.entries.insert(key, geom);
        self
    }

    pub fn insert(&mut self, key: GeometryProviderKey, geom: SourceGeometry) {
        self.entries.insert(key, geom);
    }

    /// 空载荷视为缺失
    pub fn get(&self, key: GeometryProviderKey) -> Option<&SourceGeometry> {
        self.entries.get(&key).filter(|g| !g.is_empty())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
