//! 测试用的脚本化协作者：图层 / 后端 / 工厂 / 表达式构建器。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{
    BackendFactory, BackendKind, BackendPort, CombineOperator, FilterTaskContext,
    GeometryProviderKey, LayerProps, LayerRef, ProviderType, SourceGeometry, SourceGeometrySet,
    SpatialPredicate, VectorLayer,
};
use crate::filter::ExpressionBuilder;

pub struct MockLayer {
    id: String,
    valid: AtomicBool,
    provider: ProviderType,
    uri: String,
    feature_count: Option<u64>,
    subset: Mutex<String>,
    avg_vertices: Option<f64>,
    spatial_index: Option<bool>,
}

impl MockLayer {
    pub fn new(id: &str, provider: ProviderType, uri: &str, feature_count: u64) -> Self {
        Self {
            id: id.to_string(),
            valid: AtomicBool::new(true),
            provider,
            uri: uri.to_string(),
            feature_count: Some(feature_count),
            subset: Mutex::new(String::new()),
            avg_vertices: None,
            spatial_index: None,
        }
    }

    pub fn postgres(id: &str, feature_count: u64) -> Self {
        let uri = format!(
            "dbname='gis' host=db.example.org port=5432 table=\"public\".\"{id}\" (geom)"
        );
        Self::new(id, ProviderType::Postgres, &uri, feature_count)
    }

    pub fn spatialite(id: &str, feature_count: u64) -> Self {
        let uri = format!("/data/{id}.sqlite|layername={id}");
        Self::new(id, ProviderType::Spatialite, &uri, feature_count)
    }

    pub fn ogr(id: &str, feature_count: u64) -> Self {
        let uri = format!("/data/{id}.shp");
        Self::new(id, ProviderType::Ogr, &uri, feature_count)
    }

    pub fn memory(id: &str, feature_count: u64) -> Self {
        let uri = format!("Polygon?crs=EPSG:4326&uid={id}");
        Self::new(id, ProviderType::Memory, &uri, feature_count)
    }

    pub fn with_subset(self, subset: &str) -> Self {
        *self.subset.lock() = subset.to_string();
        self
    }

    pub fn with_uri(mut self, uri: &str) -> Self {
        self.uri = uri.to_string();
        self
    }

    pub fn with_unknown_count(mut self) -> Self {
        self.feature_count = None;
        self
    }

    pub fn with_vertices(mut self, avg: f64) -> Self {
        self.avg_vertices = Some(avg);
        self
    }

    pub fn with_spatial_index(mut self, has: bool) -> Self {
        self.spatial_index = Some(has);
        self
    }

    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    pub fn into_ref(self) -> LayerRef {
        Arc::new(self)
    }
}

impl VectorLayer for MockLayer {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn provider_type(&self) -> ProviderType {
        self.provider
    }

    fn source_uri(&self) -> String {
        self.uri.clone()
    }

    fn feature_count(&self) -> Option<u64> {
        self.feature_count
    }

    fn subset_string(&self) -> String {
        self.subset.lock().clone()
    }

    fn set_subset_string(&self, subset: &str) -> bool {
        *self.subset.lock() = subset.to_string();
        true
    }

    fn avg_vertices_per_feature(&self) -> Option<f64> {
        self.avg_vertices
    }

    fn has_spatial_index(&self) -> Option<bool> {
        self.spatial_index
    }
}

/// 一次 apply_filter 调用记录
#[derive(Clone, Debug)]
pub struct ApplyCall {
    pub layer_id: String,
    pub kind: BackendKind,
    pub expression: String,
    pub previous: Option<String>,
    pub combine: Option<CombineOperator>,
}

struct MockBackend {
    kind: BackendKind,
    succeed: bool,
    warnings: Vec<String>,
    calls: Arc<Mutex<Vec<ApplyCall>>>,
}

impl BackendPort for MockBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn apply_filter(
        &self,
        layer: &LayerRef,
        expression: &str,
        previous: Option<&str>,
        combine: Option<CombineOperator>,
    ) -> bool {
        self.calls.lock().push(ApplyCall {
            layer_id: layer.id().to_string(),
            kind: self.kind,
            expression: expression.to_string(),
            previous: previous.map(str::to_string),
            combine,
        });
        self.succeed
    }

    fn warnings(&self) -> Vec<String> {
        self.warnings.clone()
    }
}

/// 按 provider 类型返回脚本化后端
pub struct MockFactory {
    remap: HashMap<ProviderType, BackendKind>,
    failing: HashSet<BackendKind>,
    warnings: HashMap<BackendKind, Vec<String>>,
    requests: Mutex<Vec<(ProviderType, bool)>>,
    calls: Arc<Mutex<Vec<ApplyCall>>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self {
            remap: HashMap::new(),
            failing: HashSet::new(),
            warnings: HashMap::new(),
            requests: Mutex::new(Vec::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 模拟图层不支持某后端：该 provider 解析成别的后端
    pub fn remap(mut self, provider: ProviderType, kind: BackendKind) -> Self {
        self.remap.insert(provider, kind);
        self
    }

    pub fn failing(mut self, kind: BackendKind) -> Self {
        self.failing.insert(kind);
        self
    }

    pub fn warning(mut self, kind: BackendKind, warning: &str) -> Self {
        self.warnings.entry(kind).or_default().push(warning.to_string());
        self
    }

    pub fn requested_providers(&self) -> Vec<(ProviderType, bool)> {
        self.requests.lock().clone()
    }

    pub fn calls(&self) -> Vec<ApplyCall> {
        self.calls.lock().clone()
    }

    pub fn applied_backends(&self) -> Vec<BackendKind> {
        self.calls.lock().iter().map(|c| c.kind).collect()
    }
}

impl BackendFactory for MockFactory {
    fn get_backend(
        &self,
        provider: ProviderType,
        _layer: &LayerRef,
        _ctx: &FilterTaskContext,
        force_ogr: bool,
    ) -> Box<dyn BackendPort> {
        self.requests.lock().push((provider, force_ogr));
        let kind = if force_ogr {
            BackendKind::Ogr
        } else if let Some(k) = self.remap.get(&provider) {
            *k
        } else {
            match provider {
                ProviderType::Postgres => BackendKind::Postgresql,
                ProviderType::Spatialite => BackendKind::Spatialite,
                ProviderType::Ogr => BackendKind::Ogr,
                ProviderType::Memory => BackendKind::Memory,
            }
        };
        Box::new(MockBackend {
            kind,
            succeed: !self.failing.contains(&kind),
            warnings: self.warnings.get(&kind).cloned().unwrap_or_default(),
            calls: self.calls.clone(),
        })
    }
}

/// 对失败集合里的后端返回 None，其余返回 `<backend>:<predicates>`
pub struct MockBuilder {
    failing: HashSet<BackendKind>,
    panicking: HashSet<BackendKind>,
    seen: Mutex<Vec<(GeometryProviderKey, Vec<SpatialPredicate>)>>,
}

impl MockBuilder {
    pub fn new() -> Self {
        Self {
            failing: HashSet::new(),
            panicking: HashSet::new(),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self, kind: BackendKind) -> Self {
        self.failing.insert(kind);
        self
    }

    pub fn panicking(mut self, kind: BackendKind) -> Self {
        self.panicking.insert(kind);
        self
    }

    pub fn geometry_keys(&self) -> Vec<GeometryProviderKey> {
        self.seen.lock().iter().map(|(k, _)| *k).collect()
    }

    pub fn predicates_seen(&self) -> Vec<Vec<SpatialPredicate>> {
        self.seen.lock().iter().map(|(_, p)| p.clone()).collect()
    }
}

impl ExpressionBuilder for MockBuilder {
    fn build(
        &self,
        backend: &dyn BackendPort,
        _props: &LayerProps,
        _geometry: &SourceGeometry,
        predicates: &[SpatialPredicate],
    ) -> Option<String> {
        let kind = backend.kind();
        self.seen
            .lock()
            .push((kind.geometry_provider(), predicates.to_vec()));
        if self.panicking.contains(&kind) {
            panic!("builder exploded on {kind}");
        }
        if self.failing.contains(&kind) {
            return None;
        }
        let preds = predicates
            .iter()
            .map(|p| p.sql_function())
            .collect::<Vec<_>>()
            .join(",");
        Some(format!("{}:{}", kind, preds))
    }
}

/// 三个后端族都齐全的源几何
pub fn all_geometries() -> SourceGeometrySet {
    let source = MockLayer::memory("source_geom", 1).into_ref();
    SourceGeometrySet::new()
        .with(
            GeometryProviderKey::Postgresql,
            SourceGeometry::Sql("ST_GeomFromText('POINT(0 0)', 4326)".to_string()),
        )
        .with(
            GeometryProviderKey::Spatialite,
            SourceGeometry::Wkt {
                wkt: "POINT(0 0)".into(),
                srid: 4326,
            },
        )
        .with(GeometryProviderKey::Ogr, SourceGeometry::Layer(source))
}
