use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;

use crate::cache::GeometryCache;
use crate::config::{OptimizationThresholds, SharedThresholds};
use crate::core::{
    BackendFactory, BackendKind, BackendPort, FilterError, FilterTaskContext, GeometryProviderKey,
    LayerProps, LayerRef, ProviderType, Result, SourceGeometry, SourceGeometrySet,
    SpatialPredicate,
};
use crate::filter::subset::{self, SubsetStrategy};

/// 惰性谓词来源：每次编排调用时求值一次，绝不跨调用缓存
pub type PredicateSource = Arc<dyn Fn() -> Vec<SpatialPredicate> + Send + Sync>;

/// 后端原生过滤表达式构建器（外部协作者）。返回 None 或空串表示构建失败。
pub trait ExpressionBuilder: Send + Sync {
    fn build(
        &self,
        backend: &dyn BackendPort,
        props: &LayerProps,
        geometry: &SourceGeometry,
        predicates: &[SpatialPredicate],
    ) -> Option<String>;
}

/// 解析出的后端：实例 + 规范名 + 所需几何项
pub struct BackendSelection {
    pub backend: Box<dyn BackendPort>,
    pub kind: BackendKind,
    pub geometry_key: GeometryProviderKey,
}

/// 单图层过滤成功时的结果
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FilterOutcome {
    pub backend: BackendKind,
    pub used_fallback: bool,
    pub warnings: Vec<String>,
}

/// 回退触发原因
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FallbackReason {
    BuildFailure,
    ExecutionFailure,
}

impl FallbackReason {
    fn as_str(self) -> &'static str {
        match self {
            FallbackReason::BuildFailure => "expression build failure",
            FallbackReason::ExecutionFailure => "execution failure",
        }
    }
}

/// 一次编排调用里在各步骤间传递的只读输入
struct Attempt<'a> {
    ctx: &'a FilterTaskContext,
    layer: &'a LayerRef,
    props: &'a LayerProps,
    geometries: &'a SourceGeometrySet,
    builder: &'a dyn ExpressionBuilder,
    predicates: &'a [SpatialPredicate],
    /// 清理后的当前过滤（损坏文本已排队清空 → None）
    current_subset: Option<String>,
}

/// 几何过滤编排器：后端选择 → 源几何 → 表达式 → 合并策略 → 执行 → 回退。
///
/// 公开入口永不 panic / 不返回错误到调用方：所有失败都变成 `false` + 日志。
pub struct FilterOrchestrator {
    factory: Arc<dyn BackendFactory>,
    predicates: PredicateSource,
    cache: Option<Arc<GeometryCache>>,
    thresholds: SharedThresholds,
}

impl FilterOrchestrator {
    pub fn new(factory: Arc<dyn BackendFactory>, predicates: PredicateSource) -> Self {
        Self {
            factory,
            predicates,
            cache: None,
            thresholds: crate::config::shared_thresholds(OptimizationThresholds::default()),
        }
    }

    pub fn with_cache(mut self, cache: Arc<GeometryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_thresholds(mut self, thresholds: SharedThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn cache(&self) -> Option<&Arc<GeometryCache>> {
        self.cache.as_ref()
    }

    /// 对单个图层应用几何过滤；任何失败都返回 false
    pub fn orchestrate_geometric_filter(
        &self,
        ctx: &FilterTaskContext,
        layer: &LayerRef,
        provider: ProviderType,
        props: &LayerProps,
        geometries: &SourceGeometrySet,
        builder: &dyn ExpressionBuilder,
    ) -> bool {
        self.orchestrate_detailed(ctx, layer, provider, props, geometries, builder)
            .is_ok()
    }

    /// 与 `orchestrate_geometric_filter` 相同，但保留失败类别
    pub fn orchestrate_detailed(
        &self,
        ctx: &FilterTaskContext,
        layer: &LayerRef,
        provider: ProviderType,
        props: &LayerProps,
        geometries: &SourceGeometrySet,
        builder: &dyn ExpressionBuilder,
    ) -> Result<FilterOutcome> {
        let mut warnings = Vec::new();
        let (backend, used_fallback) = self.orchestrate_collecting(
            ctx,
            layer,
            provider,
            props,
            geometries,
            builder,
            &mut warnings,
        )?;
        Ok(FilterOutcome {
            backend,
            used_fallback,
            warnings,
        })
    }

    /// 成功与失败路径都把本图层的后端告警追加到 `warnings`（同时写入 ctx）
    #[allow(clippy::too_many_arguments)]
    pub fn orchestrate_collecting(
        &self,
        ctx: &FilterTaskContext,
        layer: &LayerRef,
        provider: ProviderType,
        props: &LayerProps,
        geometries: &SourceGeometrySet,
        builder: &dyn ExpressionBuilder,
        warnings: &mut Vec<String>,
    ) -> Result<(BackendKind, bool)> {
        let start = warnings.len();
        let result = catch_unwind(AssertUnwindSafe(|| {
            self.try_orchestrate(ctx, layer, provider, props, geometries, builder, warnings)
        }))
        .unwrap_or_else(|payload| Err(FilterError::Panicked(panic_message(payload.as_ref()))));

        for w in &warnings[start..] {
            ctx.push_warning(w.clone());
        }

        match result {
            Ok((backend, used_fallback)) => {
                tracing::info!(
                    "Filter applied on {} via {}{}",
                    props.layer_name,
                    backend,
                    if used_fallback { " (fallback)" } else { "" }
                );
                Ok((backend, used_fallback))
            }
            Err(e) => {
                match &e {
                    FilterError::SourceGeometryMissing { .. } | FilterError::Panicked(_) => {
                        tracing::error!("Filter failed on {}: {}", props.layer_name, e)
                    }
                    FilterError::Cancelled => {
                        tracing::info!("Filter on {} cancelled", props.layer_name)
                    }
                    _ => tracing::warn!("Filter failed on {}: {}", props.layer_name, e),
                }
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn try_orchestrate(
        &self,
        ctx: &FilterTaskContext,
        layer: &LayerRef,
        provider: ProviderType,
        props: &LayerProps,
        geometries: &SourceGeometrySet,
        builder: &dyn ExpressionBuilder,
        warnings: &mut Vec<String>,
    ) -> Result<(BackendKind, bool)> {
        // 1) 图层句柄
        if ctx.is_cancelled() {
            return Err(FilterError::Cancelled);
        }
        if !layer.is_valid() {
            return Err(FilterError::LayerInvalid {
                layer: layer.id().to_string(),
            });
        }

        // 2) 谓词：每次调用重新求值
        let predicates = (self.predicates)();
        if predicates.is_empty() {
            return Err(FilterError::PredicatesUnavailable);
        }

        // 3) 后端选择
        let selection = self.select_backend(ctx, layer, provider, warnings);
        ctx.record_actual_backend(layer.id(), selection.kind);

        // 4) 源几何
        let geometry = self.source_geometry(geometries, selection.kind, selection.geometry_key)?;

        // 5) 损坏过滤清理
        let current_subset = clean_corrupted_subset(ctx, layer);

        let attempt = Attempt {
            ctx,
            layer,
            props,
            geometries,
            builder,
            predicates: &predicates,
            current_subset,
        };

        // 6) 构建表达式
        let expression = match build_expression(&attempt, selection.backend.as_ref(), &geometry) {
            Some(expr) => expr,
            None => {
                if selection.kind == BackendKind::Ogr {
                    return Err(FilterError::ExpressionBuildFailure {
                        backend: selection.kind,
                    });
                }
                tracing::warn!(
                    "Backend {} could not build an expression for {}, falling back to OGR",
                    selection.kind,
                    props.layer_name
                );
                return self
                    .run_fallback(&attempt, selection.kind, FallbackReason::BuildFailure, warnings)
                    .map(|kind| (kind, true));
            }
        };

        // 7) 合并策略
        let strategy = attempt_strategy(&attempt);

        // 8) 执行
        if ctx.is_cancelled() {
            return Err(FilterError::Cancelled);
        }
        let ok = execute(&attempt, selection.backend.as_ref(), &expression, &strategy, warnings);
        if ok {
            return Ok((selection.kind, false));
        }

        // 9) 执行失败回退
        if !selection.kind.supports_execution_fallback() {
            return Err(FilterError::BackendExecutionFailure {
                backend: selection.kind,
            });
        }
        self.check_fallback_guard(layer, selection.kind)?;
        tracing::warn!(
            "Backend {} failed on {}, falling back to OGR",
            selection.kind,
            props.layer_name
        );
        self.run_fallback(&attempt, selection.kind, FallbackReason::ExecutionFailure, warnings)
            .map(|kind| (kind, true))
    }

    /// 强制后端优先于原生 provider；工厂返回的后端与强制值不一致时只告警
    pub fn select_backend(
        &self,
        ctx: &FilterTaskContext,
        layer: &LayerRef,
        provider: ProviderType,
        warnings: &mut Vec<String>,
    ) -> BackendSelection {
        let forced = ctx.forced_backend(layer.id());
        let effective = forced.map(BackendKind::provider_type).unwrap_or(provider);

        let backend = self.factory.get_backend(effective, layer, ctx, false);
        let kind = backend.kind();

        if let Some(requested) = forced {
            if requested != kind {
                let msg = format!(
                    "Layer {} does not support forced backend {}, using {}",
                    layer.name(),
                    requested,
                    kind
                );
                tracing::warn!("{}", msg);
                warnings.push(msg);
            } else {
                tracing::debug!("Using forced backend {} for {}", kind, layer.name());
            }
        }

        BackendSelection {
            backend,
            kind,
            geometry_key: kind.geometry_provider(),
        }
    }

    /// 取出（必要时经缓存解析）后端所需的源几何
    fn source_geometry(
        &self,
        geometries: &SourceGeometrySet,
        backend: BackendKind,
        key: GeometryProviderKey,
    ) -> Result<SourceGeometry> {
        let missing = || {
            tracing::error!(
                "Source geometry for provider {} missing (backend {}): \
                 geometry preparation skipped upstream",
                key,
                backend
            );
            FilterError::SourceGeometryMissing { backend, key }
        };

        match geometries.get(key) {
            None => Err(missing()),
            Some(SourceGeometry::Deferred(d)) => match d.resolve(self.cache.as_deref()) {
                Some((wkt, srid)) if !wkt.trim().is_empty() => {
                    Ok(SourceGeometry::Wkt { wkt, srid })
                }
                _ => Err(missing()),
            },
            Some(g) => Ok(g.clone()),
        }
    }

    /// PostgreSQL 大表：逐行 OGR 扫描比直接失败更糟，跳过回退
    fn check_fallback_guard(&self, layer: &LayerRef, backend: BackendKind) -> Result<()> {
        let threshold = self.thresholds.load().large_remote_fallback_threshold;
        if backend == BackendKind::Postgresql && layer.provider_type() == ProviderType::Postgres {
            if let Some(count) = layer.feature_count() {
                if count > threshold {
                    return Err(FilterError::FallbackBlocked {
                        backend,
                        feature_count: count,
                        threshold,
                    });
                }
            }
        }
        Ok(())
    }

    /// 两种回退共用：显式解析 OGR 后端（绕过强制后端逻辑），重新构建与执行。失败即终止。
    fn run_fallback(
        &self,
        attempt: &Attempt<'_>,
        primary: BackendKind,
        reason: FallbackReason,
        warnings: &mut Vec<String>,
    ) -> Result<BackendKind> {
        if attempt.ctx.is_cancelled() {
            return Err(FilterError::Cancelled);
        }

        let backend = self
            .factory
            .get_backend(ProviderType::Ogr, attempt.layer, attempt.ctx, true);
        let kind = backend.kind();
        if kind != BackendKind::Ogr {
            tracing::warn!("Backend factory returned {} for a forced OGR fallback", kind);
        }

        let geometry = self.source_geometry(attempt.geometries, kind, kind.geometry_provider())?;
        let exhausted = FilterError::FallbackExhausted {
            primary,
            backend: kind,
        };

        let Some(expression) = build_expression(attempt, backend.as_ref(), &geometry) else {
            tracing::warn!(
                "Fallback ({}) could not build an expression for {}",
                reason.as_str(),
                attempt.props.layer_name
            );
            return Err(exhausted);
        };

        // 后端变化后旧过滤的语义可能不同，重新判定
        let strategy = attempt_strategy(attempt);
        if execute(attempt, backend.as_ref(), &expression, &strategy, warnings) {
            attempt.ctx.record_actual_backend(attempt.layer.id(), kind);
            tracing::info!(
                "Fallback ({}) to {} succeeded for {}",
                reason.as_str(),
                kind,
                attempt.props.layer_name
            );
            Ok(kind)
        } else {
            Err(exhausted)
        }
    }
}

fn build_expression(
    attempt: &Attempt<'_>,
    backend: &dyn BackendPort,
    geometry: &SourceGeometry,
) -> Option<String> {
    attempt
        .builder
        .build(backend, attempt.props, geometry, attempt.predicates)
        .filter(|e| !e.trim().is_empty())
}

fn attempt_strategy(attempt: &Attempt<'_>) -> SubsetStrategy {
    let strategy = subset::subset_strategy(
        attempt.current_subset.as_deref(),
        attempt.ctx.combine_operator(),
    );
    // 缓存配置的算子（供结果缓存键复用），与本次是否真正合并无关
    attempt
        .ctx
        .set_current_combine_operator(Some(attempt.ctx.combine_operator()));
    tracing::debug!(
        "Subset strategy for {}: {}",
        attempt.props.layer_name,
        match strategy.combine {
            Some(op) => format!("combine with {}", op),
            None => "replace".to_string(),
        }
    );
    strategy
}

fn execute(
    attempt: &Attempt<'_>,
    backend: &dyn BackendPort,
    expression: &str,
    strategy: &SubsetStrategy,
    warnings: &mut Vec<String>,
) -> bool {
    let ok = backend.apply_filter(
        attempt.layer,
        expression,
        strategy.previous.as_deref(),
        strategy.combine,
    );
    warnings.extend(backend.warnings());
    ok
}

/// 含子查询标记但结构不完整的旧过滤：排队清空，不尝试修复
fn clean_corrupted_subset(ctx: &FilterTaskContext, layer: &LayerRef) -> Option<String> {
    let current = layer.subset_string();
    if current.trim().is_empty() {
        return None;
    }
    if subset::is_corrupted(&current) {
        tracing::warn!(
            "Clearing corrupted subset on {}: {} chars",
            layer.name(),
            current.len()
        );
        ctx.queue_subset(layer, "");
        return None;
    }
    Some(current)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
