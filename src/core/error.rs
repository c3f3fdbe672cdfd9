use thiserror::Error;

use crate::core::backend::{BackendKind, GeometryProviderKey};

/// 过滤编排失败分类。
///
/// 所有变体都在公开入口被转换为 `false` + 日志，不会越过边界传播。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// 图层句柄失效（资源已被并发删除）
    #[error("layer {layer} is no longer valid")]
    LayerInvalid { layer: String },

    /// 谓词回调返回空集合：调用方配置错误，不重试
    #[error("no spatial predicates configured")]
    PredicatesUnavailable,

    /// 上游几何预处理漏掉了该 provider
    #[error("source geometry for {key} missing (backend {backend})")]
    SourceGeometryMissing {
        backend: BackendKind,
        key: GeometryProviderKey,
    },

    #[error("backend {backend} could not build a filter expression")]
    ExpressionBuildFailure { backend: BackendKind },

    #[error("backend {backend} failed to apply filter")]
    BackendExecutionFailure { backend: BackendKind },

    /// 大表不回退到逐行扫描
    #[error(
        "fallback skipped for {backend}: {feature_count} features exceeds {threshold}; \
         add a spatial index, reduce filter scope or raise the backend timeout"
    )]
    FallbackBlocked {
        backend: BackendKind,
        feature_count: u64,
        threshold: u64,
    },

    #[error("fallback via {backend} failed after {primary} failure")]
    FallbackExhausted {
        primary: BackendKind,
        backend: BackendKind,
    },

    #[error("filter task cancelled")]
    Cancelled,

    /// 外部协作者 panic
    #[error("collaborator panicked: {0}")]
    Panicked(String),
}

pub type Result<T> = std::result::Result<T, FilterError>;
