use serde::Serialize;

use crate::config::{OptimizationThresholds, SharedThresholds};
use crate::optimize::analyzer::LayerProfile;

/// 推荐类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OptimizationKind {
    /// 远程目标图层用质心代替完整几何
    UseCentroidDistantLayer,
    /// 源图层用质心代替完整几何
    UseCentroidSourceLayer,
    SimplifyBeforeBuffer,
    ReduceBufferSegments { segments: u32 },
    CreateSpatialIndex,
}

/// 单条优化建议（瞬态，不由核心持久化）
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OptimizationRecommendation {
    #[serde(flatten)]
    pub kind: OptimizationKind,
    pub rationale: String,
    pub auto_applicable: bool,
}

/// 当前过滤配置
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FilterSettingsSnapshot {
    pub user_centroid_enabled: bool,
    pub has_buffer: bool,
    /// 用户显式配置了缓冲样式（端点/段数）
    pub has_buffer_type: bool,
    pub buffer_segments: u32,
    pub is_source_layer: bool,
}

/// 未显式配置缓冲样式时的默认段数
pub const DEFAULT_BUFFER_SEGMENTS: u32 = 5;

/// 优化启发式：只给出建议，不修改任何状态
pub struct OptimizationAdvisor {
    thresholds: SharedThresholds,
}

impl OptimizationAdvisor {
    pub fn new(thresholds: SharedThresholds) -> Self {
        Self { thresholds }
    }

    pub fn with_defaults() -> Self {
        Self::new(crate::config::shared_thresholds(OptimizationThresholds::default()))
    }

    /// 按优先级排序的建议列表；空列表表示"已经是最优"，不是错误
    pub fn recommend(
        &self,
        profile: &LayerProfile,
        settings: &FilterSettingsSnapshot,
    ) -> Vec<OptimizationRecommendation> {
        let t = self.thresholds.load();
        let mut out = Vec::new();

        if profile.location_type.is_remote()
            && profile.feature_count >= t.centroid_distant_threshold
            && !settings.user_centroid_enabled
        {
            let kind = if settings.is_source_layer {
                OptimizationKind::UseCentroidSourceLayer
            } else {
                OptimizationKind::UseCentroidDistantLayer
            };
            out.push(OptimizationRecommendation {
                kind,
                rationale: format!(
                    "{} features on a remote source: comparing centroids instead of full \
                     geometries cuts the geometry volume transferred \
                     for point-in-polygon style tests",
                    profile.feature_count
                ),
                auto_applicable: true,
            });
        }

        if settings.has_buffer && profile.geometry_complexity.is_high() {
            out.push(OptimizationRecommendation {
                kind: OptimizationKind::SimplifyBeforeBuffer,
                rationale: format!(
                    "geometry complexity is {:?}: simplifying before buffering keeps the buffered \
                     source geometry small",
                    profile.geometry_complexity
                ),
                auto_applicable: true,
            });
        }

        let segments = if settings.has_buffer_type {
            settings.buffer_segments
        } else {
            DEFAULT_BUFFER_SEGMENTS
        };
        if settings.has_buffer
            && segments > t.high_buffer_segments
            && profile.feature_count >= t.large_layer_threshold
        {
            out.push(OptimizationRecommendation {
                kind: OptimizationKind::ReduceBufferSegments {
                    segments: t.reduced_buffer_segments,
                },
                rationale: format!(
                    "{} buffer segments on {} features: {} segments per quarter circle \
                     is enough for filtering",
                    segments, profile.feature_count, t.reduced_buffer_segments
                ),
                auto_applicable: true,
            });
        }

        if profile.has_spatial_index == Some(false)
            && profile.feature_count >= t.spatial_index_threshold
        {
            out.push(OptimizationRecommendation {
                kind: OptimizationKind::CreateSpatialIndex,
                rationale: format!(
                    "{} features without a spatial index: \
                     every spatial predicate scans the whole table",
                    profile.feature_count
                ),
                auto_applicable: false,
            });
        }

        if !out.is_empty() {
            tracing::debug!(
                "Advisor: {} recommendation(s) for layer {}",
                out.len(),
                profile.layer_id
            );
        }
        out
    }
}
