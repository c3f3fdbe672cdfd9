use std::sync::Arc;

use crate::core::{
    FilterError, FilterTaskContext, LayerProps, LayerRef, ProviderType, SourceGeometrySet,
};
use crate::filter::orchestrator::{ExpressionBuilder, FilterOrchestrator};
use crate::stats::{LayerReport, TaskReport};

/// 一个待过滤的目标图层
#[derive(Clone)]
pub struct LayerJob {
    pub layer: LayerRef,
    pub provider: ProviderType,
    pub props: LayerProps,
}

impl LayerJob {
    pub fn new(layer: LayerRef, props: LayerProps) -> Self {
        let provider = layer.provider_type();
        Self {
            layer,
            provider,
            props,
        }
    }
}

/// 一次过滤调用：单个 worker 顺序处理多个图层，轮询取消信号。
///
/// 单个图层失败不会中止其余图层；过滤变更经 ctx 的排队回调按图层顺序投递。
pub struct FilterTask {
    orchestrator: Arc<FilterOrchestrator>,
    ctx: Arc<FilterTaskContext>,
    builder: Arc<dyn ExpressionBuilder>,
    geometries: Arc<SourceGeometrySet>,
}

impl FilterTask {
    pub fn new(
        orchestrator: Arc<FilterOrchestrator>,
        ctx: Arc<FilterTaskContext>,
        builder: Arc<dyn ExpressionBuilder>,
        geometries: Arc<SourceGeometrySet>,
    ) -> Self {
        Self {
            orchestrator,
            ctx,
            builder,
            geometries,
        }
    }

    pub fn context(&self) -> &Arc<FilterTaskContext> {
        &self.ctx
    }

    pub fn run(&self, jobs: &[LayerJob]) -> TaskReport {
        let mut report = TaskReport::default();

        for (i, job) in jobs.iter().enumerate() {
            if self.ctx.is_cancelled() {
                report.cancelled = true;
                report.skipped = jobs.len() - i;
                break;
            }

            let mut warnings = Vec::new();
            let result = self.orchestrator.orchestrate_collecting(
                &self.ctx,
                &job.layer,
                job.provider,
                &job.props,
                &self.geometries,
                self.builder.as_ref(),
                &mut warnings,
            );

            let backend = self.ctx.actual_backend(job.layer.id());
            match result {
                Ok((backend, used_fallback)) => report.layers.push(LayerReport {
                    layer_id: job.layer.id().to_string(),
                    layer_name: job.props.layer_name.clone(),
                    success: true,
                    backend: Some(backend),
                    used_fallback,
                    error: None,
                    warnings,
                }),
                Err(FilterError::Cancelled) => {
                    report.cancelled = true;
                    report.skipped = jobs.len() - i;
                    break;
                }
                Err(e) => report.layers.push(LayerReport {
                    layer_id: job.layer.id().to_string(),
                    layer_name: job.props.layer_name.clone(),
                    success: false,
                    backend,
                    used_fallback: matches!(e, FilterError::FallbackExhausted { .. }),
                    error: Some(e.to_string()),
                    warnings,
                }),
            }
        }

        if report.cancelled {
            tracing::info!(
                "Filter task cancelled: {} done, {} skipped",
                report.layers.len(),
                report.skipped
            );
        } else {
            tracing::info!(
                "Filter task finished: {} ok, {} failed",
                report.succeeded(),
                report.failed()
            );
        }
        report
    }

    /// 在专用线程上运行
    pub fn spawn(
        self,
        jobs: Vec<LayerJob>,
    ) -> std::io::Result<std::thread::JoinHandle<TaskReport>> {
        std::thread::Builder::new()
            .name("geofilter-task".to_string())
            .spawn(move || self.run(&jobs))
    }

    /// 在 tokio 阻塞线程池上运行
    pub async fn run_async(self: Arc<Self>, jobs: Vec<LayerJob>) -> anyhow::Result<TaskReport> {
        let report = tokio::task::spawn_blocking(move || self.run(&jobs)).await?;
        Ok(report)
    }
}
