use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::core::backend::{BackendKind, CombineOperator};
use crate::core::layer::LayerRef;

/// 排队应用回调：把 (layer, subset) 投递到图层所属上下文后立即返回
pub type QueuedApply = Arc<dyn Fn(&LayerRef, &str) + Send + Sync>;

/// 取消信号（由所属任务持有，编排器轮询）
#[derive(Clone, Debug, Default)]
pub struct CancellationHandle(Arc<AtomicBool>);

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// 待 UI 上下文应用的过滤变更
pub struct SubsetRequest {
    pub layer: LayerRef,
    pub subset: String,
}

impl fmt::Debug for SubsetRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubsetRequest")
            .field("layer", &self.layer.id())
            .field("subset", &self.subset)
            .finish()
    }
}

/// 单生产者（编排器）/ 单消费者（UI）队列的消费端
pub struct SubsetQueueReceiver {
    rx: Receiver<SubsetRequest>,
}

impl SubsetQueueReceiver {
    /// 取出当前所有待处理请求（FIFO）
    pub fn drain(&self) -> Vec<SubsetRequest> {
        self.rx.try_iter().collect()
    }

    /// 在所属上下文上逐条应用，返回成功条数
    pub fn apply_pending(&self) -> usize {
        let mut applied = 0;
        for req in self.rx.try_iter() {
            if !req.layer.is_valid() {
                tracing::debug!("Skip queued subset for removed layer {}", req.layer.id());
                continue;
            }
            if req.layer.set_subset_string(&req.subset) {
                applied += 1;
            } else {
                tracing::warn!("Failed to apply queued subset on layer {}", req.layer.id());
            }
        }
        applied
    }
}

/// 基于 crossbeam channel 的排队回调
pub fn subset_queue() -> (QueuedApply, SubsetQueueReceiver) {
    let (tx, rx): (Sender<SubsetRequest>, Receiver<SubsetRequest>) = channel::unbounded();
    let callback: QueuedApply = Arc::new(move |layer: &LayerRef, subset: &str| {
        let req = SubsetRequest {
            layer: layer.clone(),
            subset: subset.to_string(),
        };
        if tx.send(req).is_err() {
            tracing::warn!("Subset queue receiver dropped, request for {} lost", layer.id());
        }
    });
    (callback, SubsetQueueReceiver { rx })
}

/// 单次过滤调用（可能跨多个图层）的共享状态
pub struct FilterTaskContext {
    forced_backends: DashMap<String, BackendKind>,
    actual_backends: DashMap<String, BackendKind>,
    combine_operator: CombineOperator,
    /// 最近一次使用的合并算子（供下游结果缓存键复用）
    current_combine_operator: Mutex<Option<CombineOperator>>,
    queued_apply: Option<QueuedApply>,
    cancel: CancellationHandle,
    warnings: Mutex<Vec<String>>,
}

impl Default for FilterTaskContext {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterTaskContext {
    pub fn new() -> Self {
        Self {
            forced_backends: DashMap::new(),
            actual_backends: DashMap::new(),
            combine_operator: CombineOperator::And,
            current_combine_operator: Mutex::new(None),
            queued_apply: None,
            cancel: CancellationHandle::new(),
            warnings: Mutex::new(Vec::new()),
        }
    }

    pub fn with_combine_operator(mut self, op: CombineOperator) -> Self {
        self.combine_operator = op;
        self
    }

    pub fn with_queued_apply(mut self, callback: QueuedApply) -> Self {
        self.queued_apply = Some(callback);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn force_backend(&self, layer_id: impl Into<String>, kind: BackendKind) {
        self.forced_backends.insert(layer_id.into(), kind);
    }

    pub fn forced_backend(&self, layer_id: &str) -> Option<BackendKind> {
        self.forced_backends.get(layer_id).map(|v| *v)
    }

    pub fn record_actual_backend(&self, layer_id: &str, kind: BackendKind) {
        self.actual_backends.insert(layer_id.to_string(), kind);
    }

    pub fn actual_backend(&self, layer_id: &str) -> Option<BackendKind> {
        self.actual_backends.get(layer_id).map(|v| *v)
    }

    pub fn actual_backends(&self) -> HashMap<String, BackendKind> {
        self.actual_backends
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    pub fn combine_operator(&self) -> CombineOperator {
        self.combine_operator
    }

    pub fn set_current_combine_operator(&self, op: Option<CombineOperator>) {
        *self.current_combine_operator.lock() = op;
    }

    pub fn current_combine_operator(&self) -> Option<CombineOperator> {
        *self.current_combine_operator.lock()
    }

    pub fn has_queued_apply(&self) -> bool {
        self.queued_apply.is_some()
    }

    /// 投递过滤变更：有回调则排队，否则视为运行在所属上下文，直接应用
    pub fn queue_subset(&self, layer: &LayerRef, subset: &str) -> bool {
        match &self.queued_apply {
            Some(cb) => {
                cb(layer, subset);
                true
            }
            None => layer.set_subset_string(subset),
        }
    }

    pub fn cancellation(&self) -> &CancellationHandle {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn push_warning(&self, warning: impl Into<String>) {
        self.warnings.lock().push(warning.into());
    }

    pub fn take_warnings(&self) -> Vec<String> {
        std::mem::take(&mut *self.warnings.lock())
    }
}
