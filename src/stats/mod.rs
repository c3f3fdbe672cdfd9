use std::fmt;

use serde::Serialize;

use crate::core::BackendKind;

/// 几何缓存统计
#[derive(Clone, Debug, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    /// LRU 淘汰（不含过期）
    pub evictions: u64,
    pub expirations: u64,
    /// 有缓存条目的源图层数
    pub layers: usize,
    pub cached_bytes: u64,
}

/// 单个图层的过滤结果
#[derive(Clone, Debug, Serialize)]
pub struct LayerReport {
    pub layer_id: String,
    pub layer_name: String,
    pub success: bool,
    /// 实际执行的后端（未走到后端选择时为 None）
    pub backend: Option<BackendKind>,
    pub used_fallback: bool,
    pub error: Option<String>,
    pub warnings: Vec<String>,
}

/// 一次过滤任务（多图层）的汇总，供 UI 展示
#[derive(Clone, Debug, Default, Serialize)]
pub struct TaskReport {
    pub layers: Vec<LayerReport>,
    pub cancelled: bool,
    /// 因取消而未处理的图层数
    pub skipped: usize,
}

impl TaskReport {
    pub fn succeeded(&self) -> usize {
        self.layers.iter().filter(|l| l.success).count()
    }

    pub fn failed(&self) -> usize {
        self.layers.iter().filter(|l| !l.success).count()
    }

    pub fn all_succeeded(&self) -> bool {
        !self.cancelled && self.skipped == 0 && self.layers.iter().all(|l| l.success)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.layers
            .iter()
            .flat_map(|l| l.warnings.iter().map(String::as_str))
    }
}

fn human_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "╔══════════════════════════════════════════════════╗")?;
        writeln!(f, "║           Geometry Cache                         ║")?;
        writeln!(f, "╠══════════════════════════════════════════════════╣")?;
        writeln!(f, "║   entries:      {:>10}                       ║", self.entries)?;
        writeln!(f, "║   layers:       {:>10}                       ║", self.layers)?;
        writeln!(
            f,
            "║   cached:       {:>10}                       ║",
            human_bytes(self.cached_bytes)
        )?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(f, "║   hits:         {:>10}                       ║", self.hits)?;
        writeln!(f, "║   misses:       {:>10}                       ║", self.misses)?;
        writeln!(
            f,
            "║   hit rate:     {:>9.1}%                       ║",
            self.hit_rate * 100.0
        )?;
        writeln!(f, "║   evictions:    {:>10}                       ║", self.evictions)?;
        writeln!(f, "║   expirations:  {:>10}                       ║", self.expirations)?;
        writeln!(f, "╚══════════════════════════════════════════════════╝")?;
        Ok(())
    }
}

impl fmt::Display for TaskReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Filter task: {} ok, {} failed{}",
            self.succeeded(),
            self.failed(),
            if self.cancelled {
                format!(", cancelled ({} skipped)", self.skipped)
            } else {
                String::new()
            }
        )?;
        for l in &self.layers {
            let backend = l.backend.map(|b| b.name()).unwrap_or("-");
            write!(
                f,
                "  [{}] {} via {}{}",
                if l.success { "ok" } else { "FAIL" },
                l.layer_name,
                backend,
                if l.used_fallback { " (fallback)" } else { "" }
            )?;
            if let Some(err) = &l.error {
                write!(f, ": {}", err)?;
            }
            writeln!(f)?;
            for w in &l.warnings {
                writeln!(f, "      warning: {}", w)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(id: &str, success: bool) -> LayerReport {
        LayerReport {
            layer_id: id.to_string(),
            layer_name: id.to_string(),
            success,
            backend: Some(BackendKind::Ogr),
            used_fallback: !success,
            error: (!success).then(|| "boom".to_string()),
            warnings: vec![format!("{id} warn")],
        }
    }

    #[test]
    fn task_report_counts() {
        let r = TaskReport {
            layers: vec![layer("a", true), layer("b", false)],
            cancelled: false,
            skipped: 0,
        };
        assert_eq!(r.succeeded(), 1);
        assert_eq!(r.failed(), 1);
        assert!(!r.all_succeeded());
        assert_eq!(r.warnings().count(), 2);
        let text = r.to_string();
        assert!(text.contains("[FAIL] b via ogr (fallback): boom"));
    }

    #[test]
    fn cache_stats_render() {
        let s = CacheStats {
            entries: 2,
            hits: 3,
            misses: 1,
            hit_rate: 0.75,
            cached_bytes: 2048,
            ..Default::default()
        };
        let text = s.to_string();
        assert!(text.contains("75.0%"));
        assert!(text.contains("2.00 KB"));
    }
}
