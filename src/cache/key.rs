use xxhash_rust::xxh3::xxh3_64;

/// 几何缓存键：任一输入不同都会得到不同的键。
///
/// 形如 `layer|fids:<xxh3>|expr:<xxh3>|buf:<distance>`，缺失的部分写作 `-`。
#[derive(Clone, Debug, Default)]
pub struct GeometryCacheKey {
    layer_id: String,
    feature_ids: Option<Vec<i64>>,
    expression: Option<String>,
    buffer: Option<f64>,
}

impl GeometryCacheKey {
    pub fn new(layer_id: impl Into<String>) -> Self {
        Self {
            layer_id: layer_id.into(),
            ..Default::default()
        }
    }

    /// 选择集（顺序无关）
    pub fn with_feature_ids(mut self, ids: &[i64]) -> Self {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        self.feature_ids = Some(ids);
        self
    }

    pub fn with_expression(mut self, expr: &str) -> Self {
        self.expression = Some(expr.trim().to_string());
        self
    }

    pub fn with_buffer(mut self, distance: f64) -> Self {
        self.buffer = Some(distance);
        self
    }

    pub fn build(&self) -> String {
        let fids = match &self.feature_ids {
            Some(ids) => {
                let joined = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
                format!("{:016x}", xxh3_64(joined.as_bytes()))
            }
            None => "-".to_string(),
        };
        let expr = match &self.expression {
            Some(e) => format!("{:016x}", xxh3_64(e.as_bytes())),
            None => "-".to_string(),
        };
        let buf = match self.buffer {
            // 用 bit 表示避免 0.1 / 0.10000000000000001 之类的格式化歧义
            Some(d) => format!("{:016x}", d.to_bits()),
            None => "-".to_string(),
        };
        format!("{}|fids:{}|expr:{}|buf:{}", self.layer_id, fids, expr, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_order_does_not_matter() {
        let a = GeometryCacheKey::new("l").with_feature_ids(&[3, 1, 2]).build();
        let b = GeometryCacheKey::new("l").with_feature_ids(&[1, 2, 3, 3]).build();
        assert_eq!(a, b);
    }

    #[test]
    fn every_input_changes_the_key() {
        let base = GeometryCacheKey::new("l")
            .with_feature_ids(&[1, 2])
            .with_expression("\"type\" = 'road'")
            .with_buffer(10.0);
        let k = base.build();

        assert_ne!(k, base.clone().with_feature_ids(&[1, 2, 4]).build());
        assert_ne!(k, base.clone().with_expression("\"type\" = 'rail'").build());
        assert_ne!(k, base.clone().with_buffer(10.5).build());
        let other_layer = GeometryCacheKey::new("m")
            .with_feature_ids(&[1, 2])
            .with_expression("\"type\" = 'road'")
            .with_buffer(10.0)
            .build();
        assert_ne!(k, other_layer);
    }

    #[test]
    fn missing_parts_are_distinct_from_empty_parts() {
        let none = GeometryCacheKey::new("l").build();
        let empty = GeometryCacheKey::new("l").with_feature_ids(&[]).build();
        assert_ne!(none, empty);
        assert!(none.starts_with("l|"));
    }
}
