//! 已有过滤表达式的分类：决定新几何过滤是替换还是与之合并。
//!
//! 纯文本启发式匹配，不解析 SQL。宁可漏判"损坏"，也不误清有效过滤。

use std::sync::LazyLock;

use regex::{Regex, RegexSet};

use crate::core::{CombineOperator, SpatialPredicate};

/// 编排器生成的 EXISTS 子查询里使用的固定别名
pub const SUBQUERY_MARKER: &str = "__source";

static WELL_FORMED_EXISTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?is)EXISTS\s*\(\s*SELECT\s+.*\s+FROM\s+.*\s+AS\s+{}\s+WHERE\s+.*\)",
        regex::escape(SUBQUERY_MARKER)
    ))
    .expect("static regex")
});

/// 整词匹配：`__source_id` 之类的普通列名不算标记
static MARKER_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(SUBQUERY_MARKER))).expect("static regex")
});

static ROW_ID_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^\(?\s*(?:"?[A-Za-z_][A-Za-z0-9_]*"?\.)?"?fid"?\s+(?:IN\s*\(|=\s*-?\d+)"#)
        .expect("static regex")
});

static STYLE_EXPRESSION: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)AND\s+TRUE\s*\)",
        r"(?i)THEN\s+true\b",
        r"(?i)THEN\s+false\b",
        r"(?i)\bcoalesce\s*\(",
        r"(?i)SELECT\s+CASE\b",
        r"(?is)\(\s*CASE\s+WHEN\b.*THEN\s+true\b",
    ])
    .expect("static regex set")
});

/// 已有过滤的类别
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubsetKind {
    Empty,
    /// 含 EXISTS 子查询或空间谓词：只能替换
    Geometric,
    /// 上一步空间过滤留下的 fid 列表
    RowIdOnly,
    /// 规则渲染器风格 / 显示表达式
    Style,
    /// 普通属性过滤
    Attribute,
}

/// 替换还是合并。
///
/// 不变式：`combine` 为 None 时新表达式替换旧过滤；`previous` 可能仍然保留，
/// 但只用于结果缓存关联，不得拼入 SQL。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubsetStrategy {
    pub previous: Option<String>,
    pub combine: Option<CombineOperator>,
}

impl SubsetStrategy {
    pub fn replace() -> Self {
        Self::default()
    }

    pub fn is_replace(&self) -> bool {
        self.combine.is_none()
    }
}

fn contains_marker(text: &str) -> bool {
    MARKER_WORD.is_match(text)
}

fn contains_spatial_predicate(upper: &str) -> bool {
    SpatialPredicate::ALL.iter().any(|p| {
        upper.contains(&p.sql_function().to_ascii_uppercase())
            || upper.contains(&format!("{}(", p.bare_function().to_ascii_uppercase()))
    }) || upper.contains("ST_DWITHIN")
}

/// 含子查询标记但不是完整 `EXISTS (SELECT … FROM … AS __source WHERE …)` 的文本视为损坏
pub fn is_corrupted(text: &str) -> bool {
    contains_marker(text) && !WELL_FORMED_EXISTS.is_match(text)
}

pub fn is_geometric(text: &str) -> bool {
    let upper = text.to_ascii_uppercase();
    contains_marker(text)
        || upper.contains("EXISTS(")
        || upper.contains("EXISTS (")
        || contains_spatial_predicate(&upper)
}

pub fn is_row_id_only(text: &str) -> bool {
    ROW_ID_ONLY.is_match(text.trim())
}

pub fn is_style_expression(text: &str) -> bool {
    STYLE_EXPRESSION.is_match(text)
}

pub fn classify(text: &str) -> SubsetKind {
    if text.trim().is_empty() {
        SubsetKind::Empty
    } else if is_geometric(text) {
        SubsetKind::Geometric
    } else if is_row_id_only(text) {
        SubsetKind::RowIdOnly
    } else if is_style_expression(text) {
        SubsetKind::Style
    } else {
        SubsetKind::Attribute
    }
}

/// 根据当前过滤与配置的合并算子得出策略
pub fn subset_strategy(current: Option<&str>, op: CombineOperator) -> SubsetStrategy {
    let Some(text) = current else {
        return SubsetStrategy::replace();
    };
    match classify(text) {
        SubsetKind::Empty | SubsetKind::Geometric | SubsetKind::Style => SubsetStrategy::replace(),
        SubsetKind::RowIdOnly => SubsetStrategy {
            previous: Some(text.to_string()),
            combine: None,
        },
        SubsetKind::Attribute => SubsetStrategy {
            previous: Some(text.to_string()),
            combine: Some(op),
        },
    }
}
