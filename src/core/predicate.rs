use serde::{Deserialize, Serialize};
use std::fmt;

/// 后端原生空间谓词（只消费，不实现）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpatialPredicate {
    Intersects,
    Contains,
    Within,
    Touches,
    Overlaps,
    Crosses,
    Disjoint,
    Equals,
}

impl SpatialPredicate {
    pub const ALL: [SpatialPredicate; 8] = [
        SpatialPredicate::Intersects,
        SpatialPredicate::Contains,
        SpatialPredicate::Within,
        SpatialPredicate::Touches,
        SpatialPredicate::Overlaps,
        SpatialPredicate::Crosses,
        SpatialPredicate::Disjoint,
        SpatialPredicate::Equals,
    ];

    /// SQL 函数名（PostGIS / Spatialite 通用）
    pub fn sql_function(self) -> &'static str {
        match self {
            SpatialPredicate::Intersects => "ST_Intersects",
            SpatialPredicate::Contains => "ST_Contains",
            SpatialPredicate::Within => "ST_Within",
            SpatialPredicate::Touches => "ST_Touches",
            SpatialPredicate::Overlaps => "ST_Overlaps",
            SpatialPredicate::Crosses => "ST_Crosses",
            SpatialPredicate::Disjoint => "ST_Disjoint",
            SpatialPredicate::Equals => "ST_Equals",
        }
    }

    /// 表达式引擎里的裸函数名（OGR / memory 后端）
    pub fn bare_function(self) -> &'static str {
        &self.sql_function()[3..]
    }

    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let name = lower.strip_prefix("st_").unwrap_or(&lower);
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.bare_function().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for SpatialPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_function())
    }
}
