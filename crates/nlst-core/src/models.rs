//! 核心数据模型定义

use serde::{Deserialize, Serialize};

use crate::error::NlstError;

/// 分类列缺失值的显示哨兵
pub const NA_SENTINEL: &str = "N/A";

/// 临床试验时间点（有序枚举，图表分类按 T0 < T1 < T2 排列）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Timepoint {
    T0,
    T1,
    T2,
}

impl Timepoint {
    /// 全部时间点，按时间顺序
    pub const ALL: [Timepoint; 3] = [Timepoint::T0, Timepoint::T1, Timepoint::T2];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timepoint::T0 => "T0",
            Timepoint::T1 => "T1",
            Timepoint::T2 => "T2",
        }
    }
}

impl std::str::FromStr for Timepoint {
    type Err = NlstError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "T0" => Ok(Timepoint::T0),
            "T1" => Ok(Timepoint::T1),
            "T2" => Ok(Timepoint::T2),
            other => Err(NlstError::Internal(format!("unknown timepoint: {other}"))),
        }
    }
}

impl std::fmt::Display for Timepoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 仓库返回的体积测量行（富集前）
///
/// UID三元组在获取后不再修改；分类列可能为空，
/// 由富集阶段统一填充为哨兵值。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeRow {
    pub patient_id: String,
    pub study_instance_uid: String,            // DICOM Study Instance UID
    pub source_segmented_series_uid: String,   // 被分割的源系列UID
    pub segmentation_series_uid: String,       // 分割结果系列UID
    pub structure: String,                     // 解剖结构名称
    pub timepoint: Timepoint,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub race: Option<String>,
    pub clinical_stage: Option<String>,
    pub smoking_status: Option<String>,
    pub volume_mm3: Option<f64>,               // 规范单位：立方毫米
}

/// 富集后的体积测量记录
///
/// 分类列已完成一次性空值填充，`viewer_url` 是UID三元组的纯函数。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeRecord {
    pub patient_id: String,
    pub study_instance_uid: String,
    pub source_segmented_series_uid: String,
    pub segmentation_series_uid: String,
    pub structure: String,
    pub timepoint: Timepoint,
    pub age: Option<i64>,
    pub gender: String,
    pub race: String,
    pub clinical_stage: String,
    pub smoking_status: String,
    pub volume_mm3: Option<f64>,
    pub viewer_url: String,                    // IDC查看器深度链接
}

/// 患者人口学统计行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRow {
    pub patient_id: String,
    pub age: Option<i64>,
    pub gender_description: Option<String>,
    pub race_description: Option<String>,
    pub stage_description: Option<String>,
    pub cigsmok_description: Option<String>,
}

/// 用户选择的过滤条件（不可变值，每次交互重新构造）
///
/// 空集合/None表示"无约束"，而非"不匹配任何行"。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilterSpec {
    pub structure: Option<String>,     // 精确匹配
    pub smoking_status: Vec<String>,   // 多选，集合内取或
    pub gender: Vec<String>,
    pub race: Vec<String>,
    pub clinical_stage: Vec<String>,
    pub min_age: Option<i64>,          // 闭区间下界
    pub max_age: Option<i64>,          // 闭区间上界
}

/// 年龄滑块的取值范围（闭区间）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgeRange {
    pub min: i64,
    pub max: i64,
}

/// 下拉框与滑块的候选项集合
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterOptions {
    pub smoking_status: Vec<String>,
    pub gender: Vec<String>,
    pub race: Vec<String>,
    pub clinical_stage: Vec<String>,
    pub age_range: AgeRange,
}

impl FilterSpec {
    /// 是否未施加任何约束
    pub fn is_empty(&self) -> bool {
        self.structure.is_none()
            && self.smoking_status.is_empty()
            && self.gender.is_empty()
            && self.race.is_empty()
            && self.clinical_stage.is_empty()
            && self.min_age.is_none()
            && self.max_age.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timepoint_ordering() {
        assert!(Timepoint::T0 < Timepoint::T1);
        assert!(Timepoint::T1 < Timepoint::T2);

        let mut points = vec![Timepoint::T2, Timepoint::T0, Timepoint::T1];
        points.sort();
        assert_eq!(points, Timepoint::ALL.to_vec());
    }

    #[test]
    fn test_timepoint_parse() {
        assert_eq!("T1".parse::<Timepoint>().unwrap(), Timepoint::T1);
        assert!("T3".parse::<Timepoint>().is_err());
    }

    #[test]
    fn test_timepoint_serde_as_string() {
        let json = serde_json::to_string(&Timepoint::T2).unwrap();
        assert_eq!(json, "\"T2\"");
    }

    #[test]
    fn test_empty_spec() {
        assert!(FilterSpec::default().is_empty());

        let spec = FilterSpec {
            structure: Some("Aorta".to_string()),
            ..Default::default()
        };
        assert!(!spec.is_empty());
    }
}
