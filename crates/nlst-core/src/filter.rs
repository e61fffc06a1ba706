//! 内存过滤引擎
//!
//! 对已富集的表应用过滤条件：字段间取与，多选字段内取或，
//! 数值范围两端闭区间。保持输入顺序，幂等，不修改schema。

use crate::models::{FilterSpec, VolumeRecord};

impl FilterSpec {
    /// 单行是否满足全部激活的约束
    pub fn matches(&self, record: &VolumeRecord) -> bool {
        if let Some(structure) = &self.structure {
            if &record.structure != structure {
                return false;
            }
        }
        if !self.smoking_status.is_empty() && !self.smoking_status.contains(&record.smoking_status)
        {
            return false;
        }
        if !self.gender.is_empty() && !self.gender.contains(&record.gender) {
            return false;
        }
        if !self.race.is_empty() && !self.race.contains(&record.race) {
            return false;
        }
        if !self.clinical_stage.is_empty() && !self.clinical_stage.contains(&record.clinical_stage)
        {
            return false;
        }
        if self.min_age.is_some() || self.max_age.is_some() {
            // 年龄约束激活时，缺失年龄的行不匹配
            let Some(age) = record.age else {
                return false;
            };
            if let Some(min) = self.min_age {
                if age < min {
                    return false;
                }
            }
            if let Some(max) = self.max_age {
                if age > max {
                    return false;
                }
            }
        }
        true
    }

    /// 返回满足条件的子集，保持原顺序
    ///
    /// 过窄的条件得到空结果是合法输出，不是错误。
    pub fn apply(&self, records: &[VolumeRecord]) -> Vec<VolumeRecord> {
        // 无约束即恒等
        if self.is_empty() {
            return records.to_vec();
        }
        records
            .iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect()
    }
}
