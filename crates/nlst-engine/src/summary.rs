//! 汇总指标与内存表派生项
//!
//! 去重计数、由常驻表派生下拉候选项、查看器链接预览。

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use nlst_core::{AgeRange, FilterOptions, PatientRow, VolumeRecord, NA_SENTINEL};

/// 按吸烟状态多选约束过滤人口学统计行
///
/// 空集合表示无约束；状态缺失的行在约束激活时不匹配。
pub fn filter_patients_by_smoking(patients: &[PatientRow], allowed: &[String]) -> Vec<PatientRow> {
    if allowed.is_empty() {
        return patients.to_vec();
    }
    patients
        .iter()
        .filter(|p| {
            p.cigsmok_description
                .as_ref()
                .is_some_and(|s| allowed.contains(s))
        })
        .cloned()
        .collect()
}

/// 当前过滤子集内去重的分割系列数
pub fn unique_segmentations(records: &[VolumeRecord]) -> usize {
    records
        .iter()
        .map(|r| r.segmentation_series_uid.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// 去重排序后的解剖结构名
pub fn structures_from_records(records: &[VolumeRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.structure.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// 由已富集的常驻表派生下拉候选项
///
/// 富集后空值已成为哨兵，与仓库端dropna语义对齐需把哨兵排除在候选之外。
pub fn filter_options_from_records(records: &[VolumeRecord]) -> FilterOptions {
    let mut smoking = BTreeSet::new();
    let mut gender = BTreeSet::new();
    let mut race = BTreeSet::new();
    let mut stage = BTreeSet::new();
    let mut min_age: Option<i64> = None;
    let mut max_age: Option<i64> = None;

    let mut collect = |set: &mut BTreeSet<String>, value: &str| {
        if value != NA_SENTINEL {
            set.insert(value.to_string());
        }
    };

    for record in records {
        collect(&mut smoking, &record.smoking_status);
        collect(&mut gender, &record.gender);
        collect(&mut race, &record.race);
        collect(&mut stage, &record.clinical_stage);
        if let Some(age) = record.age {
            min_age = Some(min_age.map_or(age, |m| m.min(age)));
            max_age = Some(max_age.map_or(age, |m| m.max(age)));
        }
    }

    FilterOptions {
        smoking_status: smoking.into_iter().collect(),
        gender: gender.into_iter().collect(),
        race: race.into_iter().collect(),
        clinical_stage: stage.into_iter().collect(),
        age_range: match (min_age, max_age) {
            (Some(min), Some(max)) => AgeRange { min, max },
            _ => AgeRange { min: 0, max: 100 },
        },
    }
}

/// 表格预览默认条数
pub const VIEWER_PREVIEW_LEN: usize = 10;

/// 表格预览用的查看器链接
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ViewerLink {
    pub segmentation_series_uid: String,
    pub viewer_url: String,
}

/// 去重的 (分割系列UID, 查看器URL) 样例，保持首次出现顺序，取前 `n` 条
pub fn viewer_link_preview(records: &[VolumeRecord], n: usize) -> Vec<ViewerLink> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for record in records {
        if out.len() >= n {
            break;
        }
        let key = (
            record.segmentation_series_uid.clone(),
            record.viewer_url.clone(),
        );
        if seen.insert(key) {
            out.push(ViewerLink {
                segmentation_series_uid: record.segmentation_series_uid.clone(),
                viewer_url: record.viewer_url.clone(),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use nlst_core::Timepoint;

    fn record(seg_uid: &str, structure: &str, age: Option<i64>, smoking: &str) -> VolumeRecord {
        VolumeRecord {
            patient_id: "100001".to_string(),
            study_instance_uid: "1.2.3".to_string(),
            source_segmented_series_uid: "1.2.4".to_string(),
            segmentation_series_uid: seg_uid.to_string(),
            structure: structure.to_string(),
            timepoint: Timepoint::T0,
            age,
            gender: "Male".to_string(),
            race: NA_SENTINEL.to_string(),
            clinical_stage: "IA".to_string(),
            smoking_status: smoking.to_string(),
            volume_mm3: Some(100.0),
            viewer_url: format!("https://viewer.example/{seg_uid}"),
        }
    }

    #[test]
    fn test_unique_segmentations() {
        let records = vec![
            record("1.1", "Aorta", Some(55), "Never"),
            record("1.1", "Aorta", Some(55), "Never"),
            record("1.2", "Liver", Some(70), "Current"),
        ];
        assert_eq!(unique_segmentations(&records), 2);
    }

    #[test]
    fn test_structures_sorted_distinct() {
        let records = vec![
            record("1.1", "Liver", None, "Never"),
            record("1.2", "Aorta", None, "Never"),
            record("1.3", "Liver", None, "Never"),
        ];
        assert_eq!(structures_from_records(&records), vec!["Aorta", "Liver"]);
    }

    #[test]
    fn test_filter_options_excludes_sentinel_and_ranges_age() {
        let records = vec![
            record("1.1", "Aorta", Some(55), "Never"),
            record("1.2", "Aorta", Some(70), "Current"),
        ];
        let options = filter_options_from_records(&records);

        assert_eq!(options.age_range, AgeRange { min: 55, max: 70 });
        assert_eq!(options.smoking_status, vec!["Current", "Never"]);
        // race全为哨兵值，候选集合为空
        assert!(options.race.is_empty());
    }

    #[test]
    fn test_viewer_link_preview_dedup_and_head() {
        let records = vec![
            record("1.1", "Aorta", None, "Never"),
            record("1.1", "Aorta", None, "Never"),
            record("1.2", "Aorta", None, "Never"),
            record("1.3", "Aorta", None, "Never"),
        ];

        let preview = viewer_link_preview(&records, 2);
        assert_eq!(preview.len(), 2);
        assert_eq!(preview[0].segmentation_series_uid, "1.1");
        assert_eq!(preview[1].segmentation_series_uid, "1.2");
    }
}
