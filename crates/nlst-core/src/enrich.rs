//! 派生列富集
//!
//! 两项一次性的后处理：由UID三元组合成IDC查看器深度链接，
//! 以及把分类列的空值统一填充为显示哨兵。均发生在任何
//! 内存过滤之前。

use tracing::debug;

use crate::models::{VolumeRow, VolumeRecord, NA_SENTINEL};
use crate::utils::{is_valid_dicom_uid, percent_encode};

/// 外部IDC查看器地址前缀
const VIEWER_BASE: &str = "https://viewer.imaging.datacommons.cancer.gov/v3/viewer/";

/// 由UID三元组合成查看器URL（纯函数，格式需与外部查看器严格一致）
pub fn viewer_url(study_uid: &str, source_series_uid: &str, segmentation_series_uid: &str) -> String {
    format!(
        "{VIEWER_BASE}?StudyInstanceUIDs={}&SeriesInstanceUIDs={},{}",
        percent_encode(study_uid),
        percent_encode(source_series_uid),
        percent_encode(segmentation_series_uid),
    )
}

/// 富集单行：填充查看器URL，分类空值换为哨兵
pub fn enrich_row(row: VolumeRow) -> VolumeRecord {
    if !is_valid_dicom_uid(&row.study_instance_uid) {
        debug!("malformed study uid for patient row, url will be percent-escaped");
    }
    let url = viewer_url(
        &row.study_instance_uid,
        &row.source_segmented_series_uid,
        &row.segmentation_series_uid,
    );
    VolumeRecord {
        patient_id: row.patient_id,
        study_instance_uid: row.study_instance_uid,
        source_segmented_series_uid: row.source_segmented_series_uid,
        segmentation_series_uid: row.segmentation_series_uid,
        structure: row.structure,
        timepoint: row.timepoint,
        age: row.age,
        gender: row.gender.unwrap_or_else(|| NA_SENTINEL.to_string()),
        race: row.race.unwrap_or_else(|| NA_SENTINEL.to_string()),
        clinical_stage: row.clinical_stage.unwrap_or_else(|| NA_SENTINEL.to_string()),
        smoking_status: row.smoking_status.unwrap_or_else(|| NA_SENTINEL.to_string()),
        volume_mm3: row.volume_mm3,
        viewer_url: url,
    }
}

/// 富集整表，保持行顺序
pub fn enrich(rows: Vec<VolumeRow>) -> Vec<VolumeRecord> {
    rows.into_iter().map(enrich_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Timepoint;

    fn raw_row() -> VolumeRow {
        VolumeRow {
            patient_id: "100001".to_string(),
            study_instance_uid: "1.2.3.4".to_string(),
            source_segmented_series_uid: "1.2.3.5".to_string(),
            segmentation_series_uid: "1.2.3.6".to_string(),
            structure: "Aorta".to_string(),
            timepoint: Timepoint::T0,
            age: Some(61),
            gender: Some("Female".to_string()),
            race: None,
            clinical_stage: None,
            smoking_status: Some("Never".to_string()),
            volume_mm3: Some(123.4),
        }
    }

    #[test]
    fn test_viewer_url_template() {
        let record = enrich_row(raw_row());
        assert_eq!(
            record.viewer_url,
            "https://viewer.imaging.datacommons.cancer.gov/v3/viewer/\
             ?StudyInstanceUIDs=1.2.3.4&SeriesInstanceUIDs=1.2.3.5,1.2.3.6"
        );
    }

    #[test]
    fn test_viewer_url_is_pure_function_of_uid_triple() {
        let record = enrich_row(raw_row());
        let rebuilt = viewer_url(
            &record.study_instance_uid,
            &record.source_segmented_series_uid,
            &record.segmentation_series_uid,
        );
        assert_eq!(rebuilt, record.viewer_url);
    }

    #[test]
    fn test_null_filling_uses_sentinel() {
        let record = enrich_row(raw_row());
        assert_eq!(record.race, NA_SENTINEL);
        assert_eq!(record.clinical_stage, NA_SENTINEL);
        // 非空值原样保留
        assert_eq!(record.gender, "Female");
        assert_eq!(record.smoking_status, "Never");
    }

    #[test]
    fn test_enrich_preserves_order_and_uids() {
        let mut second = raw_row();
        second.study_instance_uid = "9.8.7".to_string();

        let records = enrich(vec![raw_row(), second]);
        assert_eq!(records[0].study_instance_uid, "1.2.3.4");
        assert_eq!(records[1].study_instance_uid, "9.8.7");
    }
}
