//! 响应式会话
//!
//! 缓存模式下进程启动时取一次表，之后每次交互都是
//! `(表, 过滤条件) -> 视图` 的纯函数，无隐藏状态。
//! 表在构造后只读，刷新策略为进程重启。

use serde::Serialize;
use tracing::info;

use nlst_core::{FilterOptions, FilterSpec, PatientRow, Result, VolumeRecord};
use nlst_warehouse::Warehouse;

use crate::charts::{
    category_counts, histogram, volume_summary, BoxPlotGroup, CategoryCount, HistogramData,
    HISTOGRAM_BINS,
};
use crate::summary::{
    filter_options_from_records, filter_patients_by_smoking, structures_from_records,
    unique_segmentations, viewer_link_preview, ViewerLink, VIEWER_PREVIEW_LEN,
};

/// 一次交互渲染出的完整视图
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DashboardView {
    /// 体积箱线图分组（时间点 × 吸烟状态）
    pub volume_summary: Vec<BoxPlotGroup>,
    /// 过滤子集内去重的分割系列数
    pub unique_segmentations: usize,
    /// 年龄分布直方图（人口学统计）
    pub age_histogram: HistogramData,
    /// 临床分期计数
    pub stage_counts: Vec<CategoryCount>,
    /// 去重的查看器链接样例（表格预览）
    pub viewer_links: Vec<ViewerLink>,
}

/// 常驻内存的仪表盘会话
pub struct DashboardSession {
    records: Vec<VolumeRecord>,
    patients: Vec<PatientRow>,
}

impl DashboardSession {
    pub fn new(records: Vec<VolumeRecord>, patients: Vec<PatientRow>) -> Self {
        Self { records, patients }
    }

    /// 进程启动时从仓库一次性加载（受行数上限约束）
    pub async fn load(warehouse: &dyn Warehouse, limit: Option<i64>) -> Result<Self> {
        let records = warehouse.all_volume_records(limit).await?;
        let patients = warehouse.patient_rows().await?;
        info!(
            "dashboard session loaded: {} volume records, {} patients",
            records.len(),
            patients.len()
        );
        Ok(Self::new(records, patients))
    }

    pub fn records(&self) -> &[VolumeRecord] {
        &self.records
    }

    pub fn patients(&self) -> &[PatientRow] {
        &self.patients
    }

    pub fn structures(&self) -> Vec<String> {
        structures_from_records(&self.records)
    }

    pub fn filter_options(&self) -> FilterOptions {
        filter_options_from_records(&self.records)
    }

    /// 过滤后的体积记录（保持原顺序）
    pub fn filtered(&self, spec: &FilterSpec) -> Vec<VolumeRecord> {
        spec.apply(&self.records)
    }

    /// 按吸烟状态多选过滤人口学统计行
    pub fn filtered_patients(&self, spec: &FilterSpec) -> Vec<PatientRow> {
        filter_patients_by_smoking(&self.patients, &spec.smoking_status)
    }

    /// 渲染一次交互：纯函数，同一条件重复调用产出相同视图
    pub fn render(&self, spec: &FilterSpec) -> DashboardView {
        let filtered = self.filtered(spec);
        let patients = self.filtered_patients(spec);

        let ages: Vec<f64> = patients
            .iter()
            .filter_map(|p| p.age.map(|a| a as f64))
            .collect();
        let stages = patients
            .iter()
            .filter_map(|p| p.stage_description.as_deref());

        DashboardView {
            volume_summary: volume_summary(&filtered),
            unique_segmentations: unique_segmentations(&filtered),
            age_histogram: histogram(&ages, HISTOGRAM_BINS),
            stage_counts: category_counts(stages),
            viewer_links: viewer_link_preview(&filtered, VIEWER_PREVIEW_LEN),
        }
    }
}
