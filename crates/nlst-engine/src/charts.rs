//! 图表聚合
//!
//! 直方图分箱、按时间点分组的箱线图五数概括、分类计数。
//! 分箱范围取自当前过滤子集的观测范围，每次过滤变更后重算，
//! 箱边界随子集范围移动。

use std::collections::BTreeMap;

use serde::Serialize;

use nlst_core::{Timepoint, VolumeRecord};

/// 直方图固定箱数
pub const HISTOGRAM_BINS: usize = 30;

/// 直方图数据：`bin_edges` 比 `counts` 多一个元素
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistogramData {
    pub bin_edges: Vec<f64>,
    pub counts: Vec<u64>,
}

impl HistogramData {
    pub fn empty() -> Self {
        Self {
            bin_edges: Vec::new(),
            counts: Vec::new(),
        }
    }
}

/// 对观测值做固定箱数的直方图分箱
///
/// 范围退化为单点时全部计入一个箱。非有限值被忽略。
pub fn histogram(values: &[f64], bins: usize) -> HistogramData {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || bins == 0 {
        return HistogramData::empty();
    }

    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if max <= min {
        return HistogramData {
            bin_edges: vec![min, max],
            counts: vec![finite.len() as u64],
        };
    }

    let width = (max - min) / bins as f64;
    let bin_edges: Vec<f64> = (0..=bins).map(|i| min + width * i as f64).collect();
    let mut counts = vec![0u64; bins];
    for v in finite {
        // 最右端的值归入最后一个箱
        let idx = (((v - min) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    HistogramData { bin_edges, counts }
}

/// 箱线图单组：固定时间点 × 吸烟状态
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BoxPlotGroup {
    pub timepoint: Timepoint,
    pub smoking_status: String,
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// 按 (时间点, 吸烟状态) 分组的体积五数概括，组按 T0 < T1 < T2 排列
///
/// 缺少体积值的行不参与概括。
pub fn volume_summary(records: &[VolumeRecord]) -> Vec<BoxPlotGroup> {
    let mut groups: BTreeMap<(Timepoint, String), Vec<f64>> = BTreeMap::new();
    for record in records {
        if let Some(volume) = record.volume_mm3 {
            groups
                .entry((record.timepoint, record.smoking_status.clone()))
                .or_default()
                .push(volume);
        }
    }

    groups
        .into_iter()
        .map(|((timepoint, smoking_status), mut volumes)| {
            volumes.sort_by(|a, b| a.total_cmp(b));
            BoxPlotGroup {
                timepoint,
                smoking_status,
                count: volumes.len(),
                min: volumes[0],
                q1: quantile(&volumes, 0.25),
                median: quantile(&volumes, 0.5),
                q3: quantile(&volumes, 0.75),
                max: volumes[volumes.len() - 1],
            }
        })
        .collect()
}

/// 线性插值分位数，输入必须已排序非空
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let frac = pos - lower as f64;
    sorted[lower] + frac * (sorted[upper] - sorted[lower])
}

/// 分类计数条目
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryCount {
    pub value: String,
    pub count: u64,
}

/// 分类值计数，按计数降序、同计数按值升序排列
pub fn category_counts<'a>(values: impl Iterator<Item = &'a str>) -> Vec<CategoryCount> {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for value in values {
        *counts.entry(value).or_default() += 1;
    }

    let mut out: Vec<CategoryCount> = counts
        .into_iter()
        .map(|(value, count)| CategoryCount {
            value: value.to_string(),
            count,
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then(a.value.cmp(&b.value)));
    out
}
