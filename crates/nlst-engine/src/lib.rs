//! # NLST Engine
//!
//! 展示适配层：把过滤后的表整形为图表组件与JSON响应需要的
//! 聚合结构，以及持有常驻内存表的响应式会话。

pub mod charts;
pub mod session;
pub mod summary;

pub use charts::{
    category_counts, histogram, volume_summary, BoxPlotGroup, CategoryCount, HistogramData,
    HISTOGRAM_BINS,
};
pub use session::{DashboardSession, DashboardView};
pub use summary::{
    filter_options_from_records, filter_patients_by_smoking, structures_from_records,
    unique_segmentations, viewer_link_preview, ViewerLink, VIEWER_PREVIEW_LEN,
};
