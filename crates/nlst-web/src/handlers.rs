//! HTTP处理器
//!
//! 每个端点要么走无状态管线（构造查询→取数→富集→过滤→整形），
//! 要么在缓存模式下对常驻会话表做同一套内存过滤。失败时返回
//! 结构化错误响应，绝不返回截断的部分结果。

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use nlst_core::{FilterSpec, NlstError, VolumeRecord};
use nlst_engine::charts::{BoxPlotGroup, CategoryCount, HistogramData, HISTOGRAM_BINS};
use nlst_engine::{
    category_counts, filter_patients_by_smoking, histogram, unique_segmentations,
    viewer_link_preview, volume_summary, DashboardSession, ViewerLink, VIEWER_PREVIEW_LEN,
};
use nlst_warehouse::query::clamp_limit;
use nlst_warehouse::Warehouse;

/// 路由共享状态
///
/// `session` 存在时为缓存模式（进程启动取一次表），否则每个
/// 请求独立走一遍仓库管线。两种模式之间没有共享可变状态。
#[derive(Clone)]
pub struct AppState {
    pub service_name: String,
    pub warehouse: Arc<dyn Warehouse>,
    pub session: Option<Arc<DashboardSession>>,
    pub default_limit: i64,
    /// volume端点是否要求指定structure（与仓库配置同源）
    pub require_structure: bool,
}

/// 面向HTTP的错误包装，按错误分类映射状态码
pub struct ApiError(NlstError);

impl From<NlstError> for ApiError {
    fn from(error: NlstError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            NlstError::InvalidFilter(_) => (StatusCode::BAD_REQUEST, "invalid_filter"),
            NlstError::UpstreamQuery(_) | NlstError::Network(_) => {
                (StatusCode::BAD_GATEWAY, "upstream_query")
            }
            NlstError::SchemaMismatch { .. } => {
                // 上游schema漂移，应当告警而不是静默降级
                error!("schema mismatch surfaced to client: {}", self.0);
                (StatusCode::INTERNAL_SERVER_ERROR, "schema_mismatch")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        let body = Json(json!({
            "error": kind,
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

/// volume-data与图表端点的查询参数
///
/// 多选字段接受逗号分隔的取值列表。
#[derive(Debug, Default, Deserialize)]
pub struct VolumeQueryParams {
    pub structure: Option<String>,
    pub smoking_status: Option<String>,
    pub gender: Option<String>,
    pub race: Option<String>,
    pub clinical_stage: Option<String>,
    pub min_age: Option<i64>,
    pub max_age: Option<i64>,
    pub limit: Option<i64>,
}

fn split_csv(value: &Option<String>) -> Vec<String> {
    value
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl VolumeQueryParams {
    /// 翻译为过滤条件值
    pub fn to_filter_spec(&self) -> FilterSpec {
        FilterSpec {
            structure: self
                .structure
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
            smoking_status: split_csv(&self.smoking_status),
            gender: split_csv(&self.gender),
            race: split_csv(&self.race),
            clinical_stage: split_csv(&self.clinical_stage),
            min_age: self.min_age,
            max_age: self.max_age,
        }
    }
}

/// 取过滤后的体积记录：缓存会话或无状态管线
async fn filtered_records(
    state: &AppState,
    spec: &FilterSpec,
    limit: Option<i64>,
) -> Result<Vec<VolumeRecord>, ApiError> {
    if state.require_structure && spec.structure.is_none() {
        return Err(NlstError::InvalidFilter("structure is required".to_string()).into());
    }
    match &state.session {
        Some(session) => {
            let mut records = session.filtered(spec);
            let cap = clamp_limit(limit.unwrap_or(state.default_limit)) as usize;
            records.truncate(cap);
            Ok(records)
        }
        None => {
            let records = state.warehouse.volume_records(spec, limit).await?;
            // 仓库端已过滤；内存端再过一遍保证两种模式语义一致
            Ok(spec.apply(&records))
        }
    }
}

/// API根路径处理器
pub async fn api_root(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": state.service_name,
    }))
}

/// 存活检查：仓库连接健康即返回成功
pub async fn healthz(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.warehouse.ping().await?;
    Ok(Json(json!({
        "ok": true,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

/// 人口学统计数据
pub async fn patient_data(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let patients = match &state.session {
        Some(session) => session.patients().to_vec(),
        None => state.warehouse.patient_rows().await?,
    };
    Ok(Json(patients))
}

/// 过滤后的体积测量记录（含查看器URL）
pub async fn volume_data(
    State(state): State<AppState>,
    Query(params): Query<VolumeQueryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let spec = params.to_filter_spec();
    let records = filtered_records(&state, &spec, params.limit).await?;
    Ok(Json(records))
}

/// 去重排序后的解剖结构名
pub async fn structures(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let names = match &state.session {
        Some(session) => session.structures(),
        None => state.warehouse.structures().await?,
    };
    Ok(Json(names))
}

/// 下拉框候选项与年龄滑块范围
pub async fn filter_options(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let options = match &state.session {
        Some(session) => session.filter_options(),
        None => state.warehouse.filter_options().await?,
    };
    Ok(Json(options))
}

/// 体积箱线图响应
#[derive(Debug, Serialize)]
pub struct VolumeSummaryResponse {
    pub volume_summary: Vec<BoxPlotGroup>,
    pub unique_segmentations: usize,
    pub viewer_links: Vec<ViewerLink>,
}

/// 体积箱线图分组、去重分割计数与查看器链接样例
pub async fn charts_volume_summary(
    State(state): State<AppState>,
    Query(params): Query<VolumeQueryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let spec = params.to_filter_spec();

    if let Some(session) = &state.session {
        if state.require_structure && spec.structure.is_none() {
            return Err(NlstError::InvalidFilter("structure is required".to_string()).into());
        }
        let view = session.render(&spec);
        return Ok(Json(VolumeSummaryResponse {
            volume_summary: view.volume_summary,
            unique_segmentations: view.unique_segmentations,
            viewer_links: view.viewer_links,
        }));
    }

    let records = filtered_records(&state, &spec, params.limit).await?;
    Ok(Json(VolumeSummaryResponse {
        volume_summary: volume_summary(&records),
        unique_segmentations: unique_segmentations(&records),
        viewer_links: viewer_link_preview(&records, VIEWER_PREVIEW_LEN),
    }))
}

/// 年龄分布图响应
#[derive(Debug, Serialize)]
pub struct AgeHistogramResponse {
    pub age_histogram: HistogramData,
    pub stage_counts: Vec<CategoryCount>,
}

/// 年龄直方图与临床分期计数（人口学仪表盘）
pub async fn charts_age_histogram(
    State(state): State<AppState>,
    Query(params): Query<VolumeQueryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let spec = params.to_filter_spec();

    if let Some(session) = &state.session {
        let view = session.render(&spec);
        return Ok(Json(AgeHistogramResponse {
            age_histogram: view.age_histogram,
            stage_counts: view.stage_counts,
        }));
    }

    let patients = state.warehouse.patient_rows().await?;
    let patients = filter_patients_by_smoking(&patients, &spec.smoking_status);
    let ages: Vec<f64> = patients
        .iter()
        .filter_map(|p| p.age.map(|a| a as f64))
        .collect();
    let stages = patients
        .iter()
        .filter_map(|p| p.stage_description.as_deref());

    Ok(Json(AgeHistogramResponse {
        age_histogram: histogram(&ages, HISTOGRAM_BINS),
        stage_counts: category_counts(stages),
    }))
}
