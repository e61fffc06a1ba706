//! Web服务器

use std::net::SocketAddr;

use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use nlst_core::{NlstError, Result};

use crate::handlers::{
    api_root, charts_age_histogram, charts_volume_summary, filter_options, healthz, patient_data,
    structures, volume_data, AppState,
};

/// CORS配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsSettings {
    /// 精确匹配的允许来源列表
    pub allowed_origins: Vec<String>,
    /// 可选的来源正则（预览部署域名等）
    pub origin_regex: Option<String>,
    /// 是否允许携带凭据
    pub allow_credentials: bool,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:5173".to_string()],
            origin_regex: None,
            allow_credentials: false,
        }
    }
}

/// 由配置构造CORS中间件；正则非法时在启动阶段失败
pub fn build_cors(settings: &CorsSettings) -> Result<CorsLayer> {
    let exact = settings.allowed_origins.clone();
    let pattern = settings
        .origin_regex
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| NlstError::Config(format!("invalid cors.origin_regex: {e}")))?;

    let allow_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let Ok(origin) = origin.to_str() else {
            return false;
        };
        exact.iter().any(|o| o == origin)
            || pattern.as_ref().is_some_and(|re| re.is_match(origin))
    });

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);
    if settings.allow_credentials {
        cors = cors.allow_credentials(true);
    }
    Ok(cors)
}

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState, cors: &CorsSettings) -> Result<Self> {
        let app = create_app(state, build_cors(cors)?);
        Ok(Self { addr, app })
    }

    pub async fn run(self) -> Result<()> {
        info!("starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app).await?;
        Ok(())
    }
}

/// 组装路由与全局中间件
pub fn create_app(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        // 根路径与存活检查
        .route("/", get(api_root))
        .route("/healthz", get(healthz))
        // API路由
        .nest("/api", api_routes())
        // 全局中间件
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
}

/// 数据与图表路由
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/patient-data", get(patient_data))
        .route("/volume-data", get(volume_data))
        .route("/structures", get(structures))
        .route("/filter-options", get(filter_options))
        .route("/charts/volume-summary", get(charts_volume_summary))
        .route("/charts/age-histogram", get(charts_age_histogram))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use nlst_core::enrich::enrich;
    use nlst_core::{
        FilterOptions, FilterSpec, PatientRow, Timepoint, VolumeRecord, VolumeRow,
    };
    use nlst_engine::{filter_options_from_records, structures_from_records, DashboardSession};
    use nlst_warehouse::Warehouse;

    /// 内存桩仓库：对桩数据执行与真实仓库相同的过滤语义
    struct StubWarehouse {
        records: Vec<VolumeRecord>,
        patients: Vec<PatientRow>,
    }

    #[async_trait]
    impl Warehouse for StubWarehouse {
        async fn volume_records(
            &self,
            spec: &FilterSpec,
            _limit: Option<i64>,
        ) -> nlst_core::Result<Vec<VolumeRecord>> {
            Ok(spec.apply(&self.records))
        }

        async fn all_volume_records(
            &self,
            _limit: Option<i64>,
        ) -> nlst_core::Result<Vec<VolumeRecord>> {
            Ok(self.records.clone())
        }

        async fn patient_rows(&self) -> nlst_core::Result<Vec<PatientRow>> {
            Ok(self.patients.clone())
        }

        async fn structures(&self) -> nlst_core::Result<Vec<String>> {
            Ok(structures_from_records(&self.records))
        }

        async fn filter_options(&self) -> nlst_core::Result<FilterOptions> {
            Ok(filter_options_from_records(&self.records))
        }

        async fn ping(&self) -> nlst_core::Result<()> {
            Ok(())
        }
    }

    fn raw_row(
        structure: &str,
        seg_uid: &str,
        age: i64,
        smoking: &str,
        timepoint: Timepoint,
    ) -> VolumeRow {
        VolumeRow {
            patient_id: "100001".to_string(),
            study_instance_uid: "1.2.3".to_string(),
            source_segmented_series_uid: "1.2.4".to_string(),
            segmentation_series_uid: seg_uid.to_string(),
            structure: structure.to_string(),
            timepoint,
            age: Some(age),
            gender: Some("Male".to_string()),
            race: None,
            clinical_stage: Some("IA".to_string()),
            smoking_status: Some(smoking.to_string()),
            volume_mm3: Some(150.0),
        }
    }

    fn stub() -> StubWarehouse {
        let records = enrich(vec![
            raw_row("Aorta", "2.1", 55, "Never", Timepoint::T0),
            raw_row("Aorta", "2.2", 70, "Current", Timepoint::T1),
            raw_row("Liver", "2.3", 55, "Never", Timepoint::T0),
        ]);
        let patients = vec![
            PatientRow {
                patient_id: "100001".to_string(),
                age: Some(55),
                gender_description: Some("Male".to_string()),
                race_description: Some("White".to_string()),
                stage_description: Some("IA".to_string()),
                cigsmok_description: Some("Never".to_string()),
            },
            PatientRow {
                patient_id: "100002".to_string(),
                age: Some(70),
                gender_description: Some("Female".to_string()),
                race_description: Some("White".to_string()),
                stage_description: Some("IIA".to_string()),
                cigsmok_description: Some("Current".to_string()),
            },
        ];
        StubWarehouse { records, patients }
    }

    fn state_with(cached: bool, require_structure: bool) -> AppState {
        let warehouse = stub();
        let session = if cached {
            Some(Arc::new(DashboardSession::new(
                warehouse.records.clone(),
                warehouse.patients.clone(),
            )))
        } else {
            None
        };
        AppState {
            service_name: "nlst-api".to_string(),
            warehouse: Arc::new(warehouse),
            session,
            default_limit: 15_000,
            require_structure,
        }
    }

    fn app(cached: bool) -> Router {
        create_app(
            state_with(cached, true),
            build_cors(&CorsSettings::default()).unwrap(),
        )
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap();
        (status, value)
    }

    #[tokio::test]
    async fn test_root_reports_service() {
        let (status, body) = get_json(app(false), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "nlst-api");
    }

    #[tokio::test]
    async fn test_healthz() {
        let (status, body) = get_json(app(false), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_volume_data_requires_structure() {
        let (status, body) = get_json(app(false), "/api/volume-data").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_filter");
    }

    #[tokio::test]
    async fn test_structure_optional_when_configured() {
        for cached in [false, true] {
            let app = create_app(
                state_with(cached, false),
                build_cors(&CorsSettings::default()).unwrap(),
            );
            let (status, body) = get_json(app, "/api/volume-data").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body.as_array().unwrap().len(), 3);
        }
    }

    #[tokio::test]
    async fn test_volume_data_filters_and_builds_viewer_url() {
        let uri = "/api/volume-data?structure=Aorta&smoking_status=Never";
        let (status, body) = get_json(app(false), uri).await;
        assert_eq!(status, StatusCode::OK);

        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["structure"], "Aorta");
        assert_eq!(rows[0]["smoking_status"], "Never");
        assert_eq!(
            rows[0]["viewer_url"],
            "https://viewer.imaging.datacommons.cancer.gov/v3/viewer/\
             ?StudyInstanceUIDs=1.2.3&SeriesInstanceUIDs=1.2.4,2.1"
        );
        // 分类空值已填充为哨兵
        assert_eq!(rows[0]["race"], "N/A");
    }

    #[tokio::test]
    async fn test_volume_data_cached_mode_matches_stateless() {
        let uri = "/api/volume-data?structure=Aorta&min_age=60&max_age=80";
        let (_, stateless) = get_json(app(false), uri).await;
        let (_, cached) = get_json(app(true), uri).await;
        assert_eq!(stateless, cached);
        assert_eq!(stateless.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_structures_sorted() {
        let (status, body) = get_json(app(false), "/api/structures").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!(["Aorta", "Liver"]));
    }

    #[tokio::test]
    async fn test_filter_options_age_range() {
        let (status, body) = get_json(app(false), "/api/filter-options").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["age_range"]["min"], 55);
        assert_eq!(body["age_range"]["max"], 70);
    }

    #[tokio::test]
    async fn test_patient_data() {
        let (status, body) = get_json(app(false), "/api/patient-data").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_charts_volume_summary() {
        let uri = "/api/charts/volume-summary?structure=Aorta";
        for cached in [false, true] {
            let (status, body) = get_json(app(cached), uri).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["unique_segmentations"], 2);
            assert_eq!(body["volume_summary"].as_array().unwrap().len(), 2);

            // 查看器链接样例：去重且来自同一过滤子集
            let links = body["viewer_links"].as_array().unwrap();
            assert_eq!(links.len(), 2);
            assert_eq!(links[0]["segmentation_series_uid"], "2.1");
            assert!(links[0]["viewer_url"]
                .as_str()
                .unwrap()
                .starts_with("https://viewer.imaging.datacommons.cancer.gov/"));
        }
    }

    #[tokio::test]
    async fn test_charts_age_histogram_filters_by_smoking() {
        let uri = "/api/charts/age-histogram?smoking_status=Never";
        let (status, body) = get_json(app(false), uri).await;
        assert_eq!(status, StatusCode::OK);

        let counts = body["age_histogram"]["counts"].as_array().unwrap();
        let total: u64 = counts.iter().map(|c| c.as_u64().unwrap()).sum();
        assert_eq!(total, 1);
        assert_eq!(body["stage_counts"][0]["value"], "IA");
    }

    #[test]
    fn test_invalid_origin_regex_fails_at_startup() {
        let settings = CorsSettings {
            origin_regex: Some("(".to_string()),
            ..Default::default()
        };
        assert!(build_cors(&settings).is_err());
    }
}
