//! 查询执行与结果行映射
//!
//! 对仓库执行已构造的参数化查询，逐列校验结果schema并映射到
//! 核心模型。体积单位在入口处统一换算为立方毫米。瞬态网络
//! 错误做一次有界重试，查询本身被拒绝时立即失败。

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::{error, warn};

use nlst_core::enrich::enrich;
use nlst_core::{
    AgeRange, FilterOptions, FilterSpec, NlstError, PatientRow, Result, VolumeRecord, VolumeRow,
};

use crate::connection::{WarehouseConfig, WarehousePool};
use crate::query::{BindValue, BuiltQuery, QueryBuilder};

/// 重试前的退避时间
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// 数据仓库的读取能力抽象
///
/// Web层只依赖本trait，测试用内存桩实现替代真实仓库。
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// 按过滤条件取体积测量记录（服务端过滤 + 富集）
    async fn volume_records(
        &self,
        spec: &FilterSpec,
        limit: Option<i64>,
    ) -> Result<Vec<VolumeRecord>>;

    /// 取全量体积表（受行数上限约束），供缓存会话一次性加载
    async fn all_volume_records(&self, limit: Option<i64>) -> Result<Vec<VolumeRecord>>;

    /// 人口学统计行
    async fn patient_rows(&self) -> Result<Vec<PatientRow>>;

    /// 去重排序后的解剖结构名
    async fn structures(&self) -> Result<Vec<String>>;

    /// 下拉框候选项与年龄范围
    async fn filter_options(&self) -> Result<FilterOptions>;

    /// 仓库健康检查
    async fn ping(&self) -> Result<()>;
}

/// 基于sqlx连接池的仓库客户端
#[derive(Debug, Clone)]
pub struct SqlWarehouse {
    pool: WarehousePool,
    config: WarehouseConfig,
    queries: QueryBuilder,
}

impl SqlWarehouse {
    pub fn new(pool: WarehousePool, config: WarehouseConfig) -> Self {
        let queries = QueryBuilder::new(
            &config.volume_table,
            &config.clinical_table,
            &config.volume_column,
        );
        Self {
            pool,
            config,
            queries,
        }
    }

    /// 执行一条已构造的查询；瞬态错误重试一次后传播
    async fn fetch_all(&self, built: &BuiltQuery) -> Result<Vec<PgRow>> {
        match self.run_once(built).await {
            Err(e) if is_transient(&e) => {
                warn!("transient warehouse error, retrying once: {e}");
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.run_once(built).await.map_err(|e| wrap(built, e))
            }
            Err(e) => Err(wrap(built, e)),
            Ok(rows) => Ok(rows),
        }
    }

    async fn run_once(&self, built: &BuiltQuery) -> std::result::Result<Vec<PgRow>, sqlx::Error> {
        let mut query = sqlx::query(&built.sql);
        for bind in &built.binds {
            query = match bind {
                BindValue::Text(v) => query.bind(v),
                BindValue::Int(v) => query.bind(v),
            };
        }
        query.fetch_all(self.pool.pool()).await
    }

    fn map_volume_row(&self, row: &PgRow) -> Result<VolumeRow> {
        let timepoint: String = get_col(row, "timepoint")?;
        let volume: Option<f64> = get_col(row, "volume")?;
        let factor = self.config.volume_unit.to_mm3_factor();

        Ok(VolumeRow {
            patient_id: get_col(row, "patient_id")?,
            study_instance_uid: get_col(row, "study_instance_uid")?,
            source_segmented_series_uid: get_col(row, "source_segmented_series_uid")?,
            segmentation_series_uid: get_col(row, "segmentation_series_uid")?,
            structure: get_col(row, "structure")?,
            timepoint: timepoint.parse()?,
            age: get_col(row, "age")?,
            gender: get_col(row, "gender")?,
            race: get_col(row, "race")?,
            clinical_stage: get_col(row, "clinical_stage")?,
            smoking_status: get_col(row, "smoking_status")?,
            volume_mm3: volume.map(|v| v * factor),
        })
    }

    async fn fetch_volume_records(
        &self,
        spec: &FilterSpec,
        limit: Option<i64>,
        require_structure: bool,
    ) -> Result<Vec<VolumeRecord>> {
        let limit = limit.unwrap_or(self.config.default_limit);
        let built = self.queries.volume_query(spec, limit, require_structure)?;
        let rows = self.fetch_all(&built).await?;

        let mut volume_rows = Vec::with_capacity(rows.len());
        for row in &rows {
            volume_rows.push(self.map_volume_row(row)?);
        }
        Ok(enrich(volume_rows))
    }
}

#[async_trait]
impl Warehouse for SqlWarehouse {
    async fn volume_records(
        &self,
        spec: &FilterSpec,
        limit: Option<i64>,
    ) -> Result<Vec<VolumeRecord>> {
        self.fetch_volume_records(spec, limit, self.config.require_structure)
            .await
    }

    async fn all_volume_records(&self, limit: Option<i64>) -> Result<Vec<VolumeRecord>> {
        self.fetch_volume_records(&FilterSpec::default(), limit, false)
            .await
    }

    async fn patient_rows(&self) -> Result<Vec<PatientRow>> {
        let built = self.queries.patient_query();
        let rows = self.fetch_all(&built).await?;

        let mut patients = Vec::with_capacity(rows.len());
        for row in &rows {
            patients.push(PatientRow {
                patient_id: get_col(row, "patient_id")?,
                age: get_col(row, "age")?,
                gender_description: get_col(row, "gender_description")?,
                race_description: get_col(row, "race_description")?,
                stage_description: get_col(row, "stage_description")?,
                cigsmok_description: get_col(row, "cigsmok_description")?,
            });
        }
        Ok(patients)
    }

    async fn structures(&self) -> Result<Vec<String>> {
        let built = self.queries.structures_query();
        let rows = self.fetch_all(&built).await?;

        rows.iter().map(|row| get_col(row, "structure")).collect()
    }

    async fn filter_options(&self) -> Result<FilterOptions> {
        let built = self.queries.filter_options_query();
        let rows = self.fetch_all(&built).await?;

        let mut options = Vec::with_capacity(rows.len());
        for row in &rows {
            options.push(OptionsRow {
                smoking_status: get_col(row, "smoking_status")?,
                gender: get_col(row, "gender")?,
                race: get_col(row, "race")?,
                clinical_stage: get_col(row, "clinical_stage")?,
                age: get_col(row, "age")?,
            });
        }
        Ok(fold_filter_options(&options))
    }

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}

/// filter-options查询的一行去重组合
#[derive(Debug, Clone)]
pub struct OptionsRow {
    pub smoking_status: Option<String>,
    pub gender: Option<String>,
    pub race: Option<String>,
    pub clinical_stage: Option<String>,
    pub age: Option<i64>,
}

/// 把去重组合折叠为每列的排序候选集合与年龄范围
///
/// 空值不进入候选集合；数据集中完全没有年龄时退回 [0, 100]。
pub fn fold_filter_options(rows: &[OptionsRow]) -> FilterOptions {
    let mut smoking = BTreeSet::new();
    let mut gender = BTreeSet::new();
    let mut race = BTreeSet::new();
    let mut stage = BTreeSet::new();
    let mut min_age: Option<i64> = None;
    let mut max_age: Option<i64> = None;

    for row in rows {
        if let Some(v) = &row.smoking_status {
            smoking.insert(v.clone());
        }
        if let Some(v) = &row.gender {
            gender.insert(v.clone());
        }
        if let Some(v) = &row.race {
            race.insert(v.clone());
        }
        if let Some(v) = &row.clinical_stage {
            stage.insert(v.clone());
        }
        if let Some(age) = row.age {
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

/// 取列值，缺列或类型漂移映射为schema错误
fn get_col<'r, T>(row: &'r PgRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column).map_err(|e| match e {
        sqlx::Error::ColumnNotFound(c) => NlstError::SchemaMismatch { column: c },
        sqlx::Error::ColumnDecode { index, .. } => NlstError::SchemaMismatch { column: index },
        other => NlstError::UpstreamQuery(other.to_string()),
    })
}

/// 是否为值得单次重试的瞬态错误
fn is_transient(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut)
}

/// 包装上游错误，附带查询前缀作为上下文（SQL不含用户值，无PII）
fn wrap(built: &BuiltQuery, error: sqlx::Error) -> NlstError {
    let prefix: String = built.sql.chars().take(80).collect();
    error!("warehouse query failed: {error} (query: {prefix}...)");
    NlstError::UpstreamQuery(error.to_string())
}
