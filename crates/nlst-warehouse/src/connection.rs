//! 数据仓库连接管理

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use nlst_core::{NlstError, Result};

/// 仓库端体积列的存储单位
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VolumeUnit {
    /// 立方毫米（规范单位）
    Mm3,
    /// 毫升，读取时换算为立方毫米
    Ml,
}

impl VolumeUnit {
    /// 换算到规范单位（立方毫米）的系数
    pub fn to_mm3_factor(&self) -> f64 {
        match self {
            VolumeUnit::Mm3 => 1.0,
            VolumeUnit::Ml => 1000.0,
        }
    }
}

impl Default for VolumeUnit {
    fn default() -> Self {
        VolumeUnit::Mm3
    }
}

/// 数据仓库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// 连接字符串
    pub database_url: String,
    /// 最大连接数
    pub max_connections: u32,
    /// 连接超时（秒）
    pub connect_timeout_secs: u64,
    /// 体积测量联合表名
    pub volume_table: String,
    /// 临床人口学统计表名
    pub clinical_table: String,
    /// 体积列名（volume_mm3 或 volume_ml，见 volume_unit）
    pub volume_column: String,
    /// 体积列的存储单位
    pub volume_unit: VolumeUnit,
    /// 体积查询默认行数上限
    pub default_limit: i64,
    /// volume-data查询是否要求指定structure
    pub require_structure: bool,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: 5,
            connect_timeout_secs: 10,
            volume_table: "volume_measurements_joined".to_string(),
            clinical_table: "clinical_data_mapping".to_string(),
            volume_column: "volume_mm3".to_string(),
            volume_unit: VolumeUnit::Mm3,
            default_limit: 15_000,
            require_structure: true,
        }
    }
}

impl WarehouseConfig {
    /// 校验配置，启动时快速失败
    pub fn validate(&self) -> Result<()> {
        if self.database_url.is_empty() {
            return Err(NlstError::Config(
                "warehouse.database_url is not set".to_string(),
            ));
        }
        if self.default_limit < 1 {
            return Err(NlstError::Config(
                "warehouse.default_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// 数据仓库连接池
#[derive(Debug, Clone)]
pub struct WarehousePool {
    pool: PgPool,
}

impl WarehousePool {
    /// 建立连接池；认证失败在此处直接暴露，进程应快速失败
    pub async fn connect(config: &WarehouseConfig) -> Result<Self> {
        config.validate()?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(|e| NlstError::UpstreamQuery(format!("connect failed: {e}")))?;

        info!("warehouse pool established");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 连接健康检查
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| NlstError::UpstreamQuery(format!("ping failed: {e}")))?;
        Ok(())
    }
}
