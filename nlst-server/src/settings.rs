//! 服务配置
//!
//! 配置来源：可选的配置文件 + `NLST_` 前缀的环境变量覆盖
//! （段与键之间用 `__` 分隔，如 `NLST_WAREHOUSE__DATABASE_URL`）。

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use nlst_core::{NlstError, Result};
use nlst_warehouse::WarehouseConfig;
use nlst_web::CorsSettings;

/// HTTP服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// 服务名（出现在根端点响应中）
    pub name: String,
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            name: "nlst-api".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// 完整服务配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub warehouse: WarehouseConfig,
    pub cors: CorsSettings,
}

impl Settings {
    /// 加载配置；文件缺失或字段非法时启动阶段直接失败
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        builder = builder.add_source(Environment::with_prefix("NLST").separator("__"));

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| NlstError::Config(e.to_string()))
    }
}
