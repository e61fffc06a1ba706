//! # NLST Web
//!
//! HTTP交互层：axum路由、查询参数到过滤条件的翻译、
//! 错误分类到状态码的映射、CORS/压缩/追踪中间件。

pub mod handlers;
pub mod server;

pub use handlers::AppState;
pub use server::{CorsSettings, WebServer};
