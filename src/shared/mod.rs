//! 共享模块
//!
//! 包含跨层共享的错误处理和类型定义

pub mod error;

// 重新导出常用类型
pub use error::{AppError, AppResult};
