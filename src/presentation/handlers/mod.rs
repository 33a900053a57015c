//! HTTP处理器模块

pub mod admin;
pub mod health;
