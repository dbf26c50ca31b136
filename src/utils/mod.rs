//! 通用工具模块

pub mod codec;
pub mod hash;
