//! # xun-core
//!
//! Xun 前端核心库, 提供错误类型、CRC 校验与 PCM 输出格式定义.
//!
//! 本 crate 为上层的 Ogg/Vorbis 可定位解码前端提供底层基础设施.

pub mod crc;
pub mod error;
pub mod sample_format;

// 重导出常用类型
pub use error::{XunError, XunResult};
pub use sample_format::PcmFormat;
