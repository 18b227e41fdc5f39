//! # Xun (寻)
//!
//! 纯 Rust 实现的 Ogg/Vorbis 可定位流式解码前端, 对标 libvorbisfile.
//!
//! Xun 把一个 Ogg 物理容器 (可能串接多个逻辑流) 打开为一张只读链路表,
//! 在其上以独立游标拉取 PCM 采样, 并支持三种随机定位方式:
//!
//! - **字节定位**: 对齐到目标偏移之后最近的页面;
//! - **采样定位**: 粒度位置二分 + 逐包丢弃, 采样级精确;
//! - **时间定位**: 按链路各自的采样率换算后委托采样定位.
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use xun::vorbis::LinkTable;
//!
//! let (table, _io) = LinkTable::open_path("music.ogg")?;
//! println!("{} 条链路, 总时长 {:.2} 秒", table.streams(), table.time_total(None));
//! # Ok::<(), xun::core::XunError>(())
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `xun-core` | 错误类型、CRC、PCM 输出格式 |
//! | `xun-vorbis` | 页面扫描、链路发现、解码游标与定位引擎 |

/// 核心类型 (错误、CRC、PCM 输出格式)
pub use xun_core as core;

/// Ogg/Vorbis 解码前端 (链路表、游标、定位)
pub use xun_vorbis as vorbis;

/// 获取 Xun 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
