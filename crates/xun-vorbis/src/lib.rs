//! # xun-vorbis
//!
//! Ogg/Vorbis 可定位流式解码前端, 对标 libvorbisfile 的
//! 打开/读取/定位能力:
//!
//! - 打开时以对数代价探明串接容器的逻辑流结构 (无需线性全扫描);
//! - 按字节偏移、解码采样位置或播放时间随机定位;
//! - 跨链路维护单调递增的全局 PCM 采样位置.
//!
//! # 使用流程
//!
//! 1. `LinkTable::open()` 打开字节源, 得到只读链路表
//! 2. `DecodeCursor::new()` 在链路表上创建游标 (可多个)
//! 3. `read_pcm()` 拉取打包好的交错 PCM
//! 4. `raw_seek()` / `pcm_seek()` / `time_seek()` 随机定位
//!
//! Vorbis 的 DSP 合成不在本 crate 内, 通过 [`Synthesizer`] trait 接入.

pub mod cursor;
mod discovery;
pub mod io;
pub mod link;
pub mod packet;
pub mod page;
mod seek;
pub mod vorbis;

#[cfg(test)]
pub(crate) mod testutil;

// 重导出常用类型
pub use cursor::DecodeCursor;
pub use io::{IoBackend, IoContext, MemoryBackend};
pub use link::{Link, LinkTable};
pub use packet::{Packet, PacketAssembler};
pub use page::{CHUNK_SIZE, OggPage, PageFlags};
pub use vorbis::{Synthesizer, VorbisInfo};
pub use xun_core::{PcmFormat, XunError, XunResult};
