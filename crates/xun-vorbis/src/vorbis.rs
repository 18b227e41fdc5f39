//! Vorbis 编解码边界.
//!
//! 前端只解析 identification 头包获取流参数, comment/setup 头包做
//! 签名级校验后原样跳过; 音频包到 PCM 的合成由 [`Synthesizer`] trait
//! 背后的实现完成, 前端不假设任何 DSP 细节.

use std::fmt;
use xun_core::{XunError, XunResult};

use crate::packet::Packet;

/// Vorbis 流参数
///
/// 从 identification 头包解析, 随链路缓存在链路表中.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VorbisInfo {
    /// 声道数
    pub channels: u8,
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 比特率上界 (bps, 0 表示未声明)
    pub bitrate_upper: i32,
    /// 标称比特率 (bps, 0 表示未声明)
    pub bitrate_nominal: i32,
    /// 比特率下界 (bps, 0 表示未声明)
    pub bitrate_lower: i32,
}

impl fmt::Display for VorbisInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vorbis, {} ch, {} Hz, 标称 {} bps",
            self.channels, self.sample_rate, self.bitrate_nominal,
        )
    }
}

/// 解析 Vorbis identification 头包
///
/// 布局: type(1) + "vorbis"(6) + version(4) + channels(1) + sample_rate(4)
///       + bitrate_upper(4) + bitrate_nominal(4) + bitrate_lower(4)
///       + blocksizes(1) + framing(1)
pub fn parse_identification(packet: &[u8]) -> XunResult<VorbisInfo> {
    if packet.len() < 30 {
        return Err(XunError::NotVorbis(format!(
            "identification 头包长度不足: {}",
            packet.len(),
        )));
    }
    if packet[0] != 0x01 || &packet[1..7] != b"vorbis" {
        return Err(XunError::NotVorbis("identification 头包标识无效".into()));
    }

    let version = u32::from_le_bytes([packet[7], packet[8], packet[9], packet[10]]);
    if version != 0 {
        return Err(XunError::BadHeader(format!("版本不支持: {version}")));
    }

    let channels = packet[11];
    if channels == 0 {
        return Err(XunError::BadHeader("声道数不能为 0".into()));
    }

    let sample_rate = u32::from_le_bytes([packet[12], packet[13], packet[14], packet[15]]);
    if sample_rate == 0 {
        return Err(XunError::BadHeader("采样率不能为 0".into()));
    }

    let bitrate_upper = i32::from_le_bytes([packet[16], packet[17], packet[18], packet[19]]);
    let bitrate_nominal = i32::from_le_bytes([packet[20], packet[21], packet[22], packet[23]]);
    let bitrate_lower = i32::from_le_bytes([packet[24], packet[25], packet[26], packet[27]]);

    let bs = packet[28];
    let bs0_exp = bs & 0x0F;
    let bs1_exp = bs >> 4;
    if bs0_exp < 6 || bs1_exp < bs0_exp || bs1_exp > 13 {
        return Err(XunError::BadHeader(format!(
            "blocksize 非法: bs0_exp={bs0_exp}, bs1_exp={bs1_exp}",
        )));
    }

    if packet[29] & 0x01 == 0 {
        return Err(XunError::BadHeader(
            "identification 头包 framing_flag 非法".into(),
        ));
    }

    Ok(VorbisInfo {
        channels,
        sample_rate,
        bitrate_upper,
        bitrate_nominal,
        bitrate_lower,
    })
}

/// 校验 Vorbis comment 头包
///
/// 逐项走过 vendor 与 comment 列表确认长度一致, 内容不保留.
pub fn validate_comment(packet: &[u8]) -> XunResult<()> {
    if packet.len() < 8 {
        return Err(XunError::BadHeader("comment 头包长度不足".into()));
    }
    if packet[0] != 0x03 || &packet[1..7] != b"vorbis" {
        return Err(XunError::BadHeader("comment 头包标识无效".into()));
    }

    let mut pos = 7usize;
    let vendor_len = read_le_u32(packet, &mut pos)? as usize;
    ensure_left(packet, pos, vendor_len, "vendor 字段")?;
    pos += vendor_len;

    let comment_count = read_le_u32(packet, &mut pos)? as usize;
    for _ in 0..comment_count {
        let comment_len = read_le_u32(packet, &mut pos)? as usize;
        ensure_left(packet, pos, comment_len, "comment 项")?;
        pos += comment_len;
    }

    ensure_left(packet, pos, 1, "comment framing_flag")?;
    if packet[pos] & 0x01 == 0 {
        return Err(XunError::BadHeader("comment 头包 framing_flag 非法".into()));
    }

    Ok(())
}

/// 校验 Vorbis setup 头包的类型与签名
///
/// setup 内容 (codebook 等) 属于合成器职责, 这里只做边界识别.
pub fn validate_setup(packet: &[u8]) -> XunResult<()> {
    if packet.len() < 7 || packet[0] != 0x05 || &packet[1..7] != b"vorbis" {
        return Err(XunError::BadHeader("setup 头包标识无效".into()));
    }
    Ok(())
}

fn ensure_left(data: &[u8], pos: usize, need: usize, what: &str) -> XunResult<()> {
    if pos.saturating_add(need) > data.len() {
        return Err(XunError::BadHeader(format!(
            "{} 读取越界: pos={}, need={}, len={}",
            what,
            pos,
            need,
            data.len(),
        )));
    }
    Ok(())
}

fn read_le_u32(data: &[u8], pos: &mut usize) -> XunResult<u32> {
    ensure_left(data, *pos, 4, "u32 字段")?;
    let v = u32::from_le_bytes([data[*pos], data[*pos + 1], data[*pos + 2], data[*pos + 3]]);
    *pos += 4;
    Ok(v)
}

/// 合成器 trait
///
/// 把音频包合成为交错浮点 PCM. 所有具体合成实现都实现此 trait.
///
/// 合成流程:
/// 1. 调用 `init()` 以链路参数初始化合成上下文
/// 2. 调用 `send_packet()` 送入音频包 (头包不会被送入)
/// 3. 通过 `samples_available()` / `pcm_out()` 读取已合成采样
/// 4. 调用 `consume()` 标记采样已被取走
/// 5. 链路切换或 seek 后调用 `reset()` 丢弃全部中间状态
pub trait Synthesizer: Send {
    /// 以链路参数初始化合成上下文
    ///
    /// 可在 `reset()` 之后以不同参数再次调用 (链路切换).
    fn init(&mut self, info: &VorbisInfo) -> XunResult<()>;

    /// 送入一个音频包
    fn send_packet(&mut self, packet: &Packet) -> XunResult<()>;

    /// 已合成、尚未被取走的采样帧数 (每声道采样数)
    fn samples_available(&self) -> usize;

    /// 读取已合成的交错浮点采样, 不消耗
    ///
    /// 最多写入 `dst.len() / channels` 帧, 返回实际写入的帧数.
    fn pcm_out(&self, dst: &mut [f32]) -> usize;

    /// 标记 `frames` 帧采样已被取走
    fn consume(&mut self, frames: usize);

    /// 丢弃全部中间解码状态 (seek / 链路切换后调用)
    fn reset(&mut self);
}
