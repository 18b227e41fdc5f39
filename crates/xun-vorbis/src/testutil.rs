//! 测试夹具: 手工构造 CRC 合法的 Ogg 页面、链路与合成桩.
//!
//! 桩音频包约定: 首字节 0x00 (音频包), 随后 u16 小端声明本包采样帧数,
//! 其余为填充. 页面粒度位置为链路内累计采样数, 与真实 Vorbis 封装一致.

use xun_core::XunResult;
use xun_core::crc::ogg_crc32;

use crate::packet::Packet;
use crate::page::PageFlags;
use crate::vorbis::{Synthesizer, VorbisInfo};

/// 构建一个 Ogg 页面 (含正确的 CRC), 支持一页多包
pub(crate) fn build_page(
    flags: PageFlags,
    granule: i64,
    serial: u32,
    seq: u32,
    packets: &[&[u8]],
) -> Vec<u8> {
    let mut page = Vec::new();
    page.extend_from_slice(b"OggS");
    page.push(0);
    page.push(flags.bits());
    page.extend_from_slice(&(granule as u64).to_le_bytes());
    page.extend_from_slice(&serial.to_le_bytes());
    page.extend_from_slice(&seq.to_le_bytes());
    let crc_offset = page.len();
    page.extend_from_slice(&0u32.to_le_bytes());

    let mut segments = Vec::new();
    for pkt in packets {
        let mut remaining = pkt.len();
        while remaining >= 255 {
            segments.push(255u8);
            remaining -= 255;
        }
        segments.push(remaining as u8);
    }
    assert!(segments.len() <= 255, "测试页面段表过长");
    page.push(segments.len() as u8);
    page.extend_from_slice(&segments);
    for pkt in packets {
        page.extend_from_slice(pkt);
    }

    let crc = ogg_crc32(&page);
    page[crc_offset..crc_offset + 4].copy_from_slice(&crc.to_le_bytes());
    page
}

/// Vorbis identification 头包
pub(crate) fn identification_packet(
    channels: u8,
    rate: u32,
    upper: i32,
    nominal: i32,
    lower: i32,
) -> Vec<u8> {
    let mut pkt = Vec::new();
    pkt.push(1u8);
    pkt.extend_from_slice(b"vorbis");
    pkt.extend_from_slice(&0u32.to_le_bytes());
    pkt.push(channels);
    pkt.extend_from_slice(&rate.to_le_bytes());
    pkt.extend_from_slice(&upper.to_le_bytes());
    pkt.extend_from_slice(&nominal.to_le_bytes());
    pkt.extend_from_slice(&lower.to_le_bytes());
    pkt.push(0x88); // blocksize0 = blocksize1 = 256
    pkt.push(1); // framing
    pkt
}

/// Vorbis comment 头包 (空 comment 列表)
pub(crate) fn comment_packet() -> Vec<u8> {
    let mut pkt = vec![3u8];
    pkt.extend_from_slice(b"vorbis");
    pkt.extend_from_slice(&3u32.to_le_bytes());
    pkt.extend_from_slice(b"xun");
    pkt.extend_from_slice(&0u32.to_le_bytes());
    pkt.push(1);
    pkt
}

/// Vorbis setup 头包 (仅签名)
pub(crate) fn setup_packet() -> Vec<u8> {
    let mut pkt = vec![5u8];
    pkt.extend_from_slice(b"vorbis");
    pkt.push(1);
    pkt
}

/// 桩音频包
pub(crate) fn audio_packet(frames: u16, pad: usize) -> Vec<u8> {
    let mut pkt = vec![0u8];
    pkt.extend_from_slice(&frames.to_le_bytes());
    pkt.extend(std::iter::repeat_n(0u8, pad));
    pkt
}

/// 测试链路描述
pub(crate) struct LinkSpec {
    pub serial: u32,
    pub channels: u8,
    pub rate: u32,
    pub nominal: i32,
    /// 每页一个音频包, 值为该包的采样帧数
    pub packets: Vec<u16>,
    /// 每个音频包的填充字节数 (拉大页面体积)
    pub pad: usize,
    /// 把 identification 头包签名写坏, 制造降级链路
    pub corrupt_headers: bool,
}

impl LinkSpec {
    pub fn new(serial: u32, channels: u8, rate: u32) -> Self {
        Self {
            serial,
            channels,
            rate,
            nominal: 128_000,
            packets: Vec::new(),
            pad: 0,
            corrupt_headers: false,
        }
    }

    pub fn packets(mut self, frames: &[u16]) -> Self {
        self.packets = frames.to_vec();
        self
    }

    pub fn pad(mut self, pad: usize) -> Self {
        self.pad = pad;
        self
    }
}

/// 构建一条链路的完整字节流: BOS 头页 + comment/setup 页 + 音频页
pub(crate) fn build_link(spec: &LinkSpec) -> Vec<u8> {
    let mut data = Vec::new();
    let mut seq = 0u32;

    let mut id = identification_packet(spec.channels, spec.rate, 0, spec.nominal, 0);
    if spec.corrupt_headers {
        id[1] = b'x';
    }
    data.extend_from_slice(&build_page(PageFlags::BOS, 0, spec.serial, seq, &[&id]));
    seq += 1;
    data.extend_from_slice(&build_page(
        PageFlags::empty(),
        0,
        spec.serial,
        seq,
        &[&comment_packet(), &setup_packet()],
    ));
    seq += 1;

    let n = spec.packets.len();
    let mut granule = 0i64;
    for (i, &frames) in spec.packets.iter().enumerate() {
        granule += i64::from(frames);
        let flags = if i + 1 == n {
            PageFlags::EOS
        } else {
            PageFlags::empty()
        };
        let pkt = audio_packet(frames, spec.pad);
        data.extend_from_slice(&build_page(flags, granule, spec.serial, seq, &[&pkt]));
        seq += 1;
    }
    data
}

/// 串接若干链路构成完整容器
pub(crate) fn build_container(specs: &[LinkSpec]) -> Vec<u8> {
    let mut data = Vec::new();
    for spec in specs {
        data.extend_from_slice(&build_link(spec));
    }
    data
}

/// 合成桩: 按包内声明的帧数产出固定值采样
pub(crate) struct StubSynth {
    channels: usize,
    buffered: usize,
    initialized: bool,
    /// 初始化次数 (用于断言链路切换重建)
    pub init_count: usize,
}

impl StubSynth {
    pub fn new() -> Self {
        Self {
            channels: 0,
            buffered: 0,
            initialized: false,
            init_count: 0,
        }
    }
}

impl Synthesizer for StubSynth {
    fn init(&mut self, info: &VorbisInfo) -> XunResult<()> {
        self.channels = usize::from(info.channels);
        self.buffered = 0;
        self.initialized = true;
        self.init_count += 1;
        Ok(())
    }

    fn send_packet(&mut self, packet: &Packet) -> XunResult<()> {
        if !self.initialized {
            return Err(xun_core::XunError::Fault("合成桩未初始化".into()));
        }
        if packet.data.len() < 3 || packet.data[0] & 0x01 != 0 {
            return Err(xun_core::XunError::Fault("合成桩收到非音频包".into()));
        }
        let frames = u16::from_le_bytes([packet.data[1], packet.data[2]]);
        self.buffered += usize::from(frames);
        Ok(())
    }

    fn samples_available(&self) -> usize {
        self.buffered
    }

    fn pcm_out(&self, dst: &mut [f32]) -> usize {
        if self.channels == 0 {
            return 0;
        }
        let frames = (dst.len() / self.channels).min(self.buffered);
        dst[..frames * self.channels].fill(0.25);
        frames
    }

    fn consume(&mut self, frames: usize) {
        self.buffered -= frames.min(self.buffered);
    }

    fn reset(&mut self) {
        self.buffered = 0;
        self.initialized = false;
    }
}
