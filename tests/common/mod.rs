//! 集成测试共用夹具: 在内存中手工构造完整的 Ogg/Vorbis 容器,
//! 并提供确定性的合成桩与可计数的 I/O 后端.
#![allow(dead_code)]
//!
//! 桩音频包约定: 首字节 0x00, 随后 u16 小端声明采样帧数, 其余为填充;
//! 页面粒度位置为链路内累计采样数.

use std::io::{self, SeekFrom};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use xun::core::XunResult;
use xun::core::crc::ogg_crc32;
use xun::vorbis::{IoBackend, IoContext, MemoryBackend, Packet, PageFlags, Synthesizer, VorbisInfo};

/// 构建一个 Ogg 页面 (含正确的 CRC), 支持一页多包
pub fn build_page(
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

fn identification_packet(channels: u8, rate: u32, nominal: i32) -> Vec<u8> {
    let mut pkt = Vec::new();
    pkt.push(1u8);
    pkt.extend_from_slice(b"vorbis");
    pkt.extend_from_slice(&0u32.to_le_bytes());
    pkt.push(channels);
    pkt.extend_from_slice(&rate.to_le_bytes());
    pkt.extend_from_slice(&0i32.to_le_bytes());
    pkt.extend_from_slice(&nominal.to_le_bytes());
    pkt.extend_from_slice(&0i32.to_le_bytes());
    pkt.push(0x88);
    pkt.push(1);
    pkt
}

fn comment_packet() -> Vec<u8> {
    let mut pkt = vec![3u8];
    pkt.extend_from_slice(b"vorbis");
    pkt.extend_from_slice(&3u32.to_le_bytes());
    pkt.extend_from_slice(b"xun");
    pkt.extend_from_slice(&0u32.to_le_bytes());
    pkt.push(1);
    pkt
}

fn setup_packet() -> Vec<u8> {
    let mut pkt = vec![5u8];
    pkt.extend_from_slice(b"vorbis");
    pkt.push(1);
    pkt
}

fn audio_packet(frames: u16, pad: usize) -> Vec<u8> {
    let mut pkt = vec![0u8];
    pkt.extend_from_slice(&frames.to_le_bytes());
    pkt.extend(std::iter::repeat_n(0u8, pad));
    pkt
}

/// 测试链路描述
pub struct LinkSpec {
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

    /// 链路总采样数
    pub fn pcm_length(&self) -> i64 {
        self.packets.iter().map(|&f| i64::from(f)).sum()
    }
}

/// 一条链路在容器中的落位
pub struct LinkLayout {
    /// 链路起始偏移
    pub start: i64,
    /// 音频数据起始偏移 (头包页之后)
    pub data_start: i64,
    /// 链路结束偏移
    pub end: i64,
    /// 各音频页的起始偏移
    pub audio_pages: Vec<i64>,
}

/// 串接若干链路构成完整容器, 同时返回每条链路的落位信息
pub fn build_container(specs: &[LinkSpec]) -> (Vec<u8>, Vec<LinkLayout>) {
    let mut data = Vec::new();
    let mut layouts = Vec::new();
    for spec in specs {
        let start = data.len() as i64;
        let mut seq = 0u32;

        let mut id = identification_packet(spec.channels, spec.rate, spec.nominal);
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
        let data_start = data.len() as i64;

        let n = spec.packets.len();
        let mut granule = 0i64;
        let mut audio_pages = Vec::new();
        for (i, &frames) in spec.packets.iter().enumerate() {
            audio_pages.push(data.len() as i64);
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

        layouts.push(LinkLayout {
            start,
            data_start,
            end: data.len() as i64,
            audio_pages,
        });
    }
    (data, layouts)
}

/// 合成桩: 按包内声明的帧数产出固定值采样
pub struct StubSynth {
    channels: usize,
    buffered: usize,
    initialized: bool,
}

impl StubSynth {
    pub fn new() -> Self {
        Self {
            channels: 0,
            buffered: 0,
            initialized: false,
        }
    }

    pub fn boxed() -> Box<dyn Synthesizer> {
        Box::new(Self::new())
    }
}

impl Synthesizer for StubSynth {
    fn init(&mut self, info: &VorbisInfo) -> XunResult<()> {
        self.channels = usize::from(info.channels);
        self.buffered = 0;
        self.initialized = true;
        Ok(())
    }

    fn send_packet(&mut self, packet: &Packet) -> XunResult<()> {
        if !self.initialized {
            return Err(xun::core::XunError::Fault("合成桩未初始化".into()));
        }
        if packet.data.len() < 3 || packet.data[0] & 0x01 != 0 {
            return Err(xun::core::XunError::Fault("合成桩收到非音频包".into()));
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

/// 统计 seek 次数的 I/O 后端, 用于验证发现阶段的探测代价
pub struct CountingBackend {
    inner: MemoryBackend,
    seeks: Arc<AtomicU64>,
}

impl CountingBackend {
    pub fn new(data: Vec<u8>) -> (Self, Arc<AtomicU64>) {
        let seeks = Arc::new(AtomicU64::new(0));
        (
            Self {
                inner: MemoryBackend::from_data(data),
                seeks: Arc::clone(&seeks),
            },
            seeks,
        )
    }
}

impl IoBackend for CountingBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.seeks.fetch_add(1, Ordering::Relaxed);
        self.inner.seek(pos)
    }

    fn position(&mut self) -> io::Result<u64> {
        self.inner.position()
    }

    fn size(&self) -> Option<u64> {
        self.inner.size()
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

/// 打开容器 (内存字节源)
pub fn open_table(data: &[u8]) -> xun::vorbis::LinkTable {
    let mut io = IoContext::new(Box::new(MemoryBackend::from_data(data.to_vec())));
    xun::vorbis::LinkTable::open(&mut io).expect("测试容器应能打开")
}

/// 在容器上建游标 (各自独立的内存字节源)
pub fn open_cursor(data: &[u8]) -> (std::sync::Arc<xun::vorbis::LinkTable>, xun::vorbis::DecodeCursor) {
    let table = std::sync::Arc::new(open_table(data));
    let io = IoContext::new(Box::new(MemoryBackend::from_data(data.to_vec())));
    let cursor = xun::vorbis::DecodeCursor::new(std::sync::Arc::clone(&table), io, StubSynth::boxed())
        .expect("游标初始化应成功");
    (table, cursor)
}
