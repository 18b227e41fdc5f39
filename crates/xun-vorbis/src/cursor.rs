//! 解码游标: 页面/包流到 PCM 采样流的拉取式状态机.
//!
//! 每个游标持有独立的字节源、合成上下文与位置状态, 引用同一张只读
//! 链路表的多个游标互不干扰 (预览刮擦 + 正式播放可并存).
//!
//! 位置簿记的核心约定: `pcm_offset` 是下一个待返回采样在整个容器内的
//! 全局编号, 跨链路单调递增; -1 为 "未定位" 哨兵. 每当包泵遇到携带
//! 粒度位置的音频包, 便以 `粒度位置 - 未取走采样数 + 前序链路采样总和`
//! 反推出精确值.

use log::debug;
use std::sync::Arc;
use xun_core::{PcmFormat, XunError, XunResult};

use crate::io::IoContext;
use crate::link::LinkTable;
use crate::packet::PacketAssembler;
use crate::page;
use crate::vorbis::Synthesizer;

/// 解码游标
pub struct DecodeCursor {
    pub(crate) io: IoContext,
    pub(crate) table: Arc<LinkTable>,
    pub(crate) synth: Box<dyn Synthesizer>,
    pub(crate) assembler: PacketAssembler,
    /// 下一次页面扫描的起始偏移
    pub(crate) raw_offset: i64,
    /// 最近取入页面的起始偏移 (当前正在消费的页)
    pub(crate) page_offset: i64,
    /// 当前活动链路
    pub(crate) current_link: usize,
    /// 当前链路是否已有就绪的合成上下文
    pub(crate) decode_ready: bool,
    /// 下一个待返回采样的全局位置, -1 表示未定位
    pub(crate) pcm_offset: i64,
    /// 瞬时比特率累积: 自上次查询以来取入的比特数
    pub(crate) bit_track: f32,
    /// 瞬时比特率累积: 自上次查询以来返回的采样帧数
    pub(crate) sample_track: f32,
}

impl DecodeCursor {
    /// 在链路表上创建游标, 初始定位到容器起点
    ///
    /// 游标独占自己的字节源: 同一容器上的多个游标各自打开一份.
    pub fn new(
        table: Arc<LinkTable>,
        io: IoContext,
        synth: Box<dyn Synthesizer>,
    ) -> XunResult<Self> {
        let mut cursor = Self {
            io,
            table,
            synth,
            assembler: PacketAssembler::new(),
            raw_offset: 0,
            page_offset: 0,
            current_link: 0,
            decode_ready: false,
            pcm_offset: -1,
            bit_track: 0.0,
            sample_track: 0.0,
        };
        cursor.raw_seek(0)?;
        Ok(cursor)
    }

    /// 所属链路表
    pub fn table(&self) -> &LinkTable {
        &self.table
    }

    /// 当前活动链路索引
    pub fn current_link(&self) -> usize {
        self.current_link
    }

    /// 当前字节位置: 正在消费的页面的起始偏移
    ///
    /// 字节定位到页面边界后, 该值即为落点页面的偏移.
    pub fn raw_tell(&self) -> i64 {
        self.page_offset
    }

    /// 当前采样位置 (-1 表示未定位)
    pub fn pcm_tell(&self) -> i64 {
        self.pcm_offset
    }

    /// 当前时间位置 (秒), 按链路各自的采样率分段换算
    pub fn time_tell(&self) -> f64 {
        if self.pcm_offset < 0 {
            return -1.0;
        }
        let mut acc = 0i64;
        let mut seconds = 0.0;
        let last = self.table.streams().saturating_sub(1);
        for i in 0..self.table.streams() {
            let Some(link) = self.table.link(i) else {
                break;
            };
            let Some(info) = &link.info else {
                continue;
            };
            let rate = f64::from(info.sample_rate);
            if self.pcm_offset < acc + link.pcm_length || i == last {
                return seconds + (self.pcm_offset - acc) as f64 / rate;
            }
            acc += link.pcm_length;
            seconds += link.pcm_length as f64 / rate;
        }
        -1.0
    }

    /// 清空解码状态, 位置回到未定位哨兵
    pub(crate) fn clear_decode_state(&mut self) {
        self.synth.reset();
        self.assembler.reset();
        self.decode_ready = false;
        self.pcm_offset = -1;
        self.bit_track = 0.0;
        self.sample_track = 0.0;
    }

    /// 包泵: 向合成器推进一个音频包
    ///
    /// # 返回
    /// - `Ok(())`: 送入了一个音频包
    /// - `Err(NeedMoreData)`: `readp == false` 且没有缓冲的包
    /// - `Err(Hole)`: 检测到丢页/坏页, 状态已推进, 可继续调用
    /// - `Err(Eof)`: 容器中没有更多页面
    /// - `Err(Fault)`: 出现未知序列号的页面 (伪造/错乱码流)
    pub fn process_packet(&mut self, readp: bool) -> XunResult<()> {
        loop {
            if self.decode_ready {
                while let Some(pkt) = self.assembler.next_packet() {
                    if pkt.data.is_empty() || pkt.is_header() {
                        // 头包与空包不参与合成
                        continue;
                    }
                    self.synth.send_packet(&pkt)?;
                    if pkt.granule_position >= 0 && !pkt.eos {
                        let unreturned = self.synth.samples_available() as i64;
                        self.pcm_offset = pkt.granule_position - unreturned
                            + self.table.pcm_preceding(self.current_link);
                    }
                    return Ok(());
                }
            }
            if !readp {
                return Err(XunError::NeedMoreData);
            }
            self.fetch_page()?;
        }
    }

    /// 取下一页并推进链路状态机
    fn fetch_page(&mut self) -> XunResult<()> {
        let (off, pg) = page::next_page(&mut self.io, self.raw_offset, -1)?;
        let skipped = off > self.raw_offset;
        self.bit_track += (pg.page_len() * 8) as f32;
        self.raw_offset = off + pg.page_len();
        self.page_offset = off;

        let link_idx = self.table.find_serial(pg.serial_number).ok_or_else(|| {
            XunError::Fault(format!("页面携带未知逻辑流序列号: {}", pg.serial_number))
        })?;

        // 序列号切换或尚未就绪: (重) 建当前链路的合成上下文
        if !self.decode_ready || link_idx != self.current_link {
            let link = self
                .table
                .link(link_idx)
                .ok_or_else(|| XunError::Fault("链路索引越界".into()))?;
            let Some(info) = &link.info else {
                return Err(XunError::BadHeader(format!(
                    "链路 {link_idx} 为降级链路, 无法建立解码上下文",
                )));
            };
            if self.decode_ready {
                debug!("链路切换: {} -> {}", self.current_link, link_idx);
            }
            self.synth.reset();
            self.synth.init(info)?;
            self.assembler.reset();
            self.current_link = link_idx;
            self.decode_ready = true;
        }

        let page_hole = self.assembler.submit_page(&pg);
        if skipped || page_hole {
            return Err(XunError::Hole);
        }
        Ok(())
    }

    /// 读取解码后的交错 PCM, 按指定格式打包进 `out`
    ///
    /// 返回 (写入字节数, 数据来源链路). 链路边界处声道数/采样率可能改变,
    /// 调用方应按返回的链路索引查询当前流参数.
    ///
    /// # 返回
    /// - `Err(Eof)`: 容器播放完毕
    /// - `Err(Hole)`: 数据空洞, 可再次调用以跳过并继续
    pub fn read_pcm(&mut self, out: &mut [u8], format: PcmFormat) -> XunResult<(usize, usize)> {
        while !self.decode_ready || self.synth.samples_available() == 0 {
            self.process_packet(true)?;
        }

        let link = self
            .table
            .link(self.current_link)
            .ok_or_else(|| XunError::Fault("链路索引越界".into()))?;
        let channels = link
            .info
            .as_ref()
            .map(|i| usize::from(i.channels))
            .unwrap_or(1);
        let frame_bytes = channels * format.bytes_per_sample();
        let max_frames = out.len() / frame_bytes;
        if max_frames == 0 {
            return Ok((0, self.current_link));
        }

        let frames = self.synth.samples_available().min(max_frames);
        let mut pcm = vec![0f32; frames * channels];
        let got = self.synth.pcm_out(&mut pcm);
        let frames = got.min(frames);
        let bytes = format.pack(&pcm[..frames * channels], out);
        self.synth.consume(frames);

        if self.pcm_offset >= 0 {
            self.pcm_offset += frames as i64;
        }
        self.sample_track += frames as f32;
        Ok((bytes, self.current_link))
    }

    /// 瞬时比特率: 自上次调用以来的比特数折算到当前链路采样率
    ///
    /// 每次调用都会清零累积器; 尚无采样经过时返回 -1.
    pub fn bitrate_instant(&mut self) -> i64 {
        if self.sample_track <= 0.0 {
            return -1;
        }
        let Some(info) = self
            .table
            .link(self.current_link)
            .and_then(|l| l.info.as_ref())
        else {
            return -1;
        };
        let value = self.bit_track / self.sample_track * info.sample_rate as f32;
        self.bit_track = 0.0;
        self.sample_track = 0.0;
        value.round() as i64
    }
}
