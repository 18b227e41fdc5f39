//! Ogg 页面层: 解析与双向扫描.
//!
//! # Ogg 页面结构
//! ```text
//! Capture pattern: "OggS" (4 bytes)
//! Version:         1 byte (always 0)
//! Header type:     1 byte (flags: continued=0x01, BOS=0x02, EOS=0x04)
//! Granule pos:     8 bytes (little-endian, codec-specific)
//! Serial number:   4 bytes (identifies logical stream)
//! Page seq no:     4 bytes
//! CRC checksum:    4 bytes
//! Num segments:    1 byte
//! Segment table:   N bytes (each 1 byte, packet sizes)
//! Page data:       sum(segment_table) bytes
//! ```
//!
//! 段表中连续段累加, 遇到首个非 255 值段即组成一个完整的 packet 片段.
//!
//! 扫描层提供两个方向的页面查找:
//! - 向前扫描: 逐块补充窗口, 搜索同步字并做 CRC 校验, 定位下一个合法页面;
//! - 向后扫描: 以块为单位扩大回看窗口, 在窗口内向前扫描, 保留最后命中的页面.

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use std::io::SeekFrom;
use xun_core::crc::ogg_crc32_update;
use xun_core::{XunError, XunResult};

use crate::io::IoContext;

use bitflags::bitflags;

/// Ogg 同步字 (capture pattern)
pub(crate) const OGG_SYNC: &[u8; 4] = b"OggS";
/// 页面头固定部分长度 (不含段表)
const HEADER_FIXED_LEN: usize = 27;
/// 单次 I/O 块大小, 同时是二分探测的收敛粒度
pub const CHUNK_SIZE: usize = 64 * 1024;

bitflags! {
    /// 页面头部标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u8 {
        /// 本页第一个段延续上一页未完成的 packet
        const CONTINUED = 0x01;
        /// 逻辑流起始页 (beginning of stream)
        const BOS = 0x02;
        /// 逻辑流结束页 (end of stream)
        const EOS = 0x04;
    }
}

/// 已解析的 Ogg 页面
#[derive(Debug, Clone)]
pub struct OggPage {
    /// 头部标志
    pub flags: PageFlags,
    /// 粒度位置 (-1 表示本页无粒度锚点)
    pub granule_position: i64,
    /// 逻辑流序列号
    pub serial_number: u32,
    /// 页面序号 (用于乱序/丢页检测)
    pub page_sequence: u32,
    /// 段表
    pub segment_table: Vec<u8>,
    /// 页面数据
    pub body: Bytes,
}

/// 页面解析结果
pub(crate) enum PageParse {
    /// 解析出一个 CRC 合法的页面
    Page(OggPage),
    /// 窗口数据不足, 无法判定
    Incomplete,
    /// 不是合法页面 (需要从下一字节重新同步)
    Bad,
}

impl OggPage {
    /// 是否为 BOS (beginning of stream) 页面
    pub fn is_bos(&self) -> bool {
        self.flags.contains(PageFlags::BOS)
    }

    /// 是否为 EOS (end of stream) 页面
    pub fn is_eos(&self) -> bool {
        self.flags.contains(PageFlags::EOS)
    }

    /// 是否为续延页面 (第一个段属于上一页的 packet)
    pub fn is_continued(&self) -> bool {
        self.flags.contains(PageFlags::CONTINUED)
    }

    /// 头部长度 (含段表)
    pub fn header_len(&self) -> usize {
        HEADER_FIXED_LEN + self.segment_table.len()
    }

    /// 数据长度
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// 整页字节长度
    pub fn page_len(&self) -> i64 {
        (self.header_len() + self.body_len()) as i64
    }

    /// 从段表中提取 packet 片段边界
    ///
    /// 返回 (offset, length, is_complete) 列表; 末段为 255 时
    /// 最后一个片段跨页未完成.
    pub fn packet_spans(&self) -> Vec<(usize, usize, bool)> {
        let mut spans = Vec::new();
        let mut offset = 0usize;
        let mut current_len = 0usize;

        for &seg_size in &self.segment_table {
            current_len += seg_size as usize;
            if seg_size < 255 {
                spans.push((offset, current_len, true));
                offset += current_len;
                current_len = 0;
            }
        }

        if current_len > 0 {
            spans.push((offset, current_len, false));
        }

        spans
    }

    /// 从窗口缓冲区头部尝试解析一个页面
    ///
    /// `buf` 必须以候选同步点开头. CRC 覆盖整页, 其中 CRC 字段按 0 参与计算.
    pub(crate) fn parse(buf: &[u8]) -> PageParse {
        if buf.len() < HEADER_FIXED_LEN {
            return PageParse::Incomplete;
        }
        if &buf[0..4] != OGG_SYNC {
            return PageParse::Bad;
        }
        if buf[4] != 0 {
            // 版本号必须为 0
            return PageParse::Bad;
        }

        let num_segments = buf[26] as usize;
        let header_len = HEADER_FIXED_LEN + num_segments;
        if buf.len() < header_len {
            return PageParse::Incomplete;
        }
        let body_len: usize = buf[HEADER_FIXED_LEN..header_len]
            .iter()
            .map(|&s| s as usize)
            .sum();
        let total_len = header_len + body_len;
        if buf.len() < total_len {
            return PageParse::Incomplete;
        }

        let crc_stored = LittleEndian::read_u32(&buf[22..26]);
        let mut crc = ogg_crc32_update(0, &buf[..22]);
        crc = ogg_crc32_update(crc, &[0u8; 4]);
        crc = ogg_crc32_update(crc, &buf[26..total_len]);
        if crc != crc_stored {
            return PageParse::Bad;
        }

        PageParse::Page(OggPage {
            flags: PageFlags::from_bits_truncate(buf[5]),
            granule_position: LittleEndian::read_u64(&buf[6..14]) as i64,
            serial_number: LittleEndian::read_u32(&buf[14..18]),
            page_sequence: LittleEndian::read_u32(&buf[18..22]),
            segment_table: buf[HEADER_FIXED_LEN..header_len].to_vec(),
            body: Bytes::copy_from_slice(&buf[header_len..total_len]),
        })
    }
}

/// 从 `from` 开始向前扫描下一个合法页面
///
/// 同步点必须落在 `from` 起 `boundary` 字节之内 (`boundary < 0` 表示不限制).
/// 返回页面起始的绝对字节偏移与页面本身.
///
/// # 返回
/// - `Err(XunError::NeedMoreData)`: 限制范围内未找到同步点
/// - `Err(XunError::Eof)`: 字节源耗尽仍未找到完整页面
pub fn next_page(io: &mut IoContext, from: i64, boundary: i64) -> XunResult<(i64, OggPage)> {
    io.seek(SeekFrom::Start(from as u64))?;
    let mut window: Vec<u8> = Vec::with_capacity(CHUNK_SIZE);
    let mut base = from;
    let mut pos = 0usize;
    let mut eof = false;

    loop {
        while pos + 4 <= window.len() {
            if boundary >= 0 && base + pos as i64 - from >= boundary {
                return Err(XunError::NeedMoreData);
            }
            if &window[pos..pos + 4] != OGG_SYNC {
                pos += 1;
                continue;
            }
            match OggPage::parse(&window[pos..]) {
                PageParse::Page(page) => return Ok((base + pos as i64, page)),
                PageParse::Incomplete => {
                    if eof {
                        // 文件尾部无法补全的候选, 当作噪声继续搜索
                        pos += 1;
                        continue;
                    }
                    break;
                }
                PageParse::Bad => pos += 1,
            }
        }
        if eof {
            return Err(XunError::Eof);
        }

        // 丢弃已排除同步点的前缀, 控制窗口大小
        if pos > CHUNK_SIZE {
            window.drain(..pos);
            base += pos as i64;
            pos = 0;
        }

        let old_len = window.len();
        window.resize(old_len + CHUNK_SIZE, 0);
        let n = io.read(&mut window[old_len..])?;
        window.truncate(old_len + n);
        if n == 0 {
            eof = true;
        }
    }
}

/// 向后扫描 `[begin, end)` 范围内的最后一个页面
///
/// 以块为单位扩大回看窗口, 在窗口内向前扫描并保留最后命中的页面;
/// 窗口单调扩大到整个范围, 保证终止.
pub fn prev_page(io: &mut IoContext, begin: i64, end: i64) -> XunResult<(i64, OggPage)> {
    if end <= begin {
        return Err(XunError::Eof);
    }
    let mut window_begin = end;
    loop {
        window_begin = (window_begin - CHUNK_SIZE as i64).max(begin);
        if let Some(hit) = scan_last(io, window_begin, end, |_| true)? {
            return Ok(hit);
        }
        if window_begin == begin {
            return Err(XunError::Eof);
        }
    }
}

/// 向后扫描 `[begin, end)` 内最后一个属于 `serial` 且带粒度位置的页面
///
/// 返回 (页面偏移, 粒度位置). 用于求取链路的解码长度.
pub fn last_granule_page(
    io: &mut IoContext,
    begin: i64,
    end: i64,
    serial: u32,
) -> XunResult<(i64, i64)> {
    if end <= begin {
        return Err(XunError::Eof);
    }
    let mut window_begin = end;
    loop {
        window_begin = (window_begin - CHUNK_SIZE as i64).max(begin);
        let hit = scan_last(io, window_begin, end, |page| {
            page.serial_number == serial && page.granule_position >= 0
        })?;
        if let Some((off, page)) = hit {
            return Ok((off, page.granule_position));
        }
        if window_begin == begin {
            return Err(XunError::Eof);
        }
    }
}

/// 在 `[from, end)` 内向前扫描, 返回满足条件的最后一个页面
fn scan_last(
    io: &mut IoContext,
    from: i64,
    end: i64,
    keep: impl Fn(&OggPage) -> bool,
) -> XunResult<Option<(i64, OggPage)>> {
    let mut cursor = from;
    let mut found = None;
    while cursor < end {
        match next_page(io, cursor, end - cursor) {
            Ok((off, page)) => {
                let page_end = off + page.page_len();
                if page_end > end {
                    break;
                }
                cursor = page_end;
                if keep(&page) {
                    found = Some((off, page));
                }
            }
            Err(XunError::Eof) | Err(XunError::NeedMoreData) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(found)
}
