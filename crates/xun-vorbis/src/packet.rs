//! 逻辑包 (Packet) 与页面到包的组装.
//!
//! 一个 packet 可能跨越多个页面; 组装器维护跨页残片,
//! 并在页序断裂或缺失起始片段时上报空洞信号.

use bytes::Bytes;
use log::debug;
use std::collections::VecDeque;

use crate::page::OggPage;

/// 从页面流中组装出的一个逻辑包
#[derive(Debug, Clone)]
pub struct Packet {
    /// 包数据
    pub data: Bytes,
    /// 粒度位置: 本包所在页完成的最后一个包携带页面粒度, 其余为 -1
    pub granule_position: i64,
    /// 是否为逻辑流末包 (所在页带 EOS 标志且本包是该页最后完成的包)
    pub eos: bool,
}

impl Packet {
    /// 是否为 Vorbis 头包 (头包首字节为奇数: 1/3/5)
    pub fn is_header(&self) -> bool {
        self.data.first().is_some_and(|b| b & 0x01 != 0)
    }

    /// 数据大小 (字节)
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// 页面到包的组装器
///
/// 单链路版本: 调用方保证送入的页面都属于同一逻辑流,
/// 链路切换时必须先 `reset`.
pub struct PacketAssembler {
    /// 跨页累积的不完整 packet 数据
    partial: Vec<u8>,
    /// 已组装完成、待取出的包
    queue: VecDeque<Packet>,
    /// 上一个页面序号
    last_page_sequence: Option<u32>,
    /// 正在丢弃无头续包 (缺少起始片段)
    discarding_orphan: bool,
}

impl PacketAssembler {
    /// 创建空组装器
    pub fn new() -> Self {
        Self {
            partial: Vec::new(),
            queue: VecDeque::new(),
            last_page_sequence: None,
            discarding_orphan: false,
        }
    }

    /// 清空全部组装状态 (seek 或链路切换后调用)
    pub fn reset(&mut self) {
        self.partial.clear();
        self.queue.clear();
        self.last_page_sequence = None;
        self.discarding_orphan = false;
    }

    /// 取出下一个组装完成的包
    pub fn next_packet(&mut self) -> Option<Packet> {
        self.queue.pop_front()
    }

    /// 送入一个页面, 返回本页是否暴露了丢包迹象
    ///
    /// 丢包迹象包括: 页序非自然 +1、应续未续的残片、无前置残片的续包.
    /// 即便返回 true, 本页可恢复的包仍已入队, 组装状态保持一致.
    pub fn submit_page(&mut self, page: &OggPage) -> bool {
        let mut hole = false;

        if let Some(prev) = self.last_page_sequence
            && page.page_sequence != prev.wrapping_add(1)
        {
            // 页面序号断裂/回绕, 清理残包避免跨断点拼包
            debug!(
                "页序断裂: {} -> {}, 丢弃 {} 字节残片",
                prev,
                page.page_sequence,
                self.partial.len(),
            );
            self.partial.clear();
            self.discarding_orphan = page.is_continued();
            hole = true;
        }
        self.last_page_sequence = Some(page.page_sequence);

        // 非续延页: 残留 partial 意味着上一包被截断; 同时结束无头续包丢弃状态
        if !page.is_continued() {
            if !self.partial.is_empty() {
                debug!("续包中断, 丢弃 {} 字节残片", self.partial.len());
                self.partial.clear();
                hole = true;
            }
            self.discarding_orphan = false;
        }

        let spans = page.packet_spans();
        let last_complete = spans.iter().rposition(|&(_, _, complete)| complete);

        for (i, &(offset, length, complete)) in spans.iter().enumerate() {
            let chunk = page.body.slice(offset..offset + length);
            let granule = if Some(i) == last_complete {
                page.granule_position
            } else {
                -1
            };
            let eos = page.is_eos() && Some(i) == last_complete;

            if i == 0 && page.is_continued() {
                if self.discarding_orphan || self.partial.is_empty() {
                    // 无头续包: 起始片段缺失, 整包丢弃
                    if !self.discarding_orphan {
                        hole = true;
                    }
                    self.discarding_orphan = !complete;
                    continue;
                }
                self.partial.extend_from_slice(&chunk);
                if complete {
                    let data = Bytes::from(std::mem::take(&mut self.partial));
                    self.queue.push_back(Packet {
                        data,
                        granule_position: granule,
                        eos,
                    });
                }
            } else if complete {
                self.queue.push_back(Packet {
                    data: chunk,
                    granule_position: granule,
                    eos,
                });
            } else {
                // 末段 255: 跨页缓存
                self.partial.extend_from_slice(&chunk);
            }
        }

        hole
    }
}

impl Default for PacketAssembler {
    fn default() -> Self {
        Self::new()
    }
}
