//! 定位引擎: 字节 / 采样 / 时间三种定位方式.
//!
//! 字节定位对齐到目标之后最近的页面并重建解码状态;
//! 采样定位先按链路划分目标, 再在链路字节区间内按粒度位置二分,
//! 最后逐包丢弃采样直到精确命中; 时间定位按链路采样率换算后
//! 委托给采样定位. 任何定位失败都把游标清回未定位哨兵.

use log::debug;
use xun_core::{XunError, XunResult};

use crate::cursor::DecodeCursor;
use crate::page::{self, CHUNK_SIZE};

/// 丢弃采样阶段容忍的无进展迭代上限
///
/// 损坏的尾部数据可能让包泵既不产出采样也不推进粒度;
/// 超过此阈值视为码流无法推进, 以硬错误终止而非死循环.
const MAX_STAGNANT_PUMPS: u32 = 64;

impl DecodeCursor {
    /// 字节定位: 对齐到 `pos` 或其后最近的页面, 重建解码状态
    ///
    /// 成功后游标的采样位置已重新定出; 若 `pos` 之后直到容器末尾都没有
    /// 可解析的粒度位置, 位置吸附到采样总数 (容器末端).
    pub fn raw_seek(&mut self, pos: i64) -> XunResult<()> {
        if !self.table.seekable() {
            return Err(XunError::NotSeekable);
        }
        let total = self.table.raw_total(None);
        if pos < 0 || pos > total {
            self.clear_decode_state();
            return Err(XunError::SeekOutOfRange);
        }

        self.clear_decode_state();
        match page::next_page(&mut self.io, pos, -1) {
            Ok((off, _)) => {
                self.raw_offset = off;
                self.page_offset = off;
            }
            Err(XunError::Eof) => {
                // pos 之后没有完整页面: 游标落在容器尾部
                self.raw_offset = total;
                self.page_offset = total;
                self.pcm_offset = self.table.pcm_total(None);
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        // 泵包直到定出采样位置
        loop {
            match self.process_packet(true) {
                Ok(()) => {
                    if self.pcm_offset >= 0 {
                        return Ok(());
                    }
                }
                Err(XunError::Hole) => continue,
                Err(XunError::Eof) => {
                    self.pcm_offset = self.table.pcm_total(None);
                    return Ok(());
                }
                Err(e) => {
                    self.clear_decode_state();
                    return Err(e);
                }
            }
        }
    }

    /// 采样定位: 精确定位到全局采样位置 `target`
    pub fn pcm_seek(&mut self, target: i64) -> XunResult<()> {
        if !self.table.seekable() {
            return Err(XunError::NotSeekable);
        }
        let total = self.table.pcm_total(None);
        if target < 0 || target > total {
            self.clear_decode_state();
            return Err(XunError::SeekOutOfRange);
        }

        // 1. 自最高链路向下做减法, 确定目标链路
        let mut link_idx = self.table.streams();
        let mut preceding = total;
        while link_idx > 0 {
            link_idx -= 1;
            preceding -= self.table.pcm_total(Some(link_idx)).max(0);
            if target >= preceding {
                break;
            }
        }
        let local_target = target - preceding;

        // 2. 在链路字节区间内按粒度位置二分
        let (range_begin, range_end) = self
            .table
            .link_range(link_idx)
            .ok_or_else(|| XunError::Fault("目标链路索引越界".into()))?;
        let serial = self
            .table
            .link(link_idx)
            .map(|l| l.serial_number)
            .ok_or_else(|| XunError::Fault("目标链路索引越界".into()))?;

        let mut begin = range_begin;
        let mut end = range_end;
        let mut best = range_begin;
        while begin < end {
            let bisect = if end - begin < CHUNK_SIZE as i64 {
                begin
            } else {
                (begin + end) / 2
            };
            match self.probe_granule(bisect, range_end, serial)? {
                Some((off, page_end, granule)) => {
                    if granule < local_target {
                        // 该页在目标之前结束, 候选落点前移
                        best = off;
                        begin = page_end;
                    } else {
                        end = bisect;
                    }
                }
                None => end = bisect,
            }
        }
        debug!(
            "pcm 定位: 目标 {target} (链路 {link_idx} 内 {local_target}), 候选页偏移 {best}",
        );

        // 3. 定位到候选页, 重建解码状态并定出位置
        self.raw_seek(best)?;

        // 4. 逐包丢弃采样直到精确命中
        let mut last_raw = self.raw_offset;
        let mut stagnant = 0u32;
        while self.pcm_offset >= 0 && self.pcm_offset < target {
            let available = self.synth.samples_available() as i64;
            if available > 0 {
                let skip = available.min(target - self.pcm_offset);
                self.synth.consume(skip as usize);
                self.pcm_offset += skip;
                continue;
            }
            match self.process_packet(true) {
                Ok(()) | Err(XunError::Hole) => {}
                Err(XunError::Eof) => {
                    self.pcm_offset = total;
                    return Ok(());
                }
                Err(e) => {
                    self.clear_decode_state();
                    return Err(e);
                }
            }
            // 无进展保护: 包泵既不产出采样也不推进字节位置
            if self.raw_offset > last_raw {
                last_raw = self.raw_offset;
                stagnant = 0;
            } else {
                stagnant += 1;
                if stagnant > MAX_STAGNANT_PUMPS {
                    self.clear_decode_state();
                    return Err(XunError::Fault("采样定位在损坏数据上无法推进".into()));
                }
            }
        }
        Ok(())
    }

    /// 时间定位: 按链路各自的采样率把秒换算为采样位置, 委托采样定位
    pub fn time_seek(&mut self, seconds: f64) -> XunResult<()> {
        if !self.table.seekable() {
            return Err(XunError::NotSeekable);
        }
        if seconds < 0.0 || !seconds.is_finite() {
            self.clear_decode_state();
            return Err(XunError::SeekOutOfRange);
        }

        let mut time_acc = 0.0f64;
        let mut pcm_acc = 0i64;
        for i in 0..self.table.streams() {
            let Some(link) = self.table.link(i) else {
                break;
            };
            let Some(info) = &link.info else {
                continue;
            };
            let rate = f64::from(info.sample_rate);
            let span = link.pcm_length as f64 / rate;
            if seconds < time_acc + span {
                let target = pcm_acc + ((seconds - time_acc) * rate).floor() as i64;
                return self.pcm_seek(target);
            }
            time_acc += span;
            pcm_acc += link.pcm_length;
        }

        // 恰好等于总时长时允许定位到容器末端
        if (seconds - time_acc).abs() < 1e-9 {
            return self.pcm_seek(pcm_acc);
        }
        self.clear_decode_state();
        Err(XunError::SeekOutOfRange)
    }

    /// 在 `[from, limit)` 内向前探测第一个属于 `serial` 且带粒度位置的页面
    ///
    /// 返回 (页面偏移, 页面结束偏移, 粒度位置).
    fn probe_granule(
        &mut self,
        from: i64,
        limit: i64,
        serial: u32,
    ) -> XunResult<Option<(i64, i64, i64)>> {
        let mut cursor = from;
        while cursor < limit {
            match page::next_page(&mut self.io, cursor, limit - cursor) {
                Ok((off, pg)) => {
                    let page_end = off + pg.page_len();
                    if page_end > limit {
                        return Ok(None);
                    }
                    if pg.serial_number == serial && pg.granule_position >= 0 {
                        return Ok(Some((off, page_end, pg.granule_position)));
                    }
                    cursor = page_end;
                }
                Err(XunError::Eof) | Err(XunError::NeedMoreData) => return Ok(None),
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}
