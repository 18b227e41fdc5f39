//! 链路表: 容器内逻辑流的编目.
//!
//! 一个物理容器可能串接多个逻辑流 (链路). 链路表在 `open` 时一次性
//! 构建, 此后完全不可变, 可被多个解码游标以只读方式共享, 无需加锁.

use log::debug;
use xun_core::{XunError, XunResult};

use crate::discovery;
use crate::io::IoContext;
use crate::vorbis::VorbisInfo;

/// 一条逻辑流 (链路) 的编目信息
#[derive(Debug, Clone)]
pub struct Link {
    /// 逻辑流序列号
    pub serial_number: u32,
    /// 音频包起始的字节偏移 (3 个头包之后); -1 表示头包获取失败的降级链路
    pub data_offset: i64,
    /// 本链路解码采样总数 (由末页粒度位置导出; 降级链路为 0)
    pub pcm_length: i64,
    /// 缓存的流参数 (降级链路为 None)
    pub info: Option<VorbisInfo>,
}

impl Link {
    /// 是否为降级链路 (头包获取失败, 仅保留字节范围)
    pub fn is_degenerate(&self) -> bool {
        self.data_offset < 0
    }
}

/// 链路表
///
/// 容器级只读模型: 字节范围划分 (`offsets`) 与各链路的编目信息.
/// `offsets.len() == links.len() + 1`, 严格递增;
/// 链路 i 占据字节区间 `[offsets[i], offsets[i+1])`.
#[derive(Debug)]
pub struct LinkTable {
    seekable: bool,
    offsets: Vec<i64>,
    links: Vec<Link>,
}

impl LinkTable {
    /// 构建链路表并校验结构不变量
    pub(crate) fn new(seekable: bool, offsets: Vec<i64>, links: Vec<Link>) -> XunResult<Self> {
        if offsets.len() != links.len() + 1 {
            return Err(XunError::Fault(format!(
                "链路表结构错误: {} 条链路对应 {} 个偏移",
                links.len(),
                offsets.len(),
            )));
        }
        if offsets.windows(2).any(|w| w[1] <= w[0]) {
            return Err(XunError::Fault("链路偏移必须严格递增".into()));
        }
        Ok(Self {
            seekable,
            offsets,
            links,
        })
    }

    /// 打开一个可随机访问的字节源, 发现全部链路
    ///
    /// 失败语义: 首链路头包无效时整个 open 失败;
    /// 次级链路的头包失败只将该链路降级, 不中断发现.
    pub fn open(io: &mut IoContext) -> XunResult<Self> {
        let table = discovery::open(io)?;
        debug!(
            "链路表就绪: {} 条链路, 总字节 {}, 总采样 {}",
            table.streams(),
            table.raw_total(None),
            table.pcm_total(None),
        );
        Ok(table)
    }

    /// 从文件路径打开
    pub fn open_path(path: &str) -> XunResult<(Self, IoContext)> {
        let mut io = IoContext::open_read(path)?;
        let table = Self::open(&mut io)?;
        Ok((table, io))
    }

    /// 链路数量
    pub fn streams(&self) -> usize {
        self.links.len()
    }

    /// 容器是否可随机访问
    pub fn seekable(&self) -> bool {
        self.seekable
    }

    /// 按索引取链路
    pub fn link(&self, index: usize) -> Option<&Link> {
        self.links.get(index)
    }

    /// 按序列号查找链路索引
    pub fn find_serial(&self, serial: u32) -> Option<usize> {
        self.links.iter().position(|l| l.serial_number == serial)
    }

    /// 链路 `index` 的字节区间 `[start, end)`
    pub fn link_range(&self, index: usize) -> Option<(i64, i64)> {
        if index < self.links.len() {
            Some((self.offsets[index], self.offsets[index + 1]))
        } else {
            None
        }
    }

    /// 链路 `index` 之前所有链路的解码采样总数
    pub(crate) fn pcm_preceding(&self, index: usize) -> i64 {
        self.links[..index.min(self.links.len())]
            .iter()
            .map(|l| l.pcm_length)
            .sum()
    }

    /// 压缩字节总量
    ///
    /// `link == None` 按链路逐条累加; 指定链路返回该链路的字节区间长度.
    /// 未知 (链路索引无效或不可定位) 返回 -1.
    pub fn raw_total(&self, link: Option<usize>) -> i64 {
        if !self.seekable {
            return -1;
        }
        match link {
            None => {
                let mut acc = 0i64;
                for i in 0..self.links.len() {
                    acc += self.raw_total(Some(i));
                }
                acc
            }
            Some(i) if i < self.links.len() => self.offsets[i + 1] - self.offsets[i],
            Some(_) => -1,
        }
    }

    /// 解码采样总数
    ///
    /// 降级链路的数值未知, 返回 -1; 聚合时跳过降级链路.
    pub fn pcm_total(&self, link: Option<usize>) -> i64 {
        if !self.seekable {
            return -1;
        }
        match link {
            None => self
                .links
                .iter()
                .filter(|l| !l.is_degenerate())
                .map(|l| l.pcm_length)
                .sum(),
            Some(i) => match self.links.get(i) {
                Some(l) if !l.is_degenerate() => l.pcm_length,
                _ => -1,
            },
        }
    }

    /// 播放时长 (秒)
    ///
    /// 链路可能各有采样率, 聚合时按链路分别换算后求和. 未知返回 -1.0.
    pub fn time_total(&self, link: Option<usize>) -> f64 {
        if !self.seekable {
            return -1.0;
        }
        match link {
            None => self
                .links
                .iter()
                .filter_map(Self::link_seconds)
                .sum(),
            Some(i) => match self.links.get(i) {
                Some(l) => Self::link_seconds(l).unwrap_or(-1.0),
                None => -1.0,
            },
        }
    }

    fn link_seconds(link: &Link) -> Option<f64> {
        let info = link.info.as_ref()?;
        if link.is_degenerate() {
            return None;
        }
        Some(link.pcm_length as f64 / f64::from(info.sample_rate))
    }

    /// 平均比特率 (bps)
    ///
    /// 可定位容器返回实测均值: 链路压缩字节数 * 8 / 链路时长;
    /// 无法实测时退回标称比特率, 再退回上下界中点; 未知返回 -1.
    pub fn bitrate(&self, link: Option<usize>) -> i64 {
        match link {
            None => {
                if !self.seekable {
                    return -1;
                }
                let bits: i64 = (0..self.links.len())
                    .filter_map(|i| self.link_bits(i))
                    .sum();
                let seconds = self.time_total(None);
                if seconds > 0.0 {
                    (bits as f64 / seconds).round() as i64
                } else {
                    -1
                }
            }
            Some(i) => {
                let Some(l) = self.links.get(i) else {
                    return -1;
                };
                if self.seekable
                    && let Some(bits) = self.link_bits(i)
                {
                    let seconds = self.time_total(Some(i));
                    if seconds > 0.0 {
                        return (bits as f64 / seconds).round() as i64;
                    }
                }
                match &l.info {
                    Some(info) if info.bitrate_nominal > 0 => i64::from(info.bitrate_nominal),
                    Some(info) if info.bitrate_upper > 0 && info.bitrate_lower > 0 => {
                        i64::from(info.bitrate_upper + info.bitrate_lower) / 2
                    }
                    _ => -1,
                }
            }
        }
    }

    /// 链路 `i` 的压缩比特数 (音频数据区, 不含头包); 降级链路无法计量
    fn link_bits(&self, i: usize) -> Option<i64> {
        let l = self.links.get(i)?;
        if l.is_degenerate() {
            return None;
        }
        Some((self.offsets[i + 1] - l.data_offset) * 8)
    }
}
