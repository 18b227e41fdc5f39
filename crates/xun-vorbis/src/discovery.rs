//! 链路发现: 打开容器时以对数代价探明逻辑流结构.
//!
//! 流程:
//! 1. 读取首页头包, 得到首链路序列号与流参数;
//! 2. 从容器末尾向后扫描末页, 序列号相同即为单链路;
//! 3. 否则容器为串接结构, 递归二分字节区间找出每个序列号边界;
//! 4. 为每条链路补取头包并反向扫描末页粒度, 得到解码长度.
//!
//! 全部扫描状态都在本模块的瞬态结构里, open 返回后即丢弃;
//! 并发地对不同字节源调用 open 是安全的.

use log::{debug, warn};
use xun_core::{XunError, XunResult};

use crate::io::IoContext;
use crate::link::{Link, LinkTable};
use crate::packet::PacketAssembler;
use crate::page::{self, CHUNK_SIZE};
use crate::vorbis::{self, VorbisInfo};

/// 头包获取时最多容忍的页面数
const MAX_HEADER_PAGES: usize = 64;

/// 一条链路的头包解析结果
#[derive(Clone)]
struct LinkHeaders {
    serial: u32,
    info: VorbisInfo,
    /// 音频包起始偏移 (setup 头包所在页之后)
    data_offset: i64,
}

/// 发现过程的瞬态扫描状态
struct Discovery<'a> {
    io: &'a mut IoContext,
    /// 容器总字节数
    total: i64,
    /// 链路边界 (长度 = 链路数 + 1, 后序回填)
    offsets: Vec<i64>,
    /// 各链路序列号
    serials: Vec<u32>,
}

/// 打开可随机访问的字节源, 构建链路表
pub(crate) fn open(io: &mut IoContext) -> XunResult<LinkTable> {
    if !io.is_seekable() {
        return Err(XunError::NotSeekable);
    }
    let Some(total) = io.size() else {
        return Err(XunError::NotSeekable);
    };
    let total = total as i64;
    if total == 0 {
        return Err(XunError::NotVorbis("空字节源".into()));
    }

    // 首链路头包失败则整个 open 失败
    let first = fetch_headers(io, 0, total)?;

    // 末页序列号决定容器是否串接
    let last_page = match page::prev_page(io, 0, total) {
        Ok((_, page)) => page,
        Err(XunError::Eof) => {
            return Err(XunError::NotVorbis("容器中没有完整页面".into()));
        }
        Err(e) => return Err(e),
    };

    let mut disc = Discovery {
        io,
        total,
        offsets: Vec::new(),
        serials: Vec::new(),
    };
    if last_page.serial_number == first.serial {
        // 单链路容器, 直接确定边界
        disc.offsets = vec![0, total];
        disc.serials = vec![first.serial];
    } else {
        debug!("检测到串接容器, 开始二分探测链路边界");
        disc.bisect_forward_serialno(0, 0, total, first.serial, 0)?;
    }

    let link_count = disc.serials.len();
    debug!("发现 {} 条链路", link_count);

    // 逐链路补全头信息与解码长度
    let mut links = Vec::with_capacity(link_count);
    for m in 0..link_count {
        let begin = disc.offsets[m];
        let end = disc.offsets[m + 1];
        let serial = disc.serials[m];
        let headers = if m == 0 {
            Ok(first.clone())
        } else {
            fetch_headers(disc.io, begin, end)
        };
        let link = match headers {
            Ok(h) if h.serial == serial => {
                let pcm_length = match page::last_granule_page(disc.io, begin, end, serial) {
                    Ok((_, granule)) => granule,
                    Err(XunError::Eof) => {
                        warn!("链路 {m} 没有携带粒度位置的页面, 长度记为 0");
                        0
                    }
                    Err(e) => return Err(e),
                };
                Link {
                    serial_number: serial,
                    data_offset: h.data_offset,
                    pcm_length,
                    info: Some(h.info),
                }
            }
            Ok(h) => {
                warn!(
                    "链路 {m} 头包序列号不符 (期望 {serial}, 实际 {}), 降级",
                    h.serial,
                );
                degenerate_link(serial)
            }
            // I/O 失败必须上抛, 只有码流层面的失败才吸收降级
            Err(XunError::Io(e)) => return Err(XunError::Io(e)),
            Err(e) => {
                warn!("链路 {m} 头包获取失败, 降级: {e}");
                degenerate_link(serial)
            }
        };
        links.push(link);
    }

    LinkTable::new(true, disc.offsets, links)
}

fn degenerate_link(serial: u32) -> Link {
    Link {
        serial_number: serial,
        data_offset: -1,
        pcm_length: 0,
        info: None,
    }
}

impl Discovery<'_> {
    /// 递归二分探测序列号边界
    ///
    /// `[begin, end)` 为当前链路可能覆盖的字节范围, `searched` 之前的
    /// 字节已确认属于 `serial`. 窗口每轮严格收缩, 迭代次数受
    /// `log2(范围 / 块大小)` 约束; 收敛后若仍有后继页面则递归发现
    /// 下一条链路, 回溯时后序回填本链路的起始边界.
    fn bisect_forward_serialno(
        &mut self,
        begin: i64,
        mut searched: i64,
        end: i64,
        serial: u32,
        m: usize,
    ) -> XunResult<()> {
        let mut end_searched = end;
        let mut next = end;

        while searched < end_searched {
            let bisect = if end_searched - searched < CHUNK_SIZE as i64 {
                // 剩余窗口不足一个 I/O 块, 退化为顺序推进
                searched
            } else {
                (searched + end_searched) / 2
            };
            match page::next_page(self.io, bisect, -1) {
                Ok((off, pg)) => {
                    if pg.serial_number == serial {
                        searched = off + pg.page_len();
                    } else {
                        // 边界在 bisect 之前 (含), 记住候选的下链路起点
                        end_searched = bisect;
                        next = off;
                    }
                }
                Err(XunError::Eof) => end_searched = bisect,
                Err(e) => return Err(e),
            }
        }

        // 收敛: 探测 next 处是否还有后继链路
        let probe = match page::next_page(self.io, next, -1) {
            Ok(v) => Some(v),
            Err(XunError::Eof) => None,
            Err(e) => return Err(e),
        };

        match probe {
            Some((off, pg)) if searched < end => {
                let after = off + pg.page_len();
                self.bisect_forward_serialno(off, after, end, pg.serial_number, m + 1)?;
            }
            _ => {
                // 这是最后一条链路: 链路总数确定, 分配边界数组
                self.offsets = vec![0; m + 2];
                self.serials = vec![0; m + 1];
                self.offsets[m + 1] = self.total;
            }
        }
        self.offsets[m] = begin;
        self.serials[m] = serial;
        Ok(())
    }
}

/// 在 `[at, limit)` 内获取一条链路的 3 个头包
fn fetch_headers(io: &mut IoContext, at: i64, limit: i64) -> XunResult<LinkHeaders> {
    let (off, first) = match page::next_page(io, at, limit - at) {
        Ok(v) => v,
        Err(XunError::Eof) | Err(XunError::NeedMoreData) => {
            return Err(XunError::NotVorbis("未找到起始页面".into()));
        }
        Err(e) => return Err(e),
    };
    if !first.is_bos() {
        return Err(XunError::NotVorbis("链路起始不是 BOS 页面".into()));
    }
    let serial = first.serial_number;
    let mut cursor = off + first.page_len();

    let mut assembler = PacketAssembler::new();
    assembler.submit_page(&first);
    let mut info: Option<VorbisInfo> = None;
    let mut parsed = 0usize;

    for _ in 0..MAX_HEADER_PAGES {
        while let Some(pkt) = assembler.next_packet() {
            match parsed {
                0 => info = Some(vorbis::parse_identification(&pkt.data)?),
                1 => vorbis::validate_comment(&pkt.data)?,
                _ => {
                    vorbis::validate_setup(&pkt.data)?;
                    let info =
                        info.ok_or_else(|| XunError::Fault("identification 头包丢失".into()))?;
                    // 音频数据从 setup 头包所在页之后开始
                    return Ok(LinkHeaders {
                        serial,
                        info,
                        data_offset: cursor,
                    });
                }
            }
            parsed += 1;
        }

        if cursor >= limit {
            break;
        }
        let (poff, pg) = match page::next_page(io, cursor, limit - cursor) {
            Ok(v) => v,
            Err(XunError::Eof) | Err(XunError::NeedMoreData) => break,
            Err(e) => return Err(e),
        };
        if pg.serial_number != serial {
            return Err(XunError::BadHeader("头包区域混入其他逻辑流页面".into()));
        }
        cursor = poff + pg.page_len();
        assembler.submit_page(&pg);
    }

    Err(XunError::BadHeader("3 个头包不完整".into()))
}
