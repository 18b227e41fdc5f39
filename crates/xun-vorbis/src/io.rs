//! I/O 抽象层.
//!
//! 为页面扫描与定位提供统一的随机访问读取接口, 支持文件与内存缓冲区后端.
//! 整个前端是同步阻塞模型: 每次扫描/定位在返回前都会在字节源上执行到底.

use std::io::{self, Read, Seek, SeekFrom};
use xun_core::XunResult;

/// I/O 上下文
///
/// 封装底层字节源, 为扫描层提供定长读取与定位操作.
/// 本前端只读不写, 不做内部缓冲: 扫描层自行维护窗口缓冲区.
pub struct IoContext {
    /// 内部 I/O 实现
    inner: Box<dyn IoBackend>,
}

/// I/O 后端 trait
///
/// 实现此 trait 以支持不同的字节来源 (文件、内存等).
pub trait IoBackend: Send {
    /// 读取数据到缓冲区, 返回实际读取的字节数 (0 表示已到末尾)
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// 定位 (seek)
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;
    /// 获取当前位置
    fn position(&mut self) -> io::Result<u64>;
    /// 获取总大小 (如果可知)
    fn size(&self) -> Option<u64>;
    /// 是否支持随机访问
    fn is_seekable(&self) -> bool;
}

impl IoContext {
    /// 从 I/O 后端创建上下文
    pub fn new(backend: Box<dyn IoBackend>) -> Self {
        Self { inner: backend }
    }

    /// 从文件路径打开 (只读)
    pub fn open_read(path: &str) -> XunResult<Self> {
        let file = std::fs::File::open(path)?;
        Ok(Self::new(Box::new(FileBackend::new(file))))
    }

    /// 读取数据, 返回实际读取的字节数
    pub fn read(&mut self, buf: &mut [u8]) -> XunResult<usize> {
        Ok(self.inner.read(buf)?)
    }

    /// 定位 (seek)
    pub fn seek(&mut self, pos: SeekFrom) -> XunResult<u64> {
        Ok(self.inner.seek(pos)?)
    }

    /// 获取当前位置
    pub fn position(&mut self) -> XunResult<u64> {
        Ok(self.inner.position()?)
    }

    /// 获取总大小
    pub fn size(&self) -> Option<u64> {
        self.inner.size()
    }

    /// 是否支持随机访问
    pub fn is_seekable(&self) -> bool {
        self.inner.is_seekable()
    }
}

/// 文件 I/O 后端
struct FileBackend {
    file: std::fs::File,
    size: Option<u64>,
}

impl FileBackend {
    fn new(file: std::fs::File) -> Self {
        let size = file.metadata().ok().map(|m| m.len());
        Self { file, size }
    }
}

impl IoBackend for FileBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }

    fn position(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

/// 内存缓冲区 I/O 后端
///
/// 用于测试和内存中处理.
pub struct MemoryBackend {
    /// 数据缓冲区
    data: Vec<u8>,
    /// 当前位置
    pos: usize,
}

impl MemoryBackend {
    /// 从已有数据创建
    pub fn from_data(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    /// 获取内部数据的引用
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl IoBackend for MemoryBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.data.len().saturating_sub(self.pos);
        let to_read = buf.len().min(available);
        if to_read == 0 {
            return Ok(0);
        }
        buf[..to_read].copy_from_slice(&self.data[self.pos..self.pos + to_read]);
        self.pos += to_read;
        Ok(to_read)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => self.data.len() as i64 + offset,
            SeekFrom::Current(offset) => self.pos as i64 + offset,
        };
        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek 位置不能为负",
            ));
        }
        self.pos = new_pos as usize;
        Ok(self.pos as u64)
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.pos as u64)
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn is_seekable(&self) -> bool {
        true
    }
}
