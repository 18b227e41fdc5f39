//! 统一错误类型定义.
//!
//! Xun 各 crate 共用的错误类型, 支持跨模块传播.
//!
//! 区分三类终止信号:
//! - 硬错误 (`Io`/`NotVorbis`/`BadHeader`/`Fault`): 当次调用失败, 不可在内部重试;
//! - 软信号 (`Hole`): 码流中检测到丢包/坏页, 游标状态仍然一致, 调用方可选择继续;
//! - 正常终点 (`Eof`): 数据走到尽头, 不是异常.

use thiserror::Error;

/// Xun 统一错误类型
#[derive(Debug, Error)]
pub enum XunError {
    /// I/O 错误 (底层字节源读写失败)
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 数据不足, 需要更多输入
    #[error("数据不足, 需要更多输入")]
    NeedMoreData,

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 码流中存在空洞 (页面丢失或损坏), 可恢复
    #[error("码流中存在空洞, 已跳过损坏区域")]
    Hole,

    /// 不是 Vorbis 码流
    #[error("不是 Vorbis 码流: {0}")]
    NotVorbis(String),

    /// Vorbis 头包损坏或不完整
    #[error("Vorbis 头包无效: {0}")]
    BadHeader(String),

    /// 内部不变量被破坏 (不应发生)
    #[error("内部错误: {0}")]
    Fault(String),

    /// 定位目标超出已知边界
    #[error("定位目标超出范围")]
    SeekOutOfRange,

    /// 字节源不支持随机访问
    #[error("字节源不支持随机访问")]
    NotSeekable,
}

/// Xun 统一 Result 类型
pub type XunResult<T> = Result<T, XunError>;
