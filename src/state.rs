/// 适配器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterState {
    /// 传输句柄已创建，尚未连接
    Created,
    /// 连接作业已提交到工作器
    Connecting,
    /// 连接已建立，读循环运行中
    Open,
    /// 正在关闭
    Closing,
    /// 已关闭（终态）
    Closed,
    /// 连接失败（终态，仍需调用 `close` 释放）
    OpenError,
}

impl AdapterState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AdapterState::Closed | AdapterState::OpenError)
    }
}

impl std::fmt::Display for AdapterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AdapterState::Created => "CREATED",
            AdapterState::Connecting => "CONNECTING",
            AdapterState::Open => "OPEN",
            AdapterState::Closing => "CLOSING",
            AdapterState::Closed => "CLOSED",
            AdapterState::OpenError => "OPEN_ERROR",
        };
        f.write_str(name)
    }
}
