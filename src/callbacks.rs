use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::Arc;

// Event handlers
pub type OnOpenHandler = Arc<dyn Fn() + Send + Sync>;
pub type OnOpenErrorHandler = Arc<dyn Fn(String) + Send + Sync>;
pub type OnDataHandler = Arc<dyn Fn(Bytes) + Send + Sync>;
pub type OnCloseHandler = Arc<dyn Fn(bool) + Send + Sync>;
pub type OnErrorHandler = Arc<dyn Fn(String) + Send + Sync>;

/// 回调事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    OpenError,
    Data,
    Close,
    Error,
}

#[derive(Default)]
struct Slots {
    open: Option<OnOpenHandler>,
    open_error: Option<OnOpenErrorHandler>,
    data: Option<OnDataHandler>,
    close: Option<OnCloseHandler>,
    error: Option<OnErrorHandler>,
}

/// 单槽回调表
///
/// 每种事件最多一个处理器，后注册者覆盖先注册者；未注册的事件被静默丢弃。
/// 处理器在调用 `invoke_*` 的线程上执行，调用前读锁已释放，
/// 所以处理器内部可以重新进入适配器（例如在数据回调里调用 `close`）。
#[derive(Default)]
pub struct CallbackTable {
    slots: RwLock<Slots>,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_open(&self, handler: OnOpenHandler) {
        self.slots.write().open = Some(handler);
    }

    pub fn set_open_error(&self, handler: OnOpenErrorHandler) {
        self.slots.write().open_error = Some(handler);
    }

    pub fn set_data(&self, handler: OnDataHandler) {
        self.slots.write().data = Some(handler);
    }

    pub fn set_close(&self, handler: OnCloseHandler) {
        self.slots.write().close = Some(handler);
    }

    pub fn set_error(&self, handler: OnErrorHandler) {
        self.slots.write().error = Some(handler);
    }

    /// 检查某类事件是否已注册处理器
    pub fn is_set(&self, kind: EventKind) -> bool {
        let slots = self.slots.read();
        match kind {
            EventKind::Open => slots.open.is_some(),
            EventKind::OpenError => slots.open_error.is_some(),
            EventKind::Data => slots.data.is_some(),
            EventKind::Close => slots.close.is_some(),
            EventKind::Error => slots.error.is_some(),
        }
    }

    pub fn invoke_open(&self) {
        let handler = self.slots.read().open.clone();
        if let Some(handler) = handler {
            handler();
        }
    }

    pub fn invoke_open_error(&self, message: String) {
        let handler = self.slots.read().open_error.clone();
        if let Some(handler) = handler {
            handler(message);
        }
    }

    pub fn invoke_data(&self, data: Bytes) {
        let handler = self.slots.read().data.clone();
        if let Some(handler) = handler {
            handler(data);
        }
    }

    pub fn invoke_close(&self, has_error: bool) {
        let handler = self.slots.read().close.clone();
        if let Some(handler) = handler {
            handler(has_error);
        }
    }

    pub fn invoke_error(&self, message: String) {
        let handler = self.slots.read().error.clone();
        if let Some(handler) = handler {
            handler(message);
        }
    }
}

impl std::fmt::Debug for CallbackTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackTable")
            .field("open", &self.is_set(EventKind::Open))
            .field("open_error", &self.is_set(EventKind::OpenError))
            .field("data", &self.is_set(EventKind::Data))
            .field("close", &self.is_set(EventKind::Close))
            .field("error", &self.is_set(EventKind::Error))
            .finish()
    }
}
