/// 单实例工作器
///
/// 每个适配器一个串行执行上下文：tokio 任务按提交顺序取出作业，
/// 在阻塞线程池上执行并等待完成后才取下一个，作业之间不会并发。

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::AdapterId;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// 工作器已停止（运行时已关闭）
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Worker is no longer running")]
pub struct WorkerStopped;

pub struct Worker {
    sender: mpsc::UnboundedSender<Job>,
}

impl Worker {
    /// 在给定运行时上启动工作器
    ///
    /// 所有发送端（适配器以及正在执行的作业持有的引用）都释放后工作器退出。
    pub fn spawn(handle: &Handle, id: AdapterId) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let blocking = handle.clone();

        handle.spawn(async move {
            tracing::debug!("🚀 工作器启动 ({})", id);

            while let Some(job) = receiver.recv().await {
                if let Err(e) = blocking.spawn_blocking(job).await {
                    tracing::error!("💥 工作器作业异常退出 ({}): {}", id, e);
                }
            }

            tracing::debug!("✅ 工作器已结束 ({})", id);
        });

        Self { sender }
    }

    /// 提交作业，按提交顺序串行执行
    pub fn submit<F>(&self, job: F) -> Result<(), WorkerStopped>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender.send(Box::new(job)).map_err(|_| WorkerStopped)
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("running", &!self.sender.is_closed())
            .finish()
    }
}
