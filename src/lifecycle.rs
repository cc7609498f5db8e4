//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了后台周期任务的生命周期管理。
//!
//! 分区表刷新、失效修复和过期清理都运行在一个后台循环中，
//! 生命周期为 `NotStarted -> Running -> Stopped`，停止操作幂等且可等待。

use crate::error::{NearCacheError, Result};
use std::future::Future;
use std::sync::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 后台任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// 尚未启动
    NotStarted,
    /// 运行中
    Running,
    /// 已停止（不可重新启动）
    Stopped,
}

/// 状态与任务句柄，放在同一把锁下迁移
struct TaskSlot {
    state: TaskState,
    handle: Option<JoinHandle<()>>,
}

/// 后台任务
///
/// 持有取消令牌和任务句柄。循环体需要在每次迭代和每个阻塞等待处检查取消令牌。
pub struct BackgroundTask {
    name: String,
    slot: Mutex<TaskSlot>,
    cancel: CancellationToken,
    stopping: AsyncMutex<()>,
}

impl BackgroundTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot: Mutex::new(TaskSlot {
                state: TaskState::NotStarted,
                handle: None,
            }),
            cancel: CancellationToken::new(),
            stopping: AsyncMutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TaskState {
        self.slot
            .lock()
            .map(|slot| slot.state)
            .unwrap_or(TaskState::Stopped)
    }

    /// 取消令牌，循环体和阻塞等待使用它感知关闭
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 启动后台循环
    ///
    /// # 参数
    ///
    /// * `body` - 接收取消令牌并返回循环 future 的闭包
    ///
    /// # 返回值
    ///
    /// 仅允许从 `NotStarted` 启动一次，其他状态或已请求停止时返回错误
    pub async fn spawn<F, Fut>(&self, body: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| NearCacheError::ShutdownError(format!("{} state poisoned", self.name)))?;
        if slot.state != TaskState::NotStarted {
            return Err(NearCacheError::ShutdownError(format!(
                "{} cannot be started from state {:?}",
                self.name, slot.state
            )));
        }
        // stop() 先取消再取句柄，取消后不再接受启动
        if self.cancel.is_cancelled() {
            return Err(NearCacheError::ShutdownError(format!(
                "{} is shutting down",
                self.name
            )));
        }

        slot.handle = Some(tokio::spawn(body(self.cancel.clone())));
        slot.state = TaskState::Running;
        drop(slot);
        debug!("后台任务 {} 已启动", self.name);
        Ok(())
    }

    /// 停止后台循环并等待其退出
    ///
    /// 可以重复或并发调用；并发调用者会等待第一个调用者完成对任务的回收
    pub async fn stop(&self) {
        self.cancel.cancel();

        let _stopping = self.stopping.lock().await;
        let handle = self
            .slot
            .lock()
            .ok()
            .and_then(|mut slot| slot.handle.take());
        if let Some(join) = handle {
            if let Err(e) = join.await {
                warn!("后台任务 {} 异常退出: {}", self.name, e);
            } else {
                debug!("后台任务 {} 已退出", self.name);
            }
        }

        if let Ok(mut slot) = self.slot.lock() {
            slot.state = TaskState::Stopped;
        }
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
