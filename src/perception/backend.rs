use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

use super::scheduler::Job;
use super::state::PerceptionPartial;
use crate::config::MocapConfig;

/// 認識バックエンド（外部）
///
/// `run` は `init` 前に呼ばれたら即座に [`crate::error::MocapError::NotInitialized`] を返すこと。
#[async_trait]
pub trait PerceptionBackend: Send + Sync {
    type Frame: Send + 'static;

    /// `quality.backend` に載る名前
    fn name(&self) -> &str;

    /// `quality.mode` に載る実行モード (例: "cpu", "gpu")
    fn mode(&self) -> &str;

    /// 冪等
    async fn init(&self, config: &MocapConfig) -> Result<()>;

    /// 推論中なら true。エンジンはこの間のティックを捨てる
    fn is_busy(&self) -> bool;

    async fn run(&self, frame: Self::Frame, jobs: &[Job], timestamp_ms: f64) -> Result<PerceptionPartial>;
}

/// フレーム供給元（外部）
pub trait FrameSource: Send {
    type Frame: Send + 'static;

    fn get_frame(&mut self) -> Result<Self::Frame>;
}

/// 同時に1つだけ推論を走らせるためのフラグ
///
/// 取得できなければ待たずに None（キューしない）。
#[derive(Debug, Default)]
pub struct InFlight {
    busy: AtomicBool,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<InFlightGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| InFlightGuard { flag: &self.busy })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// drop で解放
pub struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
