//! ティックループ: フレーム取得 → スケジュール → バックエンド呼び出し → マージ → 公開
//!
//! 1セッション内のティックは直列に実行される。推論中 (`is_busy`) のティックは
//! キューせずに捨ててカウントのみ行う。ティック中のエラーはループを停止し、
//! `on_error` に一度だけ通知する。

use anyhow::{Context, Result};
use log::{debug, error, trace};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;

use super::backend::{FrameSource, PerceptionBackend};
use super::fps::FpsEstimator;
use super::scheduler::Scheduler;
use super::state::{PerceptionPartial, PerceptionState, Quality};
use crate::config::MocapConfig;

/// これより短いティック間隔は切り上げる
pub const MIN_CADENCE: Duration = Duration::from_millis(1);

pub type StateCallback = Box<dyn FnMut(&PerceptionState) + Send>;
pub type ErrorCallback = Box<dyn FnMut(&anyhow::Error) + Send>;

/// 1ティックの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// 停止中
    Idle,
    /// バックエンドが推論中だったので捨てた
    Dropped,
    Published,
    /// エラーで停止した
    Failed,
}

struct Shared {
    running: AtomicBool,
    wake: Notify,
}

/// 別タスクからセッションを止めるためのハンドル
#[derive(Clone)]
pub struct EngineHandle {
    shared: Arc<Shared>,
}

impl EngineHandle {
    /// 予約済みのティックは no-op になる
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.wake.notify_waiters();
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }
}

pub struct Engine<B, F>
where
    B: PerceptionBackend,
    F: FrameSource<Frame = B::Frame>,
{
    backend: B,
    frames: F,
    scheduler: Scheduler,
    fps: FpsEstimator,
    dropped_frames: u64,
    merged: PerceptionPartial,
    handle: EngineHandle,
    epoch: Instant,
    on_state: Option<StateCallback>,
    on_error: Option<ErrorCallback>,
}

impl<B, F> Engine<B, F>
where
    B: PerceptionBackend,
    F: FrameSource<Frame = B::Frame>,
{
    pub fn new(backend: B, frames: F, config: MocapConfig) -> Self {
        Self {
            backend,
            frames,
            scheduler: Scheduler::new(config),
            fps: FpsEstimator::new(),
            dropped_frames: 0,
            merged: PerceptionPartial::default(),
            handle: EngineHandle {
                shared: Arc::new(Shared {
                    running: AtomicBool::new(false),
                    wake: Notify::new(),
                }),
            },
            epoch: Instant::now(),
            on_state: None,
            on_error: None,
        }
    }

    pub fn on_state(mut self, callback: impl FnMut(&PerceptionState) + Send + 'static) -> Self {
        self.on_state = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl FnMut(&anyhow::Error) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &MocapConfig {
        self.scheduler.config()
    }

    /// 設定スナップショットを丸ごと差し替える
    pub fn set_config(&mut self, config: MocapConfig) {
        self.scheduler.set_config(config);
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// バックエンドを初期化してセッションを開始
    pub async fn start(&mut self) -> Result<()> {
        self.backend
            .init(self.config())
            .await
            .with_context(|| format!("Failed to init backend {}", self.backend.name()))?;
        self.handle.shared.running.store(true, Ordering::Release);
        debug!("engine started (backend={}, mode={})", self.backend.name(), self.backend.mode());
        Ok(())
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    /// セッション状態をクリア（ドロップ数、マージ済み状態、FPS、スケジューラ）
    pub fn reset_state(&mut self) {
        self.dropped_frames = 0;
        self.merged = PerceptionPartial::default();
        self.fps.reset();
        self.scheduler.reset();
    }

    fn now_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }

    pub async fn tick(&mut self) -> TickOutcome {
        let now = self.now_ms();
        self.tick_at(now).await
    }

    pub async fn tick_at(&mut self, now_ms: f64) -> TickOutcome {
        if !self.is_running() {
            return TickOutcome::Idle;
        }

        match self.step(now_ms).await {
            Ok(Some(state)) => {
                if let Some(callback) = self.on_state.as_mut() {
                    callback(&state);
                }
                TickOutcome::Published
            }
            Ok(None) => TickOutcome::Dropped,
            Err(e) => {
                self.handle.stop();
                error!("tick failed, engine stopped: {:#}", e);
                if let Some(callback) = self.on_error.as_mut() {
                    callback(&e);
                }
                TickOutcome::Failed
            }
        }
    }

    async fn step(&mut self, now_ms: f64) -> Result<Option<PerceptionState>> {
        let frame = self.frames.get_frame().context("Failed to get frame")?;

        if self.backend.is_busy() {
            self.dropped_frames += 1;
            trace!("backend busy, dropped frame (total {})", self.dropped_frames);
            return Ok(None);
        }

        let jobs = self.scheduler.plan(now_ms);
        let (partial, latency_ms) = if jobs.is_empty() {
            (PerceptionPartial::default(), None)
        } else {
            let started = Instant::now();
            let partial = self.backend.run(frame, &jobs, now_ms).await?;
            (partial, Some(started.elapsed().as_secs_f64() * 1000.0))
        };

        self.merged.merge(partial);
        let fps = self.fps.update(now_ms);

        let quality = Quality {
            fps,
            latency_ms,
            dropped_frames: Some(self.dropped_frames),
            backend: self.backend.name().to_string(),
            mode: self.backend.mode().to_string(),
        };
        Ok(Some(PerceptionState::new(now_ms, &self.merged, quality)))
    }

    /// `cadence` 間隔でティックを回す。停止またはエラーで戻る
    ///
    /// `MIN_CADENCE` 未満（ゼロ含む）は `MIN_CADENCE` として扱う。
    pub async fn run(&mut self, cadence: Duration) {
        let mut interval = tokio::time::interval(cadence.max(MIN_CADENCE));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let shared = self.handle.shared.clone();

        while self.is_running() {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shared.wake.notified() => {}
            }
            self.tick().await;
        }
        debug!("engine loop exited (dropped {} frames)", self.dropped_frames);
    }
}
