use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use super::backend::{FrameSource, InFlight, PerceptionBackend};
use super::scheduler::Job;
use super::state::PerceptionPartial;
use crate::config::MocapConfig;
use crate::error::MocapError;

/// 記録済みの認識結果を順に返すバックエンド（デモ・テスト用）
///
/// 要求されたジョブのキーだけを返す。スクリプトは末尾で先頭に戻る。
pub struct ReplayBackend {
    script: Vec<PerceptionPartial>,
    cursor: AtomicUsize,
    latency: Duration,
    initialized: AtomicBool,
    in_flight: InFlight,
}

impl ReplayBackend {
    pub fn new(script: Vec<PerceptionPartial>) -> Self {
        Self {
            script,
            cursor: AtomicUsize::new(0),
            latency: Duration::ZERO,
            initialized: AtomicBool::new(false),
            in_flight: InFlight::new(),
        }
    }

    /// 擬似推論時間
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn next_entry(&self) -> Option<&PerceptionPartial> {
        if self.script.is_empty() {
            return None;
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.script.get(i % self.script.len())
    }
}

#[async_trait]
impl PerceptionBackend for ReplayBackend {
    type Frame = u64;

    fn name(&self) -> &str {
        "replay"
    }

    fn mode(&self) -> &str {
        "cpu"
    }

    async fn init(&self, config: &MocapConfig) -> Result<()> {
        if !self.initialized.swap(true, Ordering::AcqRel) {
            debug!("replay backend ready ({} entries, max_people={})", self.script.len(), config.max_people);
        }
        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.in_flight.is_busy()
    }

    async fn run(&self, frame: u64, jobs: &[Job], timestamp_ms: f64) -> Result<PerceptionPartial> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(MocapError::NotInitialized.into());
        }
        let Some(_guard) = self.in_flight.try_acquire() else {
            anyhow::bail!("replay backend already running (frame {})", frame);
        };

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut partial = PerceptionPartial::default();
        if let Some(entry) = self.next_entry() {
            for job in jobs {
                match job {
                    Job::Pose => partial.pose = entry.pose.clone(),
                    Job::Hands => partial.hands = entry.hands.clone(),
                    Job::Face => partial.face = entry.face.clone(),
                }
            }
        }
        debug!("replay frame {} at {:.1}ms -> {:?}", frame, timestamp_ms, jobs);
        Ok(partial)
    }
}

/// 連番をフレームハンドルとして返す
#[derive(Debug, Default)]
pub struct FrameCounter {
    next: u64,
}

impl FrameSource for FrameCounter {
    type Frame = u64;

    fn get_frame(&mut self) -> Result<u64> {
        let id = self.next;
        self.next += 1;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{FaceLandmarks, Landmark, PoseLandmarks};

    fn entry(x: f32) -> PerceptionPartial {
        PerceptionPartial {
            pose: Some(PoseLandmarks::from_world(vec![Landmark::new(x, 0.0, 0.0)])),
            hands: Some(Vec::new()),
            face: Some(FaceLandmarks::default()),
        }
    }

    #[tokio::test]
    async fn test_run_before_init_fails() {
        let backend = ReplayBackend::new(vec![entry(1.0)]);
        let err = backend.run(0, &[Job::Pose], 0.0).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<MocapError>(), Some(MocapError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_returns_only_requested_jobs_and_cycles() {
        let backend = ReplayBackend::new(vec![entry(1.0), entry(2.0)]);
        backend.init(&MocapConfig::default()).await.unwrap();
        backend.init(&MocapConfig::default()).await.unwrap();

        let a = backend.run(0, &[Job::Pose], 0.0).await.unwrap();
        assert!(a.pose.is_some());
        assert!(a.hands.is_none());
        assert!(a.face.is_none());

        let b = backend.run(1, &[Job::Hands, Job::Face], 10.0).await.unwrap();
        assert!(b.pose.is_none());
        assert!(b.hands.is_some());

        let c = backend.run(2, &[Job::Pose], 20.0).await.unwrap();
        assert_eq!(c.pose.unwrap().world.unwrap()[0].x, 1.0);
        assert!(!backend.is_busy());
    }

    #[test]
    fn test_frame_counter() {
        let mut frames = FrameCounter::default();
        assert_eq!(frames.get_frame().unwrap(), 0);
        assert_eq!(frames.get_frame().unwrap(), 1);
    }
}
