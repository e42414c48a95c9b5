use crate::config::MocapConfig;

/// 認識ジョブ。宣言順 (pose, hands, face) で評価する
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Job {
    Pose = 0,
    Hands = 1,
    Face = 2,
}

impl Job {
    pub const COUNT: usize = 3;
    pub const ALL: [Job; Self::COUNT] = [Job::Pose, Job::Hands, Job::Face];

    pub fn name(self) -> &'static str {
        match self {
            Job::Pose => "pose",
            Job::Hands => "hands",
            Job::Face => "face",
        }
    }
}

/// ジョブごとの目標レートで、このティックに実行すべきジョブを決める
///
/// 状態は `last_run` テーブルのみ。
pub struct Scheduler {
    config: MocapConfig,
    /// 未実行は None（初回呼び出しで必ず発火）
    last_run: [Option<f64>; Job::COUNT],
}

impl Scheduler {
    pub fn new(config: MocapConfig) -> Self {
        Self {
            config,
            last_run: [None; Job::COUNT],
        }
    }

    pub fn config(&self) -> &MocapConfig {
        &self.config
    }

    /// 設定を丸ごと差し替える。`last_run` は維持
    pub fn set_config(&mut self, config: MocapConfig) {
        self.config = config;
    }

    pub fn reset(&mut self) {
        self.last_run = [None; Job::COUNT];
    }

    /// `now_ms` 時点で期限の来たジョブを宣言順に返し、返したジョブの `last_run` を更新
    pub fn plan(&mut self, now_ms: f64) -> Vec<Job> {
        let due: Vec<Job> = Job::ALL
            .into_iter()
            .filter(|&job| self.is_due(job, now_ms))
            .collect();

        for &job in &due {
            self.last_run[job as usize] = Some(now_ms);
        }
        due
    }

    fn is_due(&self, job: Job, now_ms: f64) -> bool {
        let hz = self.config.hz.get(job);
        if !self.config.enabled.get(job) || !(hz > 0.0) {
            return false;
        }
        match self.last_run[job as usize] {
            Some(last) => now_ms - last >= 1000.0 / hz,
            None => true,
        }
    }
}
