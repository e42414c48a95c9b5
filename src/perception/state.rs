use crate::pose::{FaceLandmarks, HandLandmarks, PoseLandmarks};

/// 1回の `run` の結果。実行したジョブのキーだけが Some
///
/// 実行したが検出なしの場合、バックエンドは空の値を Some で返す（前回値を消す）。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerceptionPartial {
    pub pose: Option<PoseLandmarks>,
    pub hands: Option<Vec<HandLandmarks>>,
    pub face: Option<FaceLandmarks>,
}

impl PerceptionPartial {
    pub fn is_empty(&self) -> bool {
        self.pose.is_none() && self.hands.is_none() && self.face.is_none()
    }

    /// キー単位で上書き。`newer` に無いキーは保持
    pub fn merge(&mut self, newer: PerceptionPartial) {
        if let Some(pose) = newer.pose {
            self.pose = Some(pose);
        }
        if let Some(hands) = newer.hands {
            self.hands = Some(hands);
        }
        if let Some(face) = newer.face {
            self.face = Some(face);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quality {
    pub fps: f64,
    /// このティックで backend を呼んだ場合のみ
    pub latency_ms: Option<f64>,
    pub dropped_frames: Option<u64>,
    pub backend: String,
    pub mode: String,
}

/// 呼び出し側へ公開する状態
#[derive(Debug, Clone, PartialEq)]
pub struct PerceptionState {
    pub t: f64,
    pub pose: Option<PoseLandmarks>,
    pub hands: Option<Vec<HandLandmarks>>,
    pub face: Option<FaceLandmarks>,
    pub quality: Quality,
}

impl PerceptionState {
    pub fn new(t: f64, merged: &PerceptionPartial, quality: Quality) -> Self {
        Self {
            t,
            pose: merged.pose.clone(),
            hands: merged.hands.clone(),
            face: merged.face.clone(),
            quality,
        }
    }
}
