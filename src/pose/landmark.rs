use nalgebra::Vector3;

/// MediaPipe Pose の 33 ランドマークインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum LandmarkIndex {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl LandmarkIndex {
    pub const COUNT: usize = 33;
}

/// 単一ランドマーク
///
/// `visibility` が無いものは「信頼できない」扱い。既定値で埋めない。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// 可視度 (0.0〜1.0)
    pub visibility: Option<f32>,
    /// 存在確率 (0.0〜1.0)
    pub presence: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: None,
            presence: None,
        }
    }

    pub fn with_visibility(mut self, visibility: f32) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn with_presence(mut self, presence: f32) -> Self {
        self.presence = Some(presence);
        self
    }

    pub fn position(&self) -> Vector3<f32> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// ポーズジョブの結果（1人分）
///
/// `image` は正規化画像座標 (2D表現)、`world` はメートル単位のワールド座標 (3D表現)。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseLandmarks {
    pub image: Option<Vec<Landmark>>,
    pub world: Option<Vec<Landmark>>,
}

impl PoseLandmarks {
    pub fn from_world(world: Vec<Landmark>) -> Self {
        Self {
            image: None,
            world: Some(world),
        }
    }

    pub fn world(&self, index: LandmarkIndex) -> Option<&Landmark> {
        self.world.as_ref()?.get(index as usize)
    }

    pub fn image(&self, index: LandmarkIndex) -> Option<&Landmark> {
        self.image.as_ref()?.get(index as usize)
    }

    /// 3D表現を優先して可視度を取得
    pub fn visibility(&self, index: LandmarkIndex) -> Option<f32> {
        self.world(index)
            .and_then(|l| l.visibility)
            .or_else(|| self.image(index).and_then(|l| l.visibility))
    }

    pub fn presence(&self, index: LandmarkIndex) -> Option<f32> {
        self.world(index)
            .and_then(|l| l.presence)
            .or_else(|| self.image(index).and_then(|l| l.presence))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

/// ハンドジョブの結果。中身は解釈せずそのまま公開する
#[derive(Debug, Clone, PartialEq)]
pub struct HandLandmarks {
    pub handedness: Handedness,
    pub landmarks: Vec<Landmark>,
}

/// フェイスジョブの結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceLandmarks {
    pub landmarks: Vec<Landmark>,
}
