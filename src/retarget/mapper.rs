//! ランドマーク → ボーン向きターゲット
//!
//! 信頼度ゲートは fail-closed: `visibility` が無いランドマークは位置が有効でも使わない。
//! 退化したベクトルはそのターゲットだけを捨て、他のボーンは続行する。

use nalgebra::Vector3;

use super::bone::{BoneKey, BoneTarget, BoneTargets};
use super::math::{normalize, remap};
use crate::config::MapperConfig;
use crate::perception::PerceptionState;
use crate::pose::{Landmark, LandmarkIndex, PoseLandmarks};

/// 前フレームの結果。ポール符号の連続性に使う
#[derive(Debug, Clone, Default)]
pub struct StabilizationContext {
    pub prev_targets: BoneTargets,
    pub prev_forward: Option<Vector3<f32>>,
}

#[derive(Debug, Clone, Default)]
pub struct MappedPose {
    pub targets: BoneTargets,
    /// 安定化済みの胴体前方ポール
    pub forward: Option<Vector3<f32>>,
}

struct Sampler<'a> {
    pose: &'a PoseLandmarks,
    world: &'a [Landmark],
    config: &'a MapperConfig,
}

impl Sampler<'_> {
    fn usable(&self, index: LandmarkIndex) -> bool {
        let Some(visibility) = self.pose.visibility(index) else {
            return false;
        };
        if !visibility.is_finite() || visibility < self.config.min_visibility {
            return false;
        }
        if self.config.min_presence > 0.0 {
            if let Some(presence) = self.pose.presence(index) {
                if !presence.is_finite() || presence < self.config.min_presence {
                    return false;
                }
            }
        }
        true
    }

    fn point(&self, index: LandmarkIndex) -> Option<Vector3<f32>> {
        if !self.usable(index) {
            return None;
        }
        let lm = self.world.get(index as usize)?;
        lm.is_finite().then(|| lm.position())
    }

    fn offset(&self, from: &Vector3<f32>, to: &Vector3<f32>) -> Vector3<f32> {
        remap(to - from, &self.config.axis_remap)
    }

    fn direction(&self, from: &Vector3<f32>, to: &Vector3<f32>) -> Option<Vector3<f32>> {
        normalize(self.offset(from, to))
    }

    /// from→mid と mid→to の外積（曲げ平面の法線）
    fn bend_normal(&self, from: &Vector3<f32>, mid: &Vector3<f32>, to: &Vector3<f32>) -> Option<Vector3<f32>> {
        normalize(self.offset(from, mid).cross(&self.offset(mid, to)))
    }
}

fn midpoint(a: Option<Vector3<f32>>, b: Option<Vector3<f32>>) -> Option<Vector3<f32>> {
    Some((a? + b?) * 0.5)
}

/// 前回のポールと逆向きなら反転
fn stabilize(pole: Vector3<f32>, prev: Option<&Vector3<f32>>) -> Vector3<f32> {
    match prev {
        Some(prev) if prev.dot(&pole) < 0.0 => -pole,
        _ => pole,
    }
}

/// 曲げ平面がほぼ退化している（ポールが方向とほぼ平行）ならポールを捨てる
pub fn safe_pole(direction: &Vector3<f32>, pole: Vector3<f32>, max_dot: f32) -> Option<Vector3<f32>> {
    (direction.dot(&pole).abs() <= max_dot).then_some(pole)
}

/// 胴体前方ポール
///
/// 外積の 180° 曖昧さを `forward × up` が `right` と同じ向きになるよう解消し、
/// さらに前フレームの前方と符号を揃える。
fn torso_forward(right: &Vector3<f32>, up: &Vector3<f32>, prev: Option<&Vector3<f32>>) -> Option<Vector3<f32>> {
    let mut forward = normalize(right.cross(up))?;
    if forward.cross(up).dot(right) < 0.0 {
        forward = -forward;
    }
    Some(stabilize(forward, prev))
}

fn prev_pole(ctx: &StabilizationContext, key: BoneKey) -> Option<&Vector3<f32>> {
    ctx.prev_targets.get(key).and_then(|t| t.pole.as_ref())
}

struct Side {
    shoulder: LandmarkIndex,
    elbow: LandmarkIndex,
    wrist: LandmarkIndex,
    hip: LandmarkIndex,
    knee: LandmarkIndex,
    ankle: LandmarkIndex,
    shoulder_bone: BoneKey,
    upper_arm: BoneKey,
    lower_arm: BoneKey,
    upper_leg: BoneKey,
    lower_leg: BoneKey,
}

const SIDES: [Side; 2] = [
    Side {
        shoulder: LandmarkIndex::LeftShoulder,
        elbow: LandmarkIndex::LeftElbow,
        wrist: LandmarkIndex::LeftWrist,
        hip: LandmarkIndex::LeftHip,
        knee: LandmarkIndex::LeftKnee,
        ankle: LandmarkIndex::LeftAnkle,
        shoulder_bone: BoneKey::LeftShoulder,
        upper_arm: BoneKey::LeftUpperArm,
        lower_arm: BoneKey::LeftLowerArm,
        upper_leg: BoneKey::LeftUpperLeg,
        lower_leg: BoneKey::LeftLowerLeg,
    },
    Side {
        shoulder: LandmarkIndex::RightShoulder,
        elbow: LandmarkIndex::RightElbow,
        wrist: LandmarkIndex::RightWrist,
        hip: LandmarkIndex::RightHip,
        knee: LandmarkIndex::RightKnee,
        ankle: LandmarkIndex::RightAnkle,
        shoulder_bone: BoneKey::RightShoulder,
        upper_arm: BoneKey::RightUpperArm,
        lower_arm: BoneKey::RightLowerArm,
        upper_leg: BoneKey::RightUpperLeg,
        lower_leg: BoneKey::RightLowerLeg,
    },
];

/// 1フレーム分のターゲットを計算する。3D ランドマークが無ければ空
pub fn pose_to_targets(pose: &PoseLandmarks, config: &MapperConfig, ctx: &StabilizationContext) -> MappedPose {
    let mut out = MappedPose::default();
    let Some(world) = pose.world.as_deref() else {
        return out;
    };
    let s = Sampler { pose, world, config };

    let left_shoulder = s.point(LandmarkIndex::LeftShoulder);
    let right_shoulder = s.point(LandmarkIndex::RightShoulder);
    let shoulder_center = midpoint(left_shoulder, right_shoulder);
    let hip_center = midpoint(s.point(LandmarkIndex::LeftHip), s.point(LandmarkIndex::RightHip));

    // 胴体
    let up = match (shoulder_center, hip_center) {
        (Some(sc), Some(hc)) => s.direction(&hc, &sc),
        _ => None,
    };
    if let Some(up) = up {
        let right = match (left_shoulder, right_shoulder) {
            (Some(l), Some(r)) => s.direction(&l, &r),
            _ => None,
        };
        out.forward = right.and_then(|right| torso_forward(&right, &up, ctx.prev_forward.as_ref()));

        for key in [BoneKey::Hips, BoneKey::Spine, BoneKey::Chest] {
            let pole = out.forward.map(|f| stabilize(f, prev_pole(ctx, key)));
            out.targets.insert(key, BoneTarget { direction: up, pole });
        }
    }

    for side in &SIDES {
        let shoulder = s.point(side.shoulder);
        let elbow = s.point(side.elbow);
        let wrist = s.point(side.wrist);

        // 鎖骨
        if let (Some(sc), Some(sh)) = (shoulder_center, shoulder) {
            if let Some(d) = s.direction(&sc, &sh) {
                out.targets.insert(side.shoulder_bone, BoneTarget::direction(d));
            }
        }

        // 腕のポールは前フレームで安定化しない
        if let (Some(sh), Some(el)) = (shoulder, elbow) {
            if let Some(d) = s.direction(&sh, &el) {
                let pole = wrist.and_then(|wr| s.bend_normal(&sh, &el, &wr));
                out.targets.insert(side.upper_arm, BoneTarget { direction: d, pole });
            }
        }
        if let (Some(el), Some(wr)) = (elbow, wrist) {
            if let Some(d) = s.direction(&el, &wr) {
                out.targets.insert(side.lower_arm, BoneTarget::direction(d));
            }
        }

        // 脚: 画面外の下半身から向きを捏造しないよう hip/knee/ankle 全てを要求
        let hip = s.point(side.hip);
        let knee = s.point(side.knee);
        let ankle = s.point(side.ankle);
        if let (Some(hp), Some(kn), Some(an)) = (hip, knee, ankle) {
            if let Some(d) = s.direction(&hp, &kn) {
                let pole = s
                    .bend_normal(&hp, &kn, &an)
                    .map(|p| stabilize(p, prev_pole(ctx, side.upper_leg)))
                    // 外積は hip→knee と直交するので、ここで落ちるのは丸め誤差の場合のみ
                    .and_then(|p| safe_pole(&d, p, config.leg_pole_max_dot));
                out.targets.insert(side.upper_leg, BoneTarget { direction: d, pole });
            }
        }
        if let (Some(kn), Some(an)) = (knee, ankle) {
            if let Some(d) = s.direction(&kn, &an) {
                out.targets.insert(side.lower_leg, BoneTarget::direction(d));
            }
        }
    }

    out
}

/// フレーム間の安定化コンテキストを保持するマッパー
pub struct TargetMapper {
    config: MapperConfig,
    context: StabilizationContext,
}

impl TargetMapper {
    pub fn from_config(config: &MapperConfig) -> Self {
        Self {
            config: config.clone(),
            context: StabilizationContext::default(),
        }
    }

    pub fn context(&self) -> &StabilizationContext {
        &self.context
    }

    /// 出力されたボーンだけ前回値を更新する（欠けたボーンは最後の値を保持）
    pub fn map(&mut self, pose: &PoseLandmarks) -> BoneTargets {
        let mapped = pose_to_targets(pose, &self.config, &self.context);
        for (key, target) in mapped.targets.present() {
            self.context.prev_targets.insert(key, *target);
        }
        if mapped.forward.is_some() {
            self.context.prev_forward = mapped.forward;
        }
        mapped.targets
    }

    pub fn map_state(&mut self, state: &PerceptionState) -> BoneTargets {
        match state.pose.as_ref() {
            Some(pose) => self.map(pose),
            None => BoneTargets::default(),
        }
    }

    pub fn reset(&mut self) {
        self.context = StabilizationContext::default();
    }
}
