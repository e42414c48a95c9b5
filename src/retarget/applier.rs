//! ボーンターゲット → ボーンローカル回転
//!
//! `Retargeter` は 1 つの骨格を所有し、バインド時にレストポーズを一度だけ計算する。
//! 毎フレーム、ターゲットからワールド回転を解き、親空間へ変換して slerp で滑らかに適用する。
//! 前回採用した方向から大きく反転したターゲットは捨てる（回転は前フレームのまま）。

use log::{debug, trace};
use nalgebra::{UnitQuaternion, Vector3};

use super::bone::{BoneDirections, BoneKey, BoneMap, BoneTarget, BoneTargets, PoleKind};
use super::math::{basis, normalize, orthogonalize, shortest_arc, smooth_toward};
use super::skeleton::{BoneId, Skeleton};
use crate::config::RetargetConfig;

/// バインドポーズから得たボーンローカルの基準ベクトル（書き換えない）
#[derive(Debug, Clone, Copy)]
struct RestPose {
    direction: Vector3<f32>,
    pole: Option<Vector3<f32>>,
    /// 基底 (direction, pole×direction, pole) の逆回転
    basis_inverse: Option<UnitQuaternion<f32>>,
}

#[derive(Debug, Clone, Copy)]
struct BoundBone {
    id: BoneId,
    rest: RestPose,
}

/// 最後に採用したワールド方向とポール
#[derive(Debug, Clone, Copy)]
struct LastTarget {
    direction: Vector3<f32>,
    pole: Option<Vector3<f32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindFailure {
    MissingBone,
    MissingChild,
    /// ボーンと子が同じ位置
    DegenerateRest,
}

#[derive(Debug, Clone, Default)]
pub struct BindReport {
    pub bound: Vec<BoneKey>,
    pub failures: Vec<(BoneKey, BindFailure)>,
}

impl BindReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoneOutcome {
    Applied,
    Rejected,
    Skipped,
}

/// 1回の適用の集計。棄却もスキップもエラーではない
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    /// 反転として捨てた
    pub rejected: usize,
    /// ターゲット無し・非有限・未バインド
    pub skipped: usize,
}

impl ApplyReport {
    fn record(&mut self, outcome: BoneOutcome) {
        match outcome {
            BoneOutcome::Applied => self.applied += 1,
            BoneOutcome::Rejected => self.rejected += 1,
            BoneOutcome::Skipped => self.skipped += 1,
        }
    }
}

pub struct Retargeter<S: Skeleton> {
    skeleton: S,
    config: RetargetConfig,
    bones: BoneMap<Option<BoundBone>>,
    last: BoneMap<Option<LastTarget>>,
}

fn first_child<S: Skeleton>(skeleton: &S, names: &[&str]) -> Option<BoneId> {
    names.iter().find_map(|name| skeleton.find_bone(name))
}

/// 現在の骨格からボーンのレストポーズを求める
fn sample_rest<S: Skeleton>(skeleton: &S, key: BoneKey) -> Result<BoundBone, BindFailure> {
    let chain = key.chain();
    let id = skeleton.find_bone(chain.bone).ok_or(BindFailure::MissingBone)?;
    let child = first_child(skeleton, chain.children).ok_or(BindFailure::MissingChild)?;

    let to_local = skeleton.world_rotation(id).inverse();
    let origin = skeleton.world_position(id);
    let child_pos = skeleton.world_position(child);
    let world_dir = normalize(child_pos - origin).ok_or(BindFailure::DegenerateRest)?;
    let direction = to_local * world_dir;

    let world_pole = match key.pole_kind() {
        PoleKind::None => None,
        PoleKind::Torso => Some(Vector3::z()),
        PoleKind::Limb => key
            .limb_child()
            .and_then(|k| first_child(skeleton, k.chain().children))
            .and_then(|grandchild| {
                let a = child_pos - origin;
                let b = skeleton.world_position(grandchild) - child_pos;
                normalize(a.cross(&b))
            }),
    };
    let pole = world_pole.and_then(|p| orthogonalize(to_local * p, &direction));
    let basis_inverse = pole.map(|p| basis(&direction, &p).inverse());

    Ok(BoundBone {
        id,
        rest: RestPose {
            direction,
            pole,
            basis_inverse,
        },
    })
}

impl<S: Skeleton> Retargeter<S> {
    /// 骨格を束縛し、全ボーンのレストポーズを一度だけ計算する
    ///
    /// 失敗したボーンはこの束縛の間ずっとスキップされる。
    pub fn bind(mut skeleton: S, config: RetargetConfig) -> (Self, BindReport) {
        skeleton.update_world_transforms();

        let mut report = BindReport::default();
        let bones = BoneMap::from_fn(|key| match sample_rest(&skeleton, key) {
            Ok(bone) => {
                report.bound.push(key);
                Some(bone)
            }
            Err(failure) => {
                debug!("bone {:?} not bound: {:?}", key, failure);
                report.failures.push((key, failure));
                None
            }
        });

        let retargeter = Self {
            skeleton,
            config,
            bones,
            last: BoneMap::default(),
        };
        (retargeter, report)
    }

    pub fn skeleton(&self) -> &S {
        &self.skeleton
    }

    pub fn into_skeleton(self) -> S {
        self.skeleton
    }

    /// 反転判定用の履歴だけ消す（レストポーズは残す）
    pub fn reset_history(&mut self) {
        self.last = BoneMap::default();
    }

    /// レストポーズのボーンローカル方向
    pub fn rest_direction(&self, key: BoneKey) -> Option<Vector3<f32>> {
        self.bones[key].map(|b| b.rest.direction)
    }

    pub fn rest_pole(&self, key: BoneKey) -> Option<Vector3<f32>> {
        self.bones[key].and_then(|b| b.rest.pole)
    }

    /// 方向のみのターゲットを適用
    pub fn apply_directions(&mut self, directions: &BoneDirections) -> ApplyReport {
        let mut report = ApplyReport::default();
        for key in BoneKey::ALL {
            let outcome = match directions.get(key) {
                Some(dir) => self.apply_bone(key, &BoneTarget::direction(*dir)),
                None => BoneOutcome::Skipped,
            };
            report.record(outcome);
        }
        report
    }

    /// 方向 + ポールのターゲットを適用
    pub fn apply_targets(&mut self, targets: &BoneTargets) -> ApplyReport {
        let mut report = ApplyReport::default();
        for key in BoneKey::ALL {
            let outcome = match targets.get(key) {
                Some(target) => self.apply_bone(key, target),
                None => BoneOutcome::Skipped,
            };
            report.record(outcome);
        }
        report
    }

    fn apply_bone(&mut self, key: BoneKey, target: &BoneTarget) -> BoneOutcome {
        let Some(bone) = self.bones[key] else {
            return BoneOutcome::Skipped;
        };
        let Some(dir) = normalize(target.direction) else {
            return BoneOutcome::Skipped;
        };

        let last = self.last[key];
        if let Some(prev) = last {
            if prev.direction.dot(&dir) < self.config.min_dot_before_reject {
                trace!("{:?}: direction flip rejected", key);
                return BoneOutcome::Rejected;
            }
        }

        // ポール付き: 3軸すべて（ひねり含む）を解く
        let mut used_pole = None;
        let mut world = None;
        if let (Some(pole), Some(rest_inverse)) = (target.pole, bone.rest.basis_inverse) {
            if let Some(pole) = orthogonalize(pole, &dir) {
                if let Some(prev_pole) = last.and_then(|l| l.pole) {
                    if prev_pole.dot(&pole) < self.config.min_pole_dot_before_reject {
                        trace!("{:?}: pole flip rejected", key);
                        return BoneOutcome::Rejected;
                    }
                }
                world = Some(basis(&dir, &pole) * rest_inverse);
                used_pole = Some(pole);
            }
        }

        // ポール無し: 曲げのみ補正。ひねりは現状のまま
        let world = world.unwrap_or_else(|| {
            let current = self.skeleton.world_rotation(bone.id);
            shortest_arc(&(current * bone.rest.direction), &dir) * current
        });

        let parent_world = self
            .skeleton
            .parent(bone.id)
            .map(|p| self.skeleton.world_rotation(p))
            .unwrap_or_else(UnitQuaternion::identity);
        let local = parent_world.inverse() * world;

        let current_local = self.skeleton.local_rotation(bone.id);
        let blended = smooth_toward(&current_local, &local, self.config.alpha);
        self.skeleton.set_local_rotation(bone.id, blended);
        self.skeleton.update_world_transforms();

        // ポールを使わなかったフレームは古いポールを消す
        self.last[key] = Some(LastTarget {
            direction: dir,
            pole: used_pole,
        });
        BoneOutcome::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retarget::skeleton::Rig;

    const EPS: f32 = 1e-5;

    fn config(alpha: f32) -> RetargetConfig {
        RetargetConfig {
            alpha,
            ..RetargetConfig::default()
        }
    }

    /// hips 単独（子 spine が +Y）。他のボーンは無い
    fn single_bone_rig() -> Rig {
        let mut rig = Rig::new();
        let hips = rig.add_joint("hips", None, Vector3::zeros());
        rig.add_joint("spine", Some(hips), Vector3::new(0.0, 1.0, 0.0));
        rig
    }

    fn directions(key: BoneKey, dir: Vector3<f32>) -> BoneDirections {
        let mut map = BoneDirections::default();
        map.insert(key, dir);
        map
    }

    fn targets(key: BoneKey, target: BoneTarget) -> BoneTargets {
        let mut map = BoneTargets::default();
        map.insert(key, target);
        map
    }

    fn hips_world_dir(r: &Retargeter<Rig>) -> Vector3<f32> {
        let id = r.skeleton().find_bone("hips").unwrap();
        r.skeleton().world_rotation(id) * Vector3::y()
    }

    #[test]
    fn test_bind_reports_missing_bones() {
        let (r, report) = Retargeter::bind(single_bone_rig(), config(1.0));
        assert_eq!(report.bound, vec![BoneKey::Hips]);
        assert_eq!(report.failures.len(), BoneKey::COUNT - 1);
        assert!(report.failures.contains(&(BoneKey::Spine, BindFailure::MissingChild)));
        assert!(report.failures.contains(&(BoneKey::LeftUpperArm, BindFailure::MissingBone)));
        assert!(!report.is_complete());
        assert!((r.rest_direction(BoneKey::Hips).unwrap() - Vector3::y()).norm() < EPS);
    }

    #[test]
    fn test_bind_humanoid_complete() {
        let (r, report) = Retargeter::bind(Rig::humanoid(), config(0.35));
        assert!(report.is_complete(), "{:?}", report.failures);
        // chest は upperChest が無いので neck を使う
        assert!((r.rest_direction(BoneKey::Chest).unwrap() - Vector3::y()).norm() < EPS);
        assert!((r.rest_pole(BoneKey::Hips).unwrap() - Vector3::z()).norm() < EPS);
        assert!(r.rest_pole(BoneKey::LeftUpperArm).is_some());
        assert!(r.rest_pole(BoneKey::LeftUpperLeg).is_some());
        assert!(r.rest_pole(BoneKey::LeftLowerArm).is_none());
    }

    #[test]
    fn test_bind_degenerate_rest() {
        let mut rig = Rig::new();
        let hips = rig.add_joint("hips", None, Vector3::zeros());
        rig.add_joint("spine", Some(hips), Vector3::zeros());
        let (_, report) = Retargeter::bind(rig, config(1.0));
        assert!(report.failures.contains(&(BoneKey::Hips, BindFailure::DegenerateRest)));
    }

    #[test]
    fn test_shortest_arc_exact_quaternion() {
        let (mut r, _) = Retargeter::bind(single_bone_rig(), config(1.0));
        let report = r.apply_directions(&directions(BoneKey::Hips, Vector3::x()));
        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped, BoneKey::COUNT - 1);

        let id = r.skeleton().find_bone("hips").unwrap();
        let q = r.skeleton().local_rotation(id);
        // (0,1,0) → (1,0,0) は Z 軸まわり -90°
        let h = std::f32::consts::FRAC_1_SQRT_2;
        assert!((q.w - h).abs() < EPS, "w={}", q.w);
        assert!(q.i.abs() < EPS, "x={}", q.i);
        assert!(q.j.abs() < EPS, "y={}", q.j);
        assert!((q.k + h).abs() < EPS, "z={}", q.k);
        assert!((q * Vector3::y() - Vector3::x()).norm() < EPS);
    }

    #[test]
    fn test_smoothing_converges_monotonically() {
        let (mut r, _) = Retargeter::bind(single_bone_rig(), config(0.35));
        let target = Vector3::x();
        let mut prev_angle = hips_world_dir(&r).angle(&target);
        for i in 0..20 {
            r.apply_directions(&directions(BoneKey::Hips, target));
            let angle = hips_world_dir(&r).angle(&target);
            assert!(angle < prev_angle, "step {}: {} >= {}", i, angle, prev_angle);
            prev_angle = angle;
        }
        assert!(prev_angle < 0.01);
    }

    #[test]
    fn test_alpha_one_matches_in_one_step() {
        let (mut r, _) = Retargeter::bind(single_bone_rig(), config(1.0));
        let target = normalize(Vector3::new(0.3, 0.5, -0.8)).unwrap();
        r.apply_directions(&directions(BoneKey::Hips, target));
        assert!((hips_world_dir(&r) - target).norm() < EPS);
    }

    #[test]
    fn test_exact_reversal_is_rejected() {
        let (mut r, _) = Retargeter::bind(single_bone_rig(), config(0.35));
        r.apply_directions(&directions(BoneKey::Hips, Vector3::x()));
        let id = r.skeleton().find_bone("hips").unwrap();
        let before = r.skeleton().local_rotation(id);

        let report = r.apply_directions(&directions(BoneKey::Hips, -Vector3::x()));
        assert_eq!(report.rejected, 1);
        assert_eq!(report.applied, 0);
        assert_eq!(r.skeleton().local_rotation(id), before);
    }

    #[test]
    fn test_moderate_turn_passes() {
        let (mut r, _) = Retargeter::bind(single_bone_rig(), config(1.0));
        r.apply_directions(&directions(BoneKey::Hips, Vector3::x()));
        // 90° は -0.2 の閾値を通る
        let report = r.apply_directions(&directions(BoneKey::Hips, Vector3::z()));
        assert_eq!(report.applied, 1);
        assert!((hips_world_dir(&r) - Vector3::z()).norm() < EPS);
    }

    #[test]
    fn test_reset_history_allows_reversal() {
        let (mut r, _) = Retargeter::bind(single_bone_rig(), config(1.0));
        r.apply_directions(&directions(BoneKey::Hips, Vector3::x()));
        r.reset_history();
        let report = r.apply_directions(&directions(BoneKey::Hips, -Vector3::x()));
        assert_eq!(report.applied, 1);
        // 反平行付近は丸め誤差が大きい
        assert!((hips_world_dir(&r) + Vector3::x()).norm() < 1e-3);
    }

    #[test]
    fn test_non_finite_and_zero_targets_skipped() {
        let (mut r, _) = Retargeter::bind(single_bone_rig(), config(1.0));
        let id = r.skeleton().find_bone("hips").unwrap();
        let report = r.apply_directions(&directions(BoneKey::Hips, Vector3::new(f32::NAN, 1.0, 0.0)));
        assert_eq!(report.applied, 0);
        let report = r.apply_directions(&directions(BoneKey::Hips, Vector3::zeros()));
        assert_eq!(report.applied, 0);
        assert_eq!(r.skeleton().local_rotation(id), UnitQuaternion::identity());
    }

    #[test]
    fn test_pole_solves_twist() {
        let (mut r, _) = Retargeter::bind(Rig::humanoid(), config(1.0));
        // 上向きのまま 90° 左を向く: 前方 +Z → +X
        let report = r.apply_targets(&targets(BoneKey::Hips, BoneTarget::with_pole(Vector3::y(), Vector3::x())));
        assert_eq!(report.applied, 1);

        let id = r.skeleton().find_bone("hips").unwrap();
        let world = r.skeleton().world_rotation(id);
        assert!((world * Vector3::y() - Vector3::y()).norm() < EPS);
        assert!((world * Vector3::z() - Vector3::x()).norm() < EPS);
    }

    #[test]
    fn test_pole_flip_rejected_and_stale_pole_cleared() {
        let (mut r, _) = Retargeter::bind(Rig::humanoid(), config(1.0));
        let id = r.skeleton().find_bone("hips").unwrap();
        r.apply_targets(&targets(BoneKey::Hips, BoneTarget::with_pole(Vector3::y(), Vector3::z())));

        let before = r.skeleton().local_rotation(id);
        let report = r.apply_targets(&targets(BoneKey::Hips, BoneTarget::with_pole(Vector3::y(), -Vector3::z())));
        assert_eq!(report.rejected, 1);
        assert_eq!(r.skeleton().local_rotation(id), before);

        // 方向のみのフレームでポール履歴が消えるので、次の反対ポールは通る
        r.apply_directions(&directions(BoneKey::Hips, Vector3::y()));
        let report = r.apply_targets(&targets(BoneKey::Hips, BoneTarget::with_pole(Vector3::y(), -Vector3::z())));
        assert_eq!(report.applied, 1);
        let world = r.skeleton().world_rotation(id);
        assert!((world * Vector3::z() + Vector3::z()).norm() < EPS);
    }

    #[test]
    fn test_pole_parallel_to_direction_falls_back() {
        let (mut r, _) = Retargeter::bind(Rig::humanoid(), config(1.0));
        let report = r.apply_targets(&targets(BoneKey::Hips, BoneTarget::with_pole(Vector3::x(), Vector3::x())));
        assert_eq!(report.applied, 1);
        let id = r.skeleton().find_bone("hips").unwrap();
        assert!((r.skeleton().world_rotation(id) * Vector3::y() - Vector3::x()).norm() < EPS);
    }

    #[test]
    fn test_child_local_accounts_for_parent() {
        let (mut r, _) = Retargeter::bind(Rig::humanoid(), config(1.0));
        let mut map = BoneTargets::default();
        // hips を Z まわりに 90° 倒し、spine は世界の +Y を向かせる
        map.insert(BoneKey::Hips, BoneTarget::direction(-Vector3::x()));
        map.insert(BoneKey::Spine, BoneTarget::direction(Vector3::y()));
        let report = r.apply_targets(&map);
        assert_eq!(report.applied, 2);

        let spine = r.skeleton().find_bone("spine").unwrap();
        let world_dir = r.skeleton().world_rotation(spine) * r.rest_direction(BoneKey::Spine).unwrap();
        assert!((world_dir - Vector3::y()).norm() < EPS, "{:?}", world_dir);
        // ローカルは親の回転を打ち消している
        assert!(r.skeleton().local_rotation(spine).angle() > 1.0);
    }

    #[test]
    fn test_limb_pole_rest_roundtrip() {
        let (mut r, _) = Retargeter::bind(Rig::humanoid(), config(1.0));
        let upper = r.skeleton().find_bone("leftUpperArm").unwrap();
        let lower = r.skeleton().find_bone("leftLowerArm").unwrap();
        let hand = r.skeleton().find_bone("leftHand").unwrap();
        let s = r.skeleton();
        let a = s.world_position(lower) - s.world_position(upper);
        let b = s.world_position(hand) - s.world_position(lower);
        let dir = normalize(a).unwrap();
        let pole = normalize(a.cross(&b)).unwrap();

        // バインドポーズそのものを与えると回転は変わらない
        r.apply_targets(&targets(BoneKey::LeftUpperArm, BoneTarget::with_pole(dir, pole)));
        assert!(r.skeleton().local_rotation(upper).angle() < 1e-4);
    }
}
