use nalgebra::{UnitQuaternion, Vector3};

pub type BoneId = usize;

/// リターゲット先の骨格（外部）
///
/// 回転はすべて単位クォータニオン。`set_local_rotation` の後、
/// ワールド値は `update_world_transforms` を呼ぶまで古いままでよい。
pub trait Skeleton {
    fn find_bone(&self, name: &str) -> Option<BoneId>;
    fn parent(&self, bone: BoneId) -> Option<BoneId>;
    fn local_rotation(&self, bone: BoneId) -> UnitQuaternion<f32>;
    fn set_local_rotation(&mut self, bone: BoneId, rotation: UnitQuaternion<f32>);
    fn world_rotation(&self, bone: BoneId) -> UnitQuaternion<f32>;
    fn world_position(&self, bone: BoneId) -> Vector3<f32>;
    fn update_world_transforms(&mut self);
}

#[derive(Debug, Clone)]
struct Joint {
    name: String,
    parent: Option<BoneId>,
    /// 親ローカル空間でのオフセット
    offset: Vector3<f32>,
    local_rotation: UnitQuaternion<f32>,
    world_rotation: UnitQuaternion<f32>,
    world_position: Vector3<f32>,
}

/// メモリ上の簡易リグ。親は子より先に追加する
#[derive(Debug, Clone, Default)]
pub struct Rig {
    joints: Vec<Joint>,
}

impl Rig {
    pub fn new() -> Self {
        Self::default()
    }

    /// ジョイントを追加して ID を返す
    ///
    /// # Panics
    ///
    /// `parent` がまだ追加されていない ID の場合。
    pub fn add_joint(&mut self, name: &str, parent: Option<BoneId>, offset: Vector3<f32>) -> BoneId {
        assert!(parent.map_or(true, |p| p < self.joints.len()), "parent must be added first");
        let id = self.joints.len();
        self.joints.push(Joint {
            name: name.to_string(),
            parent,
            offset,
            local_rotation: UnitQuaternion::identity(),
            world_rotation: UnitQuaternion::identity(),
            world_position: offset,
        });
        self.update_world_transforms();
        id
    }

    /// +Y 上、+Z 前、キャラクターの左が +X の T ポーズ
    ///
    /// 肘は少し後ろ、膝は少し前に曲げてあり、四肢の曲げ平面が定まる。
    pub fn humanoid() -> Self {
        let mut rig = Rig::new();
        let hips = rig.add_joint("hips", None, Vector3::new(0.0, 1.0, 0.0));
        let spine = rig.add_joint("spine", Some(hips), Vector3::new(0.0, 0.1, 0.0));
        let chest = rig.add_joint("chest", Some(spine), Vector3::new(0.0, 0.15, 0.0));
        let neck = rig.add_joint("neck", Some(chest), Vector3::new(0.0, 0.2, 0.0));
        rig.add_joint("head", Some(neck), Vector3::new(0.0, 0.12, 0.0));

        for (side, sx) in [("left", 1.0f32), ("right", -1.0)] {
            let shoulder = rig.add_joint(&format!("{side}Shoulder"), Some(chest), Vector3::new(0.03 * sx, 0.15, 0.0));
            let upper = rig.add_joint(&format!("{side}UpperArm"), Some(shoulder), Vector3::new(0.12 * sx, 0.0, 0.0));
            let lower = rig.add_joint(&format!("{side}LowerArm"), Some(upper), Vector3::new(0.26 * sx, 0.0, -0.01));
            rig.add_joint(&format!("{side}Hand"), Some(lower), Vector3::new(0.25 * sx, 0.0, 0.0));

            let upper_leg = rig.add_joint(&format!("{side}UpperLeg"), Some(hips), Vector3::new(0.09 * sx, -0.05, 0.0));
            let lower_leg = rig.add_joint(&format!("{side}LowerLeg"), Some(upper_leg), Vector3::new(0.0, -0.42, 0.01));
            rig.add_joint(&format!("{side}Foot"), Some(lower_leg), Vector3::new(0.0, -0.40, 0.0));
        }
        rig
    }
}

impl Skeleton for Rig {
    fn find_bone(&self, name: &str) -> Option<BoneId> {
        self.joints.iter().position(|j| j.name == name)
    }

    fn parent(&self, bone: BoneId) -> Option<BoneId> {
        self.joints[bone].parent
    }

    fn local_rotation(&self, bone: BoneId) -> UnitQuaternion<f32> {
        self.joints[bone].local_rotation
    }

    fn set_local_rotation(&mut self, bone: BoneId, rotation: UnitQuaternion<f32>) {
        self.joints[bone].local_rotation = rotation;
    }

    fn world_rotation(&self, bone: BoneId) -> UnitQuaternion<f32> {
        self.joints[bone].world_rotation
    }

    fn world_position(&self, bone: BoneId) -> Vector3<f32> {
        self.joints[bone].world_position
    }

    fn update_world_transforms(&mut self) {
        // 親が先に並んでいるので1パスで済む
        for i in 0..self.joints.len() {
            let (rotation, position) = match self.joints[i].parent {
                Some(p) => {
                    let parent = &self.joints[p];
                    (
                        parent.world_rotation * self.joints[i].local_rotation,
                        parent.world_position + parent.world_rotation * self.joints[i].offset,
                    )
                }
                None => (self.joints[i].local_rotation, self.joints[i].offset),
            };
            self.joints[i].world_rotation = rotation;
            self.joints[i].world_position = position;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_humanoid_layout() {
        let rig = Rig::humanoid();
        let hand = rig.find_bone("leftHand").unwrap();
        let p = rig.world_position(hand);
        assert!(p.x > 0.6, "left hand should be on +x: {:?}", p);
        let foot = rig.find_bone("rightFoot").unwrap();
        assert!(rig.world_position(foot).y < 0.2);
        assert!(rig.find_bone("upperChest").is_none());
        assert_eq!(rig.parent(rig.find_bone("hips").unwrap()), None);
    }

    #[test]
    #[should_panic(expected = "parent must be added first")]
    fn test_add_joint_rejects_unknown_parent() {
        let mut rig = Rig::new();
        rig.add_joint("root", None, Vector3::zeros());
        rig.add_joint("orphan", Some(1), Vector3::zeros());
    }

    #[test]
    fn test_world_transforms_follow_parent() {
        let mut rig = Rig::new();
        let root = rig.add_joint("root", None, Vector3::zeros());
        let child = rig.add_joint("child", Some(root), Vector3::new(0.0, 1.0, 0.0));

        let q = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f32::consts::FRAC_PI_2);
        rig.set_local_rotation(root, q);
        // 更新前は古い値
        assert!((rig.world_position(child) - Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-6);

        rig.update_world_transforms();
        assert!((rig.world_position(child) - Vector3::new(-1.0, 0.0, 0.0)).norm() < 1e-6);
        assert!(rig.world_rotation(child).angle_to(&q) < 1e-6);
    }
}
