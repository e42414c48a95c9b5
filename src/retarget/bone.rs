use nalgebra::Vector3;
use std::ops::{Index, IndexMut};

/// リターゲット対象の 13 ボーン
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum BoneKey {
    Hips = 0,
    Spine = 1,
    Chest = 2,
    LeftShoulder = 3,
    RightShoulder = 4,
    LeftUpperArm = 5,
    RightUpperArm = 6,
    LeftLowerArm = 7,
    RightLowerArm = 8,
    LeftUpperLeg = 9,
    RightUpperLeg = 10,
    LeftLowerLeg = 11,
    RightLowerLeg = 12,
}

/// ボーンが持つポールの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoleKind {
    None,
    /// 固定のワールド前方軸
    Torso,
    /// ボーン→子→孫の曲げ平面の法線
    Limb,
}

impl BoneKey {
    pub const COUNT: usize = 13;

    /// 親から子の順。適用はこの順で行う
    pub const ALL: [BoneKey; Self::COUNT] = [
        BoneKey::Hips,
        BoneKey::Spine,
        BoneKey::Chest,
        BoneKey::LeftShoulder,
        BoneKey::RightShoulder,
        BoneKey::LeftUpperArm,
        BoneKey::RightUpperArm,
        BoneKey::LeftLowerArm,
        BoneKey::RightLowerArm,
        BoneKey::LeftUpperLeg,
        BoneKey::RightUpperLeg,
        BoneKey::LeftLowerLeg,
        BoneKey::RightLowerLeg,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn pole_kind(self) -> PoleKind {
        match self {
            BoneKey::Hips | BoneKey::Spine | BoneKey::Chest => PoleKind::Torso,
            BoneKey::LeftUpperArm
            | BoneKey::RightUpperArm
            | BoneKey::LeftUpperLeg
            | BoneKey::RightUpperLeg => PoleKind::Limb,
            _ => PoleKind::None,
        }
    }

    /// 曲げ平面の2本目の区間を担うボーン
    pub fn limb_child(self) -> Option<BoneKey> {
        match self {
            BoneKey::LeftUpperArm => Some(BoneKey::LeftLowerArm),
            BoneKey::RightUpperArm => Some(BoneKey::RightLowerArm),
            BoneKey::LeftUpperLeg => Some(BoneKey::LeftLowerLeg),
            BoneKey::RightUpperLeg => Some(BoneKey::RightLowerLeg),
            _ => None,
        }
    }

    pub fn chain(self) -> &'static BoneChain {
        &BONE_CHAINS[self.index()]
    }
}

/// ボーン名と、バインドポーズから基準方向を取るための子ボーン候補（先頭優先）
#[derive(Debug)]
pub struct BoneChain {
    pub bone: &'static str,
    pub children: &'static [&'static str],
}

const BONE_CHAINS: [BoneChain; BoneKey::COUNT] = [
    BoneChain { bone: "hips", children: &["spine"] },
    BoneChain { bone: "spine", children: &["chest"] },
    BoneChain { bone: "chest", children: &["upperChest", "neck"] },
    BoneChain { bone: "leftShoulder", children: &["leftUpperArm"] },
    BoneChain { bone: "rightShoulder", children: &["rightUpperArm"] },
    BoneChain { bone: "leftUpperArm", children: &["leftLowerArm"] },
    BoneChain { bone: "rightUpperArm", children: &["rightLowerArm"] },
    BoneChain { bone: "leftLowerArm", children: &["leftHand"] },
    BoneChain { bone: "rightLowerArm", children: &["rightHand"] },
    BoneChain { bone: "leftUpperLeg", children: &["leftLowerLeg"] },
    BoneChain { bone: "rightUpperLeg", children: &["rightLowerLeg"] },
    BoneChain { bone: "leftLowerLeg", children: &["leftFoot"] },
    BoneChain { bone: "rightLowerLeg", children: &["rightFoot"] },
];

/// `BoneKey` で引く固定長テーブル
#[derive(Debug, Clone, PartialEq)]
pub struct BoneMap<T> {
    slots: [T; BoneKey::COUNT],
}

impl<T> BoneMap<T> {
    pub fn from_fn(mut f: impl FnMut(BoneKey) -> T) -> Self {
        Self {
            slots: std::array::from_fn(|i| f(BoneKey::ALL[i])),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (BoneKey, &T)> {
        BoneKey::ALL.into_iter().zip(self.slots.iter())
    }
}

impl<T: Default> Default for BoneMap<T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

impl<T> Index<BoneKey> for BoneMap<T> {
    type Output = T;

    fn index(&self, key: BoneKey) -> &T {
        &self.slots[key.index()]
    }
}

impl<T> IndexMut<BoneKey> for BoneMap<T> {
    fn index_mut(&mut self, key: BoneKey) -> &mut T {
        &mut self.slots[key.index()]
    }
}

/// 疎なマップとしての操作
impl<T> BoneMap<Option<T>> {
    pub fn get(&self, key: BoneKey) -> Option<&T> {
        self[key].as_ref()
    }

    pub fn insert(&mut self, key: BoneKey, value: T) {
        self[key] = Some(value);
    }

    pub fn contains(&self, key: BoneKey) -> bool {
        self[key].is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn present(&self) -> impl Iterator<Item = (BoneKey, &T)> {
        self.iter().filter_map(|(k, v)| v.as_ref().map(|v| (k, v)))
    }
}

/// 1ボーン分の向きターゲット（観測フレーム）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneTarget {
    pub direction: Vector3<f32>,
    pub pole: Option<Vector3<f32>>,
}

impl BoneTarget {
    pub fn direction(direction: Vector3<f32>) -> Self {
        Self { direction, pole: None }
    }

    pub fn with_pole(direction: Vector3<f32>, pole: Vector3<f32>) -> Self {
        Self {
            direction,
            pole: Some(pole),
        }
    }
}

pub type BoneTargets = BoneMap<Option<BoneTarget>>;
pub type BoneDirections = BoneMap<Option<Vector3<f32>>>;
