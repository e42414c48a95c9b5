pub mod applier;
pub mod bone;
pub mod mapper;
pub mod math;
pub mod skeleton;

pub use applier::{ApplyReport, BindFailure, BindReport, Retargeter};
pub use bone::{BoneDirections, BoneKey, BoneMap, BoneTarget, BoneTargets, PoleKind};
pub use mapper::{pose_to_targets, safe_pole, MappedPose, StabilizationContext, TargetMapper};
pub use skeleton::{BoneId, Rig, Skeleton};
