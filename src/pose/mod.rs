pub mod landmark;

pub use landmark::{FaceLandmarks, HandLandmarks, Handedness, Landmark, LandmarkIndex, PoseLandmarks};
