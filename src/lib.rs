pub mod config;
pub mod error;
pub mod perception;
pub mod pose;
pub mod retarget;
