//! デモ: 手を振るポーズを再生し、エンジン → マッパー → リターゲッターを通す

use std::time::Duration;

use anyhow::Result;
use log::{info, warn};
use nalgebra::Vector3;

use talava_mocap::config::Config;
use talava_mocap::perception::{Engine, FrameCounter, PerceptionPartial, ReplayBackend};
use talava_mocap::pose::{Landmark, LandmarkIndex, PoseLandmarks};
use talava_mocap::retarget::{Retargeter, Rig, TargetMapper};

const CONFIG_PATH: &str = "config.toml";
const VISIBILITY: f32 = 0.9;

/// リグ座標 (+Y 上, +Z 前) → MediaPipe ワールド座標 (y 下, z 奥)
fn to_mediapipe(p: Vector3<f32>) -> Landmark {
    Landmark::new(p.x, -p.y, -p.z).with_visibility(VISIBILITY)
}

/// 左手を振る 1 周期分のスクリプト
fn waving_script(frames: usize) -> Vec<PerceptionPartial> {
    let frames = frames.max(1);
    (0..frames)
        .map(|i| {
            let phase = i as f32 / frames as f32 * std::f32::consts::TAU;
            let swing = 0.6 * phase.sin();

            let mut world = vec![to_mediapipe(Vector3::new(0.0, 1.1, 0.0)); LandmarkIndex::COUNT];
            let mut set = |index: LandmarkIndex, p: Vector3<f32>| world[index as usize] = to_mediapipe(p);

            set(LandmarkIndex::LeftShoulder, Vector3::new(0.2, 1.4, 0.0));
            set(LandmarkIndex::RightShoulder, Vector3::new(-0.2, 1.4, 0.0));
            let elbow = Vector3::new(0.45, 1.45, 0.02);
            set(LandmarkIndex::LeftElbow, elbow);
            set(LandmarkIndex::LeftWrist, elbow + Vector3::new(swing.sin(), swing.cos(), 0.1) * 0.25);
            set(LandmarkIndex::RightElbow, Vector3::new(-0.22, 1.12, -0.03));
            set(LandmarkIndex::RightWrist, Vector3::new(-0.23, 0.88, 0.02));

            set(LandmarkIndex::LeftHip, Vector3::new(0.1, 0.9, 0.0));
            set(LandmarkIndex::RightHip, Vector3::new(-0.1, 0.9, 0.0));
            set(LandmarkIndex::LeftKnee, Vector3::new(0.1, 0.5, 0.03));
            set(LandmarkIndex::RightKnee, Vector3::new(-0.1, 0.5, 0.03));
            set(LandmarkIndex::LeftAnkle, Vector3::new(0.1, 0.1, 0.0));
            set(LandmarkIndex::RightAnkle, Vector3::new(-0.1, 0.1, 0.0));

            PerceptionPartial {
                pose: Some(PoseLandmarks::from_world(world)),
                hands: Some(Vec::new()),
                face: None,
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load_or_default(CONFIG_PATH);
    info!("talava_mocap ({})", env!("GIT_VERSION"));

    let backend = ReplayBackend::new(waving_script(config.demo.script_frames))
        .with_latency(Duration::from_millis(config.demo.latency_ms));

    let (mut retargeter, report) = Retargeter::bind(Rig::humanoid(), config.retarget.clone());
    info!("bound {} bones", report.bound.len());
    for (bone, failure) in &report.failures {
        warn!("bone {:?} skipped: {:?}", bone, failure);
    }

    let mut mapper = TargetMapper::from_config(&config.mapper);
    let mut published: u64 = 0;

    let mut engine = Engine::new(backend, FrameCounter::default(), config.mocap.clone())
        .on_state(move |state| {
            let targets = mapper.map_state(state);
            let applied = retargeter.apply_targets(&targets);
            published += 1;
            if published % 30 == 0 {
                info!(
                    "t={:.0}ms fps={:.1} dropped={} latency={:?} bones: applied={} rejected={} skipped={}",
                    state.t,
                    state.quality.fps,
                    state.quality.dropped_frames.unwrap_or(0),
                    state.quality.latency_ms,
                    applied.applied,
                    applied.rejected,
                    applied.skipped,
                );
            }
        })
        .on_error(|e| warn!("engine error: {:#}", e));

    let rates = &engine.config().hz;
    info!(
        "pose={}Hz hands={}Hz face={}Hz, tick={}Hz, duration={}s",
        rates.pose, rates.hands, rates.face, config.engine.tick_hz, config.demo.duration_secs
    );

    // load_or_default は検証済みの設定しか返さない
    let handle = engine.handle();
    let duration = config.demo.duration();
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        handle.stop();
    });

    engine.start().await?;
    engine.run(config.engine.cadence()).await;

    info!("done (dropped {} frames)", engine.dropped_frames());
    Ok(())
}
