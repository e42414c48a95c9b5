use thiserror::Error;

/// ライブラリ境界で返すエラー
///
/// 幾何的な退化（ゼロ長ベクトル、解決できないボーン、信頼度欠損）はエラーにしない。
/// 該当ターゲット/ボーンを黙ってスキップする。
#[derive(Debug, Error)]
pub enum MocapError {
    /// `init` 前に `run` が呼ばれた
    #[error("perception backend is not initialized")]
    NotInitialized,

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
