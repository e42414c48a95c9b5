/// 指数移動平均による FPS 推定
pub struct FpsEstimator {
    last_ms: Option<f64>,
    smoothed: f64,
}

const KEEP: f64 = 0.9;

impl FpsEstimator {
    pub fn new() -> Self {
        Self {
            last_ms: None,
            smoothed: 0.0,
        }
    }

    /// 初回はタイムスタンプを記録して 0 を返す
    pub fn update(&mut self, now_ms: f64) -> f64 {
        let Some(last) = self.last_ms.replace(now_ms) else {
            return 0.0;
        };
        let dt = now_ms - last;
        if dt <= 0.0 {
            return self.smoothed;
        }

        let fps = 1000.0 / dt;
        self.smoothed = if self.smoothed > 0.0 {
            self.smoothed * KEEP + fps * (1.0 - KEEP)
        } else {
            fps
        };
        self.smoothed
    }

    pub fn current(&self) -> f64 {
        self.smoothed
    }

    pub fn reset(&mut self) {
        self.last_ms = None;
        self.smoothed = 0.0;
    }
}

impl Default for FpsEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_smoothing_sequence() {
        let mut f = FpsEstimator::new();
        assert_eq!(f.update(1000.0), 0.0);
        assert!((f.update(1100.0) - 10.0).abs() < 1e-9);
        // 10*0.9 + 20*0.1 = 11
        let v = f.update(1150.0);
        assert!((v - 11.0).abs() < 1e-9, "fps={}", v);
    }

    #[test]
    fn test_fps_zero_dt_keeps_value() {
        let mut f = FpsEstimator::new();
        f.update(0.0);
        f.update(50.0);
        assert!((f.update(50.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_fps_reset() {
        let mut f = FpsEstimator::new();
        f.update(0.0);
        f.update(100.0);
        f.reset();
        assert_eq!(f.current(), 0.0);
        assert_eq!(f.update(500.0), 0.0);
    }
}
