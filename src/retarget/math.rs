use nalgebra::{Matrix3, Rotation3, Unit, UnitQuaternion, Vector3};

/// これ以下の二乗長は無効ベクトル
pub const MIN_NORM_SQUARED: f32 = 1e-12;

/// 正規化。非有限・ゼロ長なら None
pub fn normalize(v: Vector3<f32>) -> Option<Vector3<f32>> {
    if !v.iter().all(|c| c.is_finite()) {
        return None;
    }
    let n2 = v.norm_squared();
    if n2 <= MIN_NORM_SQUARED {
        return None;
    }
    Some(v / n2.sqrt())
}

/// 軸ごとの符号反転
pub fn remap(v: Vector3<f32>, axis: &[f32; 3]) -> Vector3<f32> {
    Vector3::new(v.x * axis[0], v.y * axis[1], v.z * axis[2])
}

/// `pole` から `dir` 成分を除いて正規化。`dir` は単位ベクトル
pub fn orthogonalize(pole: Vector3<f32>, dir: &Vector3<f32>) -> Option<Vector3<f32>> {
    normalize(pole - dir * pole.dot(dir))
}

/// 列 (dir, pole×dir, pole) の正規直交基底を回転として返す
///
/// `dir` と `pole` は直交する単位ベクトルであること。
pub fn basis(dir: &Vector3<f32>, pole: &Vector3<f32>) -> UnitQuaternion<f32> {
    let m = Matrix3::from_columns(&[*dir, pole.cross(dir), *pole]);
    let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(m));
    UnitQuaternion::new_normalize(q.into_inner())
}

/// `from` を `to` に重ねる最短回転。両方単位ベクトル
pub fn shortest_arc(from: &Vector3<f32>, to: &Vector3<f32>) -> UnitQuaternion<f32> {
    if let Some(q) = UnitQuaternion::rotation_between(from, to) {
        return q;
    }
    // 反平行: 任意の直交軸で 180°
    let helper = if from.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
    let axis = Unit::new_normalize(from.cross(&helper));
    UnitQuaternion::from_axis_angle(&axis, std::f32::consts::PI)
}

/// `current` から `target` へ `alpha` だけ slerp。`alpha >= 1` はそのまま `target`
pub fn smooth_toward(current: &UnitQuaternion<f32>, target: &UnitQuaternion<f32>, alpha: f32) -> UnitQuaternion<f32> {
    if alpha >= 1.0 {
        return *target;
    }
    if alpha <= 0.0 {
        return *current;
    }
    current.try_slerp(target, alpha, 1.0e-6).unwrap_or(*target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_v(a: &Vector3<f32>, b: &Vector3<f32>, eps: f32) -> bool {
        (a - b).norm() < eps
    }

    #[test]
    fn test_normalize_rejects_degenerate() {
        assert!(normalize(Vector3::zeros()).is_none());
        assert!(normalize(Vector3::new(1e-7, 0.0, 0.0)).is_none());
        assert!(normalize(Vector3::new(f32::NAN, 1.0, 0.0)).is_none());
        assert!(normalize(Vector3::new(f32::INFINITY, 1.0, 0.0)).is_none());
        let n = normalize(Vector3::new(3.0, 0.0, 4.0)).unwrap();
        assert!((n.norm() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_remap() {
        let v = remap(Vector3::new(1.0, 2.0, 3.0), &[1.0, -1.0, -1.0]);
        assert_eq!(v, Vector3::new(1.0, -2.0, -3.0));
    }

    #[test]
    fn test_orthogonalize() {
        let dir = Vector3::y();
        let p = orthogonalize(Vector3::new(0.0, 0.7, 0.5), &dir).unwrap();
        assert!(approx_v(&p, &Vector3::z(), 1e-6));
        assert!(orthogonalize(Vector3::new(0.0, 2.0, 0.0), &dir).is_none());
    }

    #[test]
    fn test_basis_maps_axes() {
        let dir = Vector3::x();
        let pole = Vector3::y();
        let q = basis(&dir, &pole);
        assert!(approx_v(&(q * Vector3::x()), &dir, 1e-6));
        assert!(approx_v(&(q * Vector3::z()), &pole, 1e-6));
        assert!(approx_v(&(q * Vector3::y()), &pole.cross(&dir), 1e-6));
    }

    #[test]
    fn test_shortest_arc_antiparallel() {
        let from = Vector3::y();
        let q = shortest_arc(&from, &-from);
        assert!(approx_v(&(q * from), &-from, 1e-5));
    }

    #[test]
    fn test_smooth_toward() {
        let a = UnitQuaternion::identity();
        let b = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 1.0);
        assert_eq!(smooth_toward(&a, &b, 1.0), b);
        assert_eq!(smooth_toward(&a, &b, 0.0), a);
        let half = smooth_toward(&a, &b, 0.5);
        assert!((half.angle() - 0.5).abs() < 1e-5);
        // 同一回転でも panic しない
        assert_eq!(smooth_toward(&a, &a, 0.35), a);
    }
}
