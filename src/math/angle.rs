use super::vector::{Vec3, VectorExt};

/// NaN/Infinity を縮退ジオメトリとして0に置き換える
pub fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// v0, v1 の成す角。どちらかが長さ0なら0（縮退）
///
/// `sign` は atan2 の両引数に掛かる（-1 で反転版）
fn signed_angle(v0: Vec3, v1: Vec3, sign: f32) -> f32 {
    if v0.magnitude() == 0.0 || v1.magnitude() == 0.0 {
        tracing::trace!("degenerate geometry: zero-length vector");
        return 0.0;
    }
    let v0 = v0.normalized_or_self();
    let v1 = v1.normalized_or_self();
    let x = v0.cross(&v1).magnitude();
    let y = v0.dot(&v1);
    finite_or_zero(f32::atan2(sign * x, sign * y))
}

/// 関節点 `b` での角度（`c - b` と `a - b` の成す角）
pub fn angle_at_joint(a: Vec3, b: Vec3, c: Vec3, sign_flip: bool) -> f32 {
    let sign = if sign_flip { -1.0 } else { 1.0 };
    signed_angle(c - b, a - b, sign)
}

/// XY平面に制限した関節角（符号反転済み）
pub fn angle_xy(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    -signed_angle((c - b).project_xy(), (a - b).project_xy(), 1.0)
}

/// ZX平面に制限した関節角（符号反転済み）
pub fn angle_zx(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    -signed_angle((c - b).project_zx(), (a - b).project_zx(), 1.0)
}

/// ZY平面に制限した関節角（符号反転済み）
pub fn angle_zy(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    -signed_angle((c - b).project_zy(), (a - b).project_zy(), 1.0)
}

/// 自由ベクトル u, w の成す角 [0, π]
pub fn angle_between(u: Vec3, w: Vec3) -> f32 {
    signed_angle(u, w, 1.0)
}
