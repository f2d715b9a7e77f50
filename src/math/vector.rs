//! センサー座標系の3次元ベクトル
//!
//! 演算本体は nalgebra に任せ、ここでは縮退時の扱いと平面射影だけを足す。

/// 3次元ベクトル（センサー座標系、メートル）
///
/// 位置（Point3）と自由ベクトル（Vector3）は同じ表現を共有する。
pub type Vec3 = nalgebra::Vector3<f32>;
pub type Point3 = Vec3;
pub type Vector3 = Vec3;

/// 関節角の計算で使う補助演算
pub trait VectorExt {
    /// 単位ベクトル化。長さ0のときは入力をそのまま返す
    fn normalized_or_self(&self) -> Vec3;

    /// XY平面への射影（Z成分を0にする）
    fn project_xy(&self) -> Vec3;

    /// ZX平面への射影（Y成分を0にする）
    fn project_zx(&self) -> Vec3;

    /// ZY平面への射影（X成分を0にする）
    fn project_zy(&self) -> Vec3;

    fn negate(&self) -> Vec3;
}

impl VectorExt for Vec3 {
    fn normalized_or_self(&self) -> Vec3 {
        self.try_normalize(0.0).unwrap_or(*self)
    }

    fn project_xy(&self) -> Vec3 {
        Vec3::new(self.x, self.y, 0.0)
    }

    fn project_zx(&self) -> Vec3 {
        Vec3::new(self.x, 0.0, self.z)
    }

    fn project_zy(&self) -> Vec3 {
        Vec3::new(0.0, self.y, self.z)
    }

    fn negate(&self) -> Vec3 {
        -*self
    }
}
