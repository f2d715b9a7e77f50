pub mod angle;
pub mod rotation;
pub mod vector;

pub use angle::{angle_at_joint, angle_between, angle_xy, angle_zx, angle_zy, finite_or_zero};
pub use rotation::{
    euler_from_matrix, euler_from_quaternion, EulerAngles, EulerOrder, Matrix3, Quaternion, Rotation,
};
pub use vector::{Point3, Vec3, Vector3, VectorExt};
