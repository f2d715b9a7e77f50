pub mod average;
pub mod calibrate;
pub mod extract;
pub mod smooth;

pub use average::RunningAverage;
pub use calibrate::{CalibrationBaseline, Calibrator};
pub use extract::{Convention, Extracted, PoseExtractor};
pub use smooth::{SmoothedSample, Smoother};
