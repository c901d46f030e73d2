pub mod config;
pub mod error;
pub mod frame;
pub mod pose_detection;
pub mod skeleton;
pub mod ws;

pub use config::Config;
pub use error::{BridgeError, BridgeResult};
pub use pose_detection::model_movenet::MovenetModel;
pub use pose_detection::{Keypoint, Pose, PoseDetectionModel, SharedModel};
pub use ws::run_server;
