pub mod model_movenet;

use std::sync::{Arc, Mutex};

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// Number of keypoints predicted by single-pose MoveNet.
pub const KEYPOINT_COUNT: usize = 17;

/// Each keypoint is reported by the model as (y, x, confidence).
pub const VALUES_PER_KEYPOINT: usize = 3;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.2;

/// The model shared by every websocket session. Inference holds the lock.
pub type SharedModel = Arc<Mutex<dyn PoseDetectionModel>>;

pub trait PoseDetectionModel: Send {
    /// Input size expected by the model as (width, height).
    fn input_size(&self) -> (u32, u32);

    /// Runs the model on a full frame and returns the thresholded pose.
    fn run(&self, image: &DynamicImage) -> BridgeResult<Pose>;
}

pub fn share<M: PoseDetectionModel + 'static>(model: M) -> SharedModel {
    Arc::new(Mutex::new(model))
}

/// Locks the shared model and runs it on `image`.
pub fn run_shared(model: &SharedModel, image: &DynamicImage) -> BridgeResult<Pose> {
    let guard = model.lock().map_err(|_| BridgeError::Poisoned)?;
    guard.run(image)
}

/// MoveNet keypoint order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BodyKeypoint {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl BodyKeypoint {
    pub const ALL: [BodyKeypoint; KEYPOINT_COUNT] = [
        BodyKeypoint::Nose,
        BodyKeypoint::LeftEye,
        BodyKeypoint::RightEye,
        BodyKeypoint::LeftEar,
        BodyKeypoint::RightEar,
        BodyKeypoint::LeftShoulder,
        BodyKeypoint::RightShoulder,
        BodyKeypoint::LeftElbow,
        BodyKeypoint::RightElbow,
        BodyKeypoint::LeftWrist,
        BodyKeypoint::RightWrist,
        BodyKeypoint::LeftHip,
        BodyKeypoint::RightHip,
        BodyKeypoint::LeftKnee,
        BodyKeypoint::RightKnee,
        BodyKeypoint::LeftAnkle,
        BodyKeypoint::RightAnkle,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            BodyKeypoint::Nose => "nose",
            BodyKeypoint::LeftEye => "left_eye",
            BodyKeypoint::RightEye => "right_eye",
            BodyKeypoint::LeftEar => "left_ear",
            BodyKeypoint::RightEar => "right_ear",
            BodyKeypoint::LeftShoulder => "left_shoulder",
            BodyKeypoint::RightShoulder => "right_shoulder",
            BodyKeypoint::LeftElbow => "left_elbow",
            BodyKeypoint::RightElbow => "right_elbow",
            BodyKeypoint::LeftWrist => "left_wrist",
            BodyKeypoint::RightWrist => "right_wrist",
            BodyKeypoint::LeftHip => "left_hip",
            BodyKeypoint::RightHip => "right_hip",
            BodyKeypoint::LeftKnee => "left_knee",
            BodyKeypoint::RightKnee => "right_knee",
            BodyKeypoint::LeftAnkle => "left_ankle",
            BodyKeypoint::RightAnkle => "right_ankle",
        }
    }
}

/// A single detected keypoint. Coordinates are normalised to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

impl Keypoint {
    /// Reported in place of keypoints at or below the confidence threshold.
    pub const INVALID: Keypoint = Keypoint {
        x: -1.0,
        y: -1.0,
        confidence: -1.0,
    };

    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    pub fn is_valid(&self) -> bool {
        *self != Keypoint::INVALID
    }
}

/// The 17 keypoints of one frame, serialized as a bare JSON array.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Pose {
    keypoints: [Keypoint; KEYPOINT_COUNT],
}

impl Pose {
    /// Builds a pose from the flattened model output (y, x, confidence per keypoint).
    ///
    /// The threshold is exclusive: a keypoint is kept only when its confidence is
    /// strictly greater than `threshold`. Values past the first 17 triplets are ignored.
    pub fn from_model_output(raw: &[f32], threshold: f32) -> BridgeResult<Pose> {
        let expected = KEYPOINT_COUNT * VALUES_PER_KEYPOINT;
        if raw.len() < expected {
            return Err(BridgeError::OutputShape {
                expected,
                actual: raw.len(),
            });
        }

        let mut keypoints = [Keypoint::INVALID; KEYPOINT_COUNT];
        for (keypoint, triplet) in keypoints
            .iter_mut()
            .zip(raw.chunks_exact(VALUES_PER_KEYPOINT))
        {
            let (y, x, confidence) = (triplet[0], triplet[1], triplet[2]);
            // NaN confidence fails the comparison and stays invalid
            if confidence > threshold {
                *keypoint = Keypoint::new(x, y, confidence);
            }
        }

        Ok(Pose { keypoints })
    }

    pub fn get(&self, keypoint: BodyKeypoint) -> Keypoint {
        self.keypoints[keypoint.index()]
    }

    pub fn keypoints(&self) -> &[Keypoint; KEYPOINT_COUNT] {
        &self.keypoints
    }

    pub fn detected_count(&self) -> usize {
        self.keypoints.iter().filter(|k| k.is_valid()).count()
    }

    pub fn to_json(&self) -> BridgeResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
