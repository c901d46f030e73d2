use nalgebra::Vector2;

use crate::pose_detection::{BodyKeypoint, Keypoint, Pose};

type B = BodyKeypoint;

/// Limb connections between MoveNet keypoints, as drawn by the browser client.
pub const CONNECTIONS: [(BodyKeypoint, BodyKeypoint); 16] = [
    (B::Nose, B::LeftEye),
    (B::Nose, B::RightEye),
    (B::LeftEye, B::LeftEar),
    (B::RightEye, B::RightEar),
    (B::LeftShoulder, B::RightShoulder),
    (B::LeftShoulder, B::LeftElbow),
    (B::LeftElbow, B::LeftWrist),
    (B::RightShoulder, B::RightElbow),
    (B::RightElbow, B::RightWrist),
    (B::LeftShoulder, B::LeftHip),
    (B::RightShoulder, B::RightHip),
    (B::LeftHip, B::RightHip),
    (B::LeftHip, B::LeftKnee),
    (B::LeftKnee, B::LeftAnkle),
    (B::RightHip, B::RightKnee),
    (B::RightKnee, B::RightAnkle),
];

/// Connections whose both ends have a confidence above `min_confidence`.
pub fn visible_segments(pose: &Pose, min_confidence: f32) -> Vec<(Keypoint, Keypoint)> {
    CONNECTIONS
        .iter()
        .map(|&(a, b)| (pose.get(a), pose.get(b)))
        .filter(|(a, b)| a.confidence > min_confidence && b.confidence > min_confidence)
        .collect()
}

/// Angle at `b` (degrees) between the segments b->a and b->c.
/// Returns `None` if any point was not detected or a segment has zero length.
pub fn joint_angle(a: Keypoint, b: Keypoint, c: Keypoint) -> Option<f32> {
    if !(a.is_valid() && b.is_valid() && c.is_valid()) {
        return None;
    }

    let ba = Vector2::new(a.x - b.x, a.y - b.y);
    let bc = Vector2::new(c.x - b.x, c.y - b.y);
    if ba.norm() == 0.0 || bc.norm() == 0.0 {
        return None;
    }

    Some(ba.angle(&bc).to_degrees())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShoulderAngles {
    pub left: Option<f32>,
    pub right: Option<f32>,
}

/// Hip-shoulder-elbow angle on each side.
pub fn shoulder_angles(pose: &Pose) -> ShoulderAngles {
    ShoulderAngles {
        left: joint_angle(
            pose.get(B::LeftHip),
            pose.get(B::LeftShoulder),
            pose.get(B::LeftElbow),
        ),
        right: joint_angle(
            pose.get(B::RightHip),
            pose.get(B::RightShoulder),
            pose.get(B::RightElbow),
        ),
    }
}
