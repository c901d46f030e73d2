// Runs the pose model on a single image file and prints the keypoints.
//
//   pose_from_image <image.jpg> [model.onnx]

use anyhow::{bail, Context};
use log::info;

use pose_bridge::pose_detection::{BodyKeypoint, PoseDetectionModel};
use pose_bridge::skeleton::{shoulder_angles, visible_segments};
use pose_bridge::{Config, MovenetModel};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let Some(image_path) = args.next() else {
        bail!("usage: pose_from_image <image> [model.onnx]");
    };

    let mut config = Config::load()?;
    if let Some(model_path) = args.next() {
        config.model.model_path = model_path.into();
    }

    let image = image::open(&image_path).with_context(|| format!("opening {}", image_path))?;
    info!("Loaded {} ({}x{})", image_path, image.width(), image.height());

    let model = MovenetModel::new(&config.model)?;
    let (width, height) = model.input_size();
    info!("Model input {}x{}", width, height);
    let pose = model.run(&image)?;

    println!("{}", pose.to_json()?);

    for keypoint in BodyKeypoint::ALL {
        let k = pose.get(keypoint);
        if k.is_valid() {
            info!(
                "{:>14}: x={:.3} y={:.3} confidence={:.2}",
                keypoint.name(),
                k.x,
                k.y,
                k.confidence
            );
        }
    }

    let angles = shoulder_angles(&pose);
    info!(
        "{} of {} keypoints detected, {} limbs visible",
        pose.detected_count(),
        BodyKeypoint::ALL.len(),
        visible_segments(&pose, 0.5).len()
    );
    info!(
        "Shoulder angles: left={:?} right={:?}",
        angles.left, angles.right
    );

    Ok(())
}
