use std::fmt::Debug;
use std::sync::Arc;

use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use log::{debug, info};
use ndarray::{Array, CowArray, IxDyn};
use ort::tensor::{IntoTensorElementDataType, OrtOwnedTensor, TensorElementDataType};
use ort::value::DynArrayRef;
use ort::{Environment, ExecutionProvider, Session, SessionBuilder, Value};

use crate::config::ModelConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::pose_detection::{Pose, PoseDetectionModel};

/// Used when the model leaves its spatial input dimensions dynamic.
const DEFAULT_INPUT_SIZE: u32 = 192;

/// Element type of the model's image input. MoveNet exports exist for all three;
/// every variant is fed raw 0..=255 pixel values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputElement {
    Uint8,
    Int32,
    Float32,
}

impl TryFrom<TensorElementDataType> for InputElement {
    type Error = BridgeError;

    fn try_from(value: TensorElementDataType) -> Result<Self, Self::Error> {
        match value {
            TensorElementDataType::Uint8 => Ok(InputElement::Uint8),
            TensorElementDataType::Int32 => Ok(InputElement::Int32),
            TensorElementDataType::Float32 => Ok(InputElement::Float32),
            other => Err(BridgeError::UnsupportedInput(format!(
                "element type {:?}",
                other
            ))),
        }
    }
}

pub struct MovenetModel {
    _environment: Arc<Environment>,
    session: Session,
    input_width: u32,
    input_height: u32,
    input_element: InputElement,
    confidence_threshold: f32,
}

impl MovenetModel {
    pub fn new(config: &ModelConfig) -> BridgeResult<MovenetModel> {
        let environment = Environment::builder()
            .with_name("pose-bridge")
            .with_execution_providers([ExecutionProvider::CPU(Default::default())])
            .build()
            .map_err(|e| BridgeError::ModelLoad(e.to_string()))?
            .into_arc();

        let session = SessionBuilder::new(&environment)
            .and_then(|builder| builder.with_intra_threads(config.intra_threads))
            .and_then(|builder| builder.with_model_from_file(&config.model_path))
            .map_err(|e| {
                BridgeError::ModelLoad(format!("{}: {}", config.model_path.display(), e))
            })?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| BridgeError::ModelLoad("model has no inputs".into()))?;

        // NHWC: [batch, height, width, channels]
        if input.dimensions.len() != 4 {
            return Err(BridgeError::UnsupportedInput(format!(
                "expected a rank 4 NHWC input, got {:?}",
                input.dimensions
            )));
        }
        let input_height = input.dimensions[1].unwrap_or(DEFAULT_INPUT_SIZE);
        let input_width = input.dimensions[2].unwrap_or(DEFAULT_INPUT_SIZE);
        let input_element = InputElement::try_from(input.input_type)?;

        info!(
            "Loaded pose model {} (input '{}' {}x{} {:?})",
            config.model_path.display(),
            input.name,
            input_width,
            input_height,
            input_element
        );

        Ok(MovenetModel {
            _environment: environment,
            session,
            input_width,
            input_height,
            input_element,
            confidence_threshold: config.confidence_threshold,
        })
    }

    fn infer<T>(&self, pixels: Vec<T>) -> BridgeResult<Vec<f32>>
    where
        T: IntoTensorElementDataType + Debug + Clone + 'static,
        for<'a> DynArrayRef<'a>: From<CowArray<'a, T, IxDyn>>,
    {
        let shape = (1, self.input_height as usize, self.input_width as usize, 3);
        let array: CowArray<_, _> = Array::from_shape_vec(shape, pixels)?.into_dyn().into();

        let inputs = vec![Value::from_array(self.session.allocator(), &array)?];
        let outputs: Vec<Value> = self.session.run(inputs)?;

        let output = outputs
            .first()
            .ok_or_else(|| BridgeError::Inference("model produced no outputs".into()))?;
        let keypoints: OrtOwnedTensor<f32, _> = output.try_extract()?;
        let keypoints: Vec<f32> = keypoints.view().iter().copied().collect();

        Ok(keypoints)
    }
}

impl PoseDetectionModel for MovenetModel {
    fn input_size(&self) -> (u32, u32) {
        (self.input_width, self.input_height)
    }

    fn run(&self, image: &DynamicImage) -> BridgeResult<Pose> {
        let input = prepare_input(image, self.input_width, self.input_height);

        let raw = match self.input_element {
            InputElement::Uint8 => self.infer(input.into_raw())?,
            InputElement::Int32 => {
                self.infer(input.pixels().flat_map(|p| p.0).map(i32::from).collect())?
            }
            InputElement::Float32 => {
                self.infer(input.pixels().flat_map(|p| p.0).map(f32::from).collect())?
            }
        };
        debug!("model returned {} values", raw.len());

        Pose::from_model_output(&raw, self.confidence_threshold)
    }
}

/// Stretches the frame to the model input size and converts it to RGB.
/// The aspect ratio is not preserved, output coordinates stay relative to the full frame.
pub fn prepare_input(image: &DynamicImage, width: u32, height: u32) -> RgbImage {
    image
        .resize_exact(width, height, FilterType::Triangle)
        .to_rgb8()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_prepare_input_matches_model_shape() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(640, 480, Rgb([10, 20, 30])));
        let input = prepare_input(&image, 192, 192);
        assert_eq!(input.dimensions(), (192, 192));
        assert_eq!(input.into_raw().len(), 192 * 192 * 3);
    }

    #[test]
    fn test_prepare_input_keeps_rgb_order() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([200, 100, 50])));
        let input = prepare_input(&image, 8, 8);
        assert_eq!(input.get_pixel(4, 4).0, [200, 100, 50]);
    }

    #[test]
    fn test_input_element_types() {
        assert_eq!(
            InputElement::try_from(TensorElementDataType::Int32).unwrap(),
            InputElement::Int32
        );
        assert!(InputElement::try_from(TensorElementDataType::Int64).is_err());
    }
}
