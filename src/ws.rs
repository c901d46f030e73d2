use std::time::Instant;

use actix::{Actor, ActorContext, StreamHandler};
use actix_web::{web, App, Error, HttpRequest, HttpResponse, HttpServer};
use actix_web_actors::ws;
use log::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{BridgeResult, BINARY_FRAME_REPLY};
use crate::frame::decode_base64_frame;
use crate::pose_detection::{run_shared, SharedModel};
use crate::skeleton::shoulder_angles;

struct AppState {
    model: SharedModel,
}

struct PoseSession {
    model: SharedModel,
    peer: String,
    frames_received: u64,
    frames_answered: u64,
}

impl Actor for PoseSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("New WebSocket connection opened ({})", self.peer);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(
            "WebSocket connection closed ({}): {} frames received, {} answered with keypoints",
            self.peer, self.frames_received, self.frames_answered
        );
    }
}

impl PoseSession {
    fn reply(&mut self, msg: &ws::Message) -> Option<String> {
        if matches!(msg, ws::Message::Text(_)) {
            self.frames_received += 1;
        }
        match process_message(&self.model, msg)? {
            Ok(json) => {
                self.frames_answered += 1;
                Some(json)
            }
            Err(reply) => Some(reply.to_string()),
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for PoseSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(v)) => ctx.pong(&v),
            Ok(ws::Message::Close(reason)) => {
                info!("ws close: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Ignoring fragmented websocket message");
            }
            Ok(msg) => {
                if let Some(reply) = self.reply(&msg) {
                    ctx.text(reply);
                }
            }
            Err(e) => {
                error!("WebSocket error: {}", e);
                ctx.stop();
            }
        }
    }
}

/// Reply for a data message; `None` for control frames.
pub fn process_message(
    model: &SharedModel,
    msg: &ws::Message,
) -> Option<Result<String, &'static str>> {
    match msg {
        ws::Message::Text(text) => Some(process_frame(model, text)),
        ws::Message::Binary(bin) => {
            error!("Received unexpected binary data ({} bytes)", bin.len());
            Some(Err(BINARY_FRAME_REPLY))
        }
        _ => None,
    }
}

/// Runs one text frame through the pipeline.
///
/// Returns the keypoint JSON, or the plain-text reply for the client when the
/// frame could not be decoded or processed.
pub fn process_frame(model: &SharedModel, payload: &str) -> Result<String, &'static str> {
    debug!("Received data size: {} bytes", payload.len());
    let t0 = Instant::now();

    let frame = decode_base64_frame(payload).map_err(|e| {
        error!("Received empty frame: {}", e);
        e.client_message()
    })?;

    let json = detect(model, &frame).map_err(|e| {
        error!("Error processing frame: {}", e);
        e.client_message()
    })?;

    debug!("Frame processed in {}ms", t0.elapsed().as_millis());
    Ok(json)
}

fn detect(model: &SharedModel, frame: &image::DynamicImage) -> BridgeResult<String> {
    let pose = run_shared(model, frame)?;

    if log::log_enabled!(log::Level::Debug) {
        let angles = shoulder_angles(&pose);
        debug!(
            "Detected {} keypoints, shoulder angles left={:?} right={:?}",
            pose.detected_count(),
            angles.left,
            angles.right
        );
    }

    pose.to_json()
}

async fn ws_route(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    config: web::Data<Config>,
) -> Result<HttpResponse, Error> {
    let peer = req
        .connection_info()
        .peer_addr()
        .unwrap_or("unknown")
        .to_string();
    info!("WebSocket connection attempt from {}", peer);

    let session = PoseSession {
        model: state.model.clone(),
        peer,
        frames_received: 0,
        frames_answered: 0,
    };
    ws::WsResponseBuilder::new(session, &req, stream)
        .frame_size(config.max_frame_bytes)
        .start()
}

pub async fn run_server(config: Config, model: SharedModel) -> std::io::Result<()> {
    let addr = config.bind_address();
    let workers = config.workers;
    info!("WebSocket server listening on: ws://{}/ws", addr);
    info!("Workers: {}", workers);

    let state = web::Data::new(AppState { model });
    let config = web::Data::new(config);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(config.clone())
            .route("/ws", web::get().to(ws_route))
            .route("/health", web::get().to(|| async { "OK" }))
    })
    .workers(workers)
    .bind(addr)?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BridgeError, EMPTY_FRAME_REPLY, PROCESSING_ERROR_REPLY};
    use crate::frame::tests::jpeg_base64;
    use crate::pose_detection::{share, Pose, PoseDetectionModel, KEYPOINT_COUNT};
    use image::DynamicImage;

    /// Returns a fixed model output regardless of the frame.
    struct FixedOutputModel {
        output: Vec<f32>,
    }

    impl PoseDetectionModel for FixedOutputModel {
        fn input_size(&self) -> (u32, u32) {
            (192, 192)
        }

        fn run(&self, _image: &DynamicImage) -> BridgeResult<Pose> {
            Pose::from_model_output(&self.output, 0.2)
        }
    }

    struct FailingModel;

    impl PoseDetectionModel for FailingModel {
        fn input_size(&self) -> (u32, u32) {
            (192, 192)
        }

        fn run(&self, _image: &DynamicImage) -> BridgeResult<Pose> {
            Err(BridgeError::Inference("session run failed".into()))
        }
    }

    #[test]
    fn test_frame_produces_keypoint_json() {
        let mut output = vec![0.0; KEYPOINT_COUNT * 3];
        // nose at x=0.25, y=0.75
        output[0] = 0.75;
        output[1] = 0.25;
        output[2] = 0.9;
        let model = share(FixedOutputModel { output });

        let json = process_frame(&model, &jpeg_base64(320, 240)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let keypoints = value.as_array().unwrap();

        assert_eq!(keypoints.len(), KEYPOINT_COUNT);
        assert_eq!(keypoints[0]["x"].as_f64().unwrap() as f32, 0.25);
        assert_eq!(keypoints[0]["y"].as_f64().unwrap() as f32, 0.75);
        assert_eq!(keypoints[1]["confidence"], -1.0);
    }

    #[test]
    fn test_malformed_base64_reports_empty_frame() {
        let model = share(FixedOutputModel {
            output: vec![0.0; 51],
        });
        assert_eq!(
            process_frame(&model, "%%% not base64 %%%"),
            Err(EMPTY_FRAME_REPLY)
        );
        assert_eq!(process_frame(&model, ""), Err(EMPTY_FRAME_REPLY));
    }

    #[test]
    fn test_binary_frame_is_rejected() {
        let model = share(FixedOutputModel {
            output: vec![0.9; 51],
        });
        let msg = ws::Message::Binary(web::Bytes::from_static(b"\xff\xd8\xff\xe0"));
        assert_eq!(
            process_message(&model, &msg),
            Some(Err(BINARY_FRAME_REPLY))
        );
    }

    #[test]
    fn test_text_message_runs_pipeline() {
        let model = share(FixedOutputModel {
            output: vec![0.9; 51],
        });
        let msg = ws::Message::Text(jpeg_base64(32, 32).into());
        let json = process_message(&model, &msg).unwrap().unwrap();
        assert!(json.starts_with('['));
    }

    #[test]
    fn test_control_frames_have_no_reply() {
        let model = share(FailingModel);
        let msg = ws::Message::Ping(web::Bytes::from_static(b"hi"));
        assert_eq!(process_message(&model, &msg), None);
    }

    #[test]
    fn test_inference_failure_reports_processing_error() {
        let model = share(FailingModel);
        assert_eq!(
            process_frame(&model, &jpeg_base64(64, 64)),
            Err(PROCESSING_ERROR_REPLY)
        );
    }

    #[test]
    fn test_short_model_output_reports_processing_error() {
        let model = share(FixedOutputModel {
            output: vec![0.5; 10],
        });
        assert_eq!(
            process_frame(&model, &jpeg_base64(64, 64)),
            Err(PROCESSING_ERROR_REPLY)
        );
    }
}
