pub mod arcface_embedder;
mod execution_provider;
pub mod model_resolver;
pub mod onnx_face_model;
pub mod onnx_yolo_detector;
