pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp", "gif"];

/// Face crop thumbnail size in pixels.
pub const FACE_CROP_SIZE: u32 = 256;

pub const STATE_DIR_NAME: &str = ".facesort";
pub const CLUSTERS_DIR_NAME: &str = "clusters";
pub const CHECKPOINT_FILE_NAME: &str = "checkpoint.jsonl";
pub const OBSERVATION_CACHE_FILE_NAME: &str = "observations.jsonl";
pub const LOCK_FILE_NAME: &str = "run.lock";
pub const AUDIT_FILE_NAME: &str = "face_clusters.csv";
pub const FACE_CROPS_DIR_NAME: &str = "faces";
