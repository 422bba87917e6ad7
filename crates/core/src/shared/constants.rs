/// YOLOv8 nano exported to ONNX; COCO class 0 is "person".
pub const YOLO_MODEL_NAME: &str = "yolov8n.onnx";

/// COCO class index of the only class this crate keeps.
pub const PERSON_CLASS_ID: usize = 0;

/// Max frames a track can be lost before removal (~1 second at 30 fps).
pub const TRACKER_MAX_LOST: usize = 30;

/// Detection thresholds used when nothing else is configured.
pub const DEFAULT_CONFIDENCE: f64 = 0.35;
pub const DEFAULT_IOU_THRESHOLD: f64 = 0.5;

/// Crops are JPEG-encoded at this quality.
pub const CROP_JPEG_QUALITY: u8 = 90;

/// URI prefixes for session crops and promoted datasets.
pub const TEMP_URI_PREFIX: &str = "/temp";
pub const PERSONS_URI_PREFIX: &str = "/persons";

/// File names inside the on-disk layout.
pub const SNAPSHOT_FILE_NAME: &str = "annotation.json";
pub const UPLOAD_EXTENSION: &str = "mp4";
pub const SUMMARY_SUFFIX: &str = "_summary.json";

/// Group name prefix used by the pipeline and by auto-named groups.
pub const GROUP_PREFIX: &str = "person_";

/// Dataset directory prefix in the permanent store.
pub const DATASET_PREFIX: &str = "dataset_";
