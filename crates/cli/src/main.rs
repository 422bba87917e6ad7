mod settings;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};

use cropsort_core::correction::correction_engine::CorrectionEngine;
use cropsort_core::detection::infrastructure::detector_factory::build_backend;
use cropsort_core::pipeline::ingest_task::{IngestEvent, IngestTask};
use cropsort_core::pipeline::ingest_video_use_case::IngestVideoUseCase;
use cropsort_core::promotion::promote_session_use_case::PromoteSessionUseCase;
use cropsort_core::session::domain::session_error::SessionError;
use cropsort_core::session::domain::store_layout::StoreLayout;
use cropsort_core::session::infrastructure::fs_session_store::FsSessionStore;
use cropsort_core::session::infrastructure::session_locks::SessionLocks;
use cropsort_core::shared::constants::YOLO_MODEL_NAME;
use cropsort_core::video::infrastructure::ffmpeg_reader::FfmpegReader;
use cropsort_core::video::infrastructure::jpeg_crop_writer::JpegCropWriter;

use crate::settings::Settings;

/// Split videos into per-person crop sessions, correct them, and promote
/// them into numbered datasets.
#[derive(Parser)]
#[command(name = "cropsort", version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Default)]
struct GlobalArgs {
    /// Settings file (default: <config dir>/cropsort/settings.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Put the temp, persons, uploads and annotations roots under this directory.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Root of editable sessions.
    #[arg(long, global = true)]
    temp_root: Option<PathBuf>,

    /// Root of promoted datasets.
    #[arg(long, global = true)]
    persons_root: Option<PathBuf>,

    /// Where raw uploads are kept.
    #[arg(long, global = true)]
    uploads_dir: Option<PathBuf>,

    /// Where ingest summaries are written.
    #[arg(long, global = true)]
    annotations_dir: Option<PathBuf>,

    /// YOLO ONNX model file.
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// URL to download the model from when it is not cached.
    #[arg(long, global = true)]
    model_url: Option<String>,

    /// Person detection confidence threshold (0.0-1.0).
    #[arg(long, global = true)]
    confidence: Option<f64>,

    /// NMS IoU threshold (0.0-1.0).
    #[arg(long, global = true)]
    iou: Option<f64>,

    /// Minimum crop area in pixels.
    #[arg(long, global = true)]
    min_box_area: Option<u64>,

    /// Without tracking, detect on every Nth frame only.
    #[arg(long, global = true)]
    sample_every: Option<usize>,

    /// Disable ByteTrack; every detection becomes its own group.
    #[arg(long, global = true)]
    no_tracking: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest a video into a new session.
    Ingest {
        video: PathBuf,
        /// Print frame progress to stderr.
        #[arg(long)]
        progress: bool,
    },
    /// List sessions in the temp store.
    Sessions,
    /// List a session's groups and images.
    Persons { session_id: String },
    /// Show the snapshot written at ingest time.
    Snapshot { session_id: String },
    /// Create an empty group, auto-named unless --name is given.
    AddGroup {
        session_id: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Move an image URI into another group.
    Move { src: String, dest_group: String },
    /// Delete an image URI.
    Delete { uri: String },
    /// Rename a group.
    Rename {
        session_id: String,
        old_name: String,
        new_name: String,
    },
    /// Move a session into the next dataset slot.
    Promote { session_id: String },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(body) => println!("{body}"),
        Err(e) => {
            println!("{}", failure_body(e.as_ref()));
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<Value, Box<dyn std::error::Error>> {
    let settings = apply_overrides(Settings::load(cli.global.config.as_deref()), &cli.global);
    settings.validate().map_err(SessionError::validation)?;

    let layout = settings.layout.clone();
    layout.ensure_dirs()?;
    let locks = Arc::new(SessionLocks::new(&layout));
    let store = Arc::new(FsSessionStore::new(layout));
    let engine = CorrectionEngine::new(store.clone(), locks.clone());

    let body = match cli.command {
        Command::Ingest { video, progress } => run_ingest(&settings, store, &video, progress)?,
        Command::Sessions => json!({ "sessions": store.list_sessions()? }),
        Command::Persons { session_id } => {
            let persons = store.list_persons(&session_id)?;
            json!({ "session_id": session_id, "persons": persons })
        }
        Command::Snapshot { session_id } => {
            let persons = store.read_snapshot(&session_id)?;
            json!({ "session_id": session_id, "persons": persons })
        }
        Command::AddGroup { session_id, name } => {
            json!({ "person": engine.create_group(&session_id, name.as_deref())? })
        }
        Command::Move { src, dest_group } => {
            json!({ "moved_to": engine.move_image(&src, &dest_group)? })
        }
        Command::Delete { uri } => json!({ "deleted": engine.delete_image(&uri)? }),
        Command::Rename {
            session_id,
            old_name,
            new_name,
        } => {
            let (from, to) = engine.rename_group(&session_id, &old_name, &new_name)?;
            json!({ "from": from, "to": to })
        }
        Command::Promote { session_id } => {
            let promoter = PromoteSessionUseCase::new(store, locks);
            json!({ "moved_to": promoter.execute(&session_id)? })
        }
    };
    Ok(body)
}

fn run_ingest(
    settings: &Settings,
    store: Arc<FsSessionStore>,
    video: &std::path::Path,
    show_progress: bool,
) -> Result<Value, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(video)
        .map_err(|e| SessionError::validation(format!("Cannot read {}: {e}", video.display())))?;

    log::info!("Resolving model: {YOLO_MODEL_NAME}");
    let backend = build_backend(&settings.detector_config(), Some(Box::new(download_progress)));

    let use_case = IngestVideoUseCase::new(
        Box::new(FfmpegReader::new()),
        backend,
        Box::new(JpegCropWriter::new()),
        store,
        settings.ingest_config(),
    );
    let task = IngestTask::spawn(use_case, bytes);

    let mut result = None;
    for event in task.events().iter() {
        match event {
            IngestEvent::Progress { current, total } if show_progress => {
                eprint!("\rScanning frame {current}/{total}");
            }
            IngestEvent::Finished(outcome) => {
                result = Some(outcome);
                break;
            }
            _ => {}
        }
    }
    if show_progress {
        eprintln!();
    }

    let output = match result {
        Some(outcome) => outcome?,
        None => task.wait()?,
    };
    Ok(serde_json::to_value(&output)?)
}

/// Command-line flags override values from the settings file.
fn apply_overrides(mut settings: Settings, args: &GlobalArgs) -> Settings {
    if let Some(dir) = &args.data_dir {
        settings.layout = StoreLayout::under(dir);
    }
    let layout = &mut settings.layout;
    for (target, value) in [
        (&mut layout.temp_root, &args.temp_root),
        (&mut layout.persons_root, &args.persons_root),
        (&mut layout.uploads_dir, &args.uploads_dir),
        (&mut layout.annotations_dir, &args.annotations_dir),
    ] {
        if let Some(path) = value {
            *target = path.clone();
        }
    }
    if args.model.is_some() {
        settings.model_path = args.model.clone();
    }
    if args.model_url.is_some() {
        settings.model_url = args.model_url.clone();
    }
    if let Some(confidence) = args.confidence {
        settings.confidence = confidence;
    }
    if let Some(iou) = args.iou {
        settings.iou = iou;
    }
    if let Some(area) = args.min_box_area {
        settings.min_box_area = area;
    }
    if let Some(n) = args.sample_every {
        settings.sample_every = n;
    }
    if args.no_tracking {
        settings.tracking = false;
    }
    settings
}

/// `{status, detail}` body for a failed command.
fn failure_body(error: &(dyn std::error::Error + 'static)) -> Value {
    let status = error
        .downcast_ref::<SessionError>()
        .map_or(500, SessionError::status_code);
    json!({ "status": status, "detail": error.to_string() })
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading person detection model... {pct}%");
    } else {
        eprint!("\rDownloading person detection model... {downloaded} bytes");
    }
}
