use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};

use facesort_core::clustering::cluster_engine::ClusterEngine;
use facesort_core::clustering::domain::embedding_store::EmbeddingStore;
use facesort_core::clustering::domain::observation::Placement;
use facesort_core::clustering::domain::similarity_oracle::MatchRule;
use facesort_core::clustering::infrastructure::json_embedding_store::JsonEmbeddingStore;
use facesort_core::clustering::infrastructure::jsonl_checkpoint::JsonlCheckpoint;
use facesort_core::config::SortConfig;
use facesort_core::detection::domain::face_model::FaceModel;
use facesort_core::detection::infrastructure::model_resolver::{
    self, ModelSpec, ProgressFn, FACE_DETECTOR, FACE_EMBEDDER,
};
use facesort_core::detection::infrastructure::onnx_face_model::OnnxFaceModel;
use facesort_core::imaging::infrastructure::image_file_reader::ImageFileReader;
use facesort_core::imaging::infrastructure::image_file_writer::ImageFileWriter;
use facesort_core::pipeline::batch_cluster_use_case::{BatchClusterUseCase, BatchOutputs};
use facesort_core::pipeline::infrastructure::observation_cache::ObservationCache;
use facesort_core::pipeline::infrastructure::threaded_image_scanner::ThreadedImageScanner;
use facesort_core::pipeline::locate_face_use_case::LocateFaceUseCase;
use facesort_core::pipeline::sort_photos_use_case::SortPhotosUseCase;
use facesort_core::pipeline::status_use_case::StatusUseCase;
use facesort_core::shared::constants::{
    AUDIT_FILE_NAME, CHECKPOINT_FILE_NAME, CLUSTERS_DIR_NAME, LOCK_FILE_NAME,
    OBSERVATION_CACHE_FILE_NAME, STATE_DIR_NAME,
};
use facesort_core::storage::domain::audit_log::AuditLog;
use facesort_core::storage::domain::file_store::Transfer;
use facesort_core::storage::infrastructure::csv_audit_log::CsvAuditLog;
use facesort_core::storage::infrastructure::local_file_store::LocalFileStore;
use facesort_core::storage::infrastructure::run_lock::RunLock;
use facesort_core::storage::infrastructure::source_walker::SourceWalker;

/// Sorts photo archives into one folder per person.
#[derive(Parser)]
#[command(name = "facesort")]
struct Cli {
    /// Settings file (default: <config dir>/FaceSort/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assign every face in INPUT to a group and file the photos under OUTPUT.
    Sort(SortArgs),
    /// Report which existing group each face in one image belongs to.
    Locate(LocateArgs),
    /// One-shot DBSCAN clustering of every face in INPUT.
    Batch(BatchArgs),
    /// Show the persisted groups and checkpoint progress.
    Status(StatusArgs),
    /// Print the effective settings as JSON.
    Config {
        /// Also write them to the default settings file.
        #[arg(long)]
        write: bool,
    },
}

#[derive(Args)]
struct StateArgs {
    /// Run state directory (default: <OUTPUT>/.facesort).
    #[arg(long)]
    state: Option<PathBuf>,
}

#[derive(Args)]
struct RuleArgs {
    /// Match rule: vote or mean-distance.
    #[arg(long)]
    rule: Option<MatchRule>,

    /// Distance threshold of the active rule. The defaults (0.6 vote,
    /// 0.5 mean-distance) suit 128-d dlib-style descriptors; unit-length
    /// ArcFace embeddings usually need around 1.0-1.2.
    #[arg(long)]
    threshold: Option<f64>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,
}

#[derive(Args)]
struct SortArgs {
    /// Directory of photos to sort (searched recursively).
    input: PathBuf,

    /// Directory receiving one folder per group.
    output: PathBuf,

    #[command(flatten)]
    state: StateArgs,

    #[command(flatten)]
    rule: RuleArgs,

    /// Move photos instead of copying them.
    #[arg(long = "move")]
    move_files: bool,

    /// Save a 256x256 thumbnail of every face under <group>/faces.
    #[arg(long)]
    face_crops: bool,

    /// Do not append to <OUTPUT>/face_clusters.csv.
    #[arg(long)]
    no_audit: bool,
}

#[derive(Args)]
struct LocateArgs {
    /// Image to query.
    image: PathBuf,

    /// Output directory of earlier sort runs.
    output: PathBuf,

    #[command(flatten)]
    state: StateArgs,

    #[command(flatten)]
    rule: RuleArgs,
}

#[derive(Args)]
struct BatchArgs {
    /// Directory of photos to cluster (searched recursively).
    input: PathBuf,

    /// Directory receiving one folder of face crops per cluster.
    output: PathBuf,

    #[command(flatten)]
    state: StateArgs,

    /// DBSCAN neighbourhood radius.
    #[arg(long)]
    eps: Option<f64>,

    /// Faces (including itself) a core face needs within eps.
    #[arg(long)]
    min_samples: Option<usize>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Seed the (empty) group store with one group per cluster.
    #[arg(long)]
    seed: bool,

    /// Do not append to <OUTPUT>/face_clusters.csv.
    #[arg(long)]
    no_audit: bool,
}

#[derive(Args)]
struct StatusArgs {
    /// Output directory of earlier sort runs.
    output: PathBuf,

    #[command(flatten)]
    state: StateArgs,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = SortConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Command::Sort(args) => run_sort(args, config),
        Command::Locate(args) => run_locate(args, config),
        Command::Batch(args) => run_batch(args, config),
        Command::Status(args) => run_status(args, config),
        Command::Config { write } => run_config(write, config),
    }
}

fn run_sort(args: SortArgs, mut config: SortConfig) -> Result<(), Box<dyn std::error::Error>> {
    apply_rule_args(&mut config, &args.rule);
    if args.move_files {
        config.transfer = Transfer::Move;
    }
    if args.face_crops {
        config.save_face_crops = true;
    }
    config.validate()?;
    require_dir(&args.input)?;

    let state_dir = state_dir(&args.output, &args.state);
    fs::create_dir_all(&state_dir)?;
    let _lock = RunLock::acquire(&state_dir.join(LOCK_FILE_NAME))?;

    let sources = find_sources(&config, &args.input, &args.output, &state_dir);
    log::info!(
        "Sorting {} images with the {} rule (threshold {})",
        sources.len(),
        config.match_rule,
        config.threshold()
    );

    let model = build_face_model(config.confidence)?;
    let store = JsonEmbeddingStore::open(&state_dir.join(CLUSTERS_DIR_NAME), config.first_group_id())?;
    let checkpoint = JsonlCheckpoint::load_all(&state_dir.join(CHECKPOINT_FILE_NAME));
    let engine = ClusterEngine::new(Box::new(store), Box::new(checkpoint), config.build_oracle());
    let audit_log = open_audit_log(&args.output, args.no_audit)?;

    let progress: Box<dyn Fn(usize, usize) -> bool + Send> = Box::new(|current, total| {
        eprint!("\rSorting image {current}/{total}");
        true
    });

    let output = args.output;
    let mut use_case = SortPhotosUseCase::new(
        Box::new(ThreadedImageScanner::new(Box::new(ImageFileReader::new()), model)),
        engine,
        Box::new(LocalFileStore::new()),
        Box::new(ImageFileWriter::new()),
        audit_log,
        config,
        &output,
        Some(progress),
    );
    let report = use_case.execute(&sources)?;
    eprintln!();
    println!("{report}");
    log::info!("Output written to {}", output.display());
    Ok(())
}

fn run_locate(args: LocateArgs, mut config: SortConfig) -> Result<(), Box<dyn std::error::Error>> {
    apply_rule_args(&mut config, &args.rule);
    config.validate()?;
    if !args.image.is_file() {
        return Err(format!("Image not found: {}", args.image.display()).into());
    }

    let state_dir = state_dir(&args.output, &args.state);
    let clusters_dir = state_dir.join(CLUSTERS_DIR_NAME);
    if !clusters_dir.is_dir() {
        return Err(format!("No groups found under {}", state_dir.display()).into());
    }

    let model = build_face_model(config.confidence)?;
    let store = JsonEmbeddingStore::open(&clusters_dir, config.first_group_id())?;
    let checkpoint = JsonlCheckpoint::open_read_only(&state_dir.join(CHECKPOINT_FILE_NAME));
    let engine = ClusterEngine::new(Box::new(store), Box::new(checkpoint), config.build_oracle());

    let mut use_case = LocateFaceUseCase::new(
        Box::new(ThreadedImageScanner::new(Box::new(ImageFileReader::new()), model)),
        engine,
    );
    let located = use_case.execute(&args.image)?;
    if located.is_empty() {
        println!("No faces found in {}", args.image.display());
        return Ok(());
    }

    for face in located {
        let b = face.bbox;
        match face.group {
            Some(id) => {
                let label = config.destination_label(Placement::Assigned(id));
                let members = LocateFaceUseCase::group_members(&args.output.join(&label));
                println!(
                    "face at ({}, {}, {}x{}): group {label} ({} photos)",
                    b.x,
                    b.y,
                    b.width,
                    b.height,
                    members.len()
                );
            }
            None => println!(
                "face at ({}, {}, {}x{}): no matching group",
                b.x, b.y, b.width, b.height
            ),
        }
    }
    Ok(())
}

fn run_batch(args: BatchArgs, mut config: SortConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(eps) = args.eps {
        config.batch.eps = eps;
    }
    if let Some(min_samples) = args.min_samples {
        config.batch.min_samples = min_samples;
    }
    if let Some(confidence) = args.confidence {
        config.confidence = confidence;
    }
    config.validate()?;
    require_dir(&args.input)?;

    let state_dir = state_dir(&args.output, &args.state);
    fs::create_dir_all(&state_dir)?;
    let _lock = RunLock::acquire(&state_dir.join(LOCK_FILE_NAME))?;

    let sources = find_sources(&config, &args.input, &args.output, &state_dir);
    log::info!(
        "Clustering {} images (eps {}, min samples {})",
        sources.len(),
        config.batch.eps,
        config.batch.min_samples
    );

    let store: Option<Box<dyn EmbeddingStore>> = if args.seed {
        Some(Box::new(JsonEmbeddingStore::open(
            &state_dir.join(CLUSTERS_DIR_NAME),
            config.first_group_id(),
        )?))
    } else {
        None
    };
    let model = build_face_model(config.confidence)?;
    let cache = ObservationCache::load(&state_dir.join(OBSERVATION_CACHE_FILE_NAME));

    let progress: Box<dyn Fn(usize, usize) -> bool + Send> = Box::new(|current, total| {
        eprint!("\rScanning image {current}/{total}");
        true
    });

    let outputs = BatchOutputs {
        image_writer: Box::new(ImageFileWriter::new()),
        file_store: Box::new(LocalFileStore::new()),
        audit_log: open_audit_log(&args.output, args.no_audit)?,
        store,
        output_dir: args.output.clone(),
        unclusterable_dir: config.unclusterable_dir.clone(),
    };
    let mut use_case = BatchClusterUseCase::new(
        Box::new(ThreadedImageScanner::new(Box::new(ImageFileReader::new()), model)),
        Box::new(ImageFileReader::new()),
        Some(cache),
        outputs,
        config.batch.clone(),
        Some(progress),
    );
    let report = use_case.execute(&sources)?;
    eprintln!();
    println!("{report}");
    log::info!("Output written to {}", args.output.display());
    Ok(())
}

fn run_status(args: StatusArgs, config: SortConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state_dir = state_dir(&args.output, &args.state);
    let clusters_dir = state_dir.join(CLUSTERS_DIR_NAME);
    if !clusters_dir.is_dir() {
        println!("No run state under {}", state_dir.display());
        return Ok(());
    }

    let store = JsonEmbeddingStore::open(&clusters_dir, config.first_group_id())?;
    let checkpoint = JsonlCheckpoint::open_read_only(&state_dir.join(CHECKPOINT_FILE_NAME));
    let engine = ClusterEngine::new(Box::new(store), Box::new(checkpoint), config.build_oracle());
    let report = StatusUseCase::new(engine).execute();

    for group in &report.groups {
        let label = config.destination_label(Placement::Assigned(group.id));
        match &group.references {
            Ok(count) => println!("{label:>8}  {count} faces"),
            Err(e) => println!("{label:>8}  unreadable: {e}"),
        }
    }
    println!(
        "{} groups ({} unreadable), {} faces, {} completed images",
        report.groups.len(),
        report.unreadable_groups(),
        report.total_references(),
        report.completed_images
    );
    Ok(())
}

fn run_config(write: bool, config: SortConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    if write {
        let path = SortConfig::default_path().ok_or("could not determine config directory")?;
        config.save(&path)?;
        log::info!("Settings written to {}", path.display());
    }
    Ok(())
}

fn apply_rule_args(config: &mut SortConfig, args: &RuleArgs) {
    if let Some(rule) = args.rule {
        config.match_rule = rule;
    }
    if let Some(threshold) = args.threshold {
        config.set_threshold(threshold);
    }
    if let Some(confidence) = args.confidence {
        config.confidence = confidence;
    }
}

fn build_face_model(confidence: f64) -> Result<Box<dyn FaceModel>, Box<dyn std::error::Error>> {
    let detector_path = resolve_model(FACE_DETECTOR, "face detection")?;
    let embedder_path = resolve_model(FACE_EMBEDDER, "face embedding")?;
    Ok(Box::new(OnnxFaceModel::new(
        &detector_path,
        &embedder_path,
        confidence,
    )?))
}

fn resolve_model(
    model: ModelSpec,
    label: &'static str,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {}", model.name);
    let path = model_resolver::resolve(model, None, Some(download_progress(label)))?;
    eprintln!();
    Ok(path)
}

fn download_progress(label: &'static str) -> ProgressFn {
    Box::new(move |downloaded, total| {
        if total > 0 {
            let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
            eprint!("\rDownloading {label} model... {pct}%");
        } else {
            eprint!("\rDownloading {label} model... {downloaded} bytes");
        }
    })
}

fn open_audit_log(
    output: &Path,
    disabled: bool,
) -> Result<Option<Box<dyn AuditLog>>, Box<dyn std::error::Error>> {
    if disabled {
        return Ok(None);
    }
    fs::create_dir_all(output)?;
    Ok(Some(Box::new(CsvAuditLog::open(&output.join(AUDIT_FILE_NAME))?)))
}

fn find_sources(config: &SortConfig, input: &Path, output: &Path, state_dir: &Path) -> Vec<PathBuf> {
    SourceWalker::new(&config.extensions)
        .exclude(output)
        .exclude(state_dir)
        .walk(input)
}

fn state_dir(output: &Path, args: &StateArgs) -> PathBuf {
    args.state
        .clone()
        .unwrap_or_else(|| output.join(STATE_DIR_NAME))
}

fn require_dir(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(format!("Input directory not found: {}", path.display()).into())
    }
}
