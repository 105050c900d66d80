use std::path::{Path, PathBuf};

use crate::clustering::domain::embedding_store::EmbeddingStore;
use crate::clustering::domain::observation::Observation;
use crate::clustering::infrastructure::dbscan::Dbscan;
use crate::config::BatchConfig;
use crate::imaging::domain::image_reader::ImageReader;
use crate::imaging::domain::image_writer::ImageWriter;
use crate::pipeline::image_scanner::{ImageScan, ImageScanner, ScanOutcome};
use crate::pipeline::infrastructure::observation_cache::ObservationCache;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::FACE_CROP_SIZE;
use crate::shared::embedding::Embedding;
use crate::shared::frame::Frame;
use crate::storage::domain::audit_log::{AuditLog, AuditRow};
use crate::storage::domain::file_store::{FileStore, Transfer};

/// Audit label for observations DBSCAN left unclustered.
pub const NOISE_LABEL: &str = "noise";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub images_seen: usize,
    /// Taken from the observation cache instead of being scanned.
    pub images_cached: usize,
    pub images_failed: usize,
    pub faces: usize,
    pub clusters: usize,
    pub noise: usize,
    pub unclusterable_images: usize,
    pub crops_written: usize,
    pub groups_seeded: usize,
}

impl std::fmt::Display for BatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} images ({} cached, {} unreadable), {} faces in {} clusters, {} noise, \
             {} without faces",
            self.images_seen,
            self.images_cached,
            self.images_failed,
            self.faces,
            self.clusters,
            self.noise,
            self.unclusterable_images
        )?;
        if self.groups_seeded > 0 {
            write!(f, ", {} groups seeded", self.groups_seeded)?;
        }
        Ok(())
    }
}

/// Everything batch clustering writes besides the scan results.
pub struct BatchOutputs {
    pub image_writer: Box<dyn ImageWriter>,
    pub file_store: Box<dyn FileStore>,
    pub audit_log: Option<Box<dyn AuditLog>>,
    /// Seeded with one group per cluster. Must be empty.
    pub store: Option<Box<dyn EmbeddingStore>>,
    pub output_dir: PathBuf,
    pub unclusterable_dir: String,
}

/// One-shot DBSCAN over every face in the input.
///
/// Scanning is the expensive part, so every scanned image is sealed in the
/// observation cache; a rerun after an interruption only scans what is left.
/// Clustering and output always run over the full set.
pub struct BatchClusterUseCase {
    scanner: Box<dyn ImageScanner>,
    reader: Box<dyn ImageReader>,
    cache: Option<ObservationCache>,
    outputs: BatchOutputs,
    config: BatchConfig,
    on_progress: Option<Box<dyn Fn(usize, usize) -> bool + Send>>,
}

impl BatchClusterUseCase {
    pub fn new(
        scanner: Box<dyn ImageScanner>,
        reader: Box<dyn ImageReader>,
        cache: Option<ObservationCache>,
        outputs: BatchOutputs,
        config: BatchConfig,
        on_progress: Option<Box<dyn Fn(usize, usize) -> bool + Send>>,
    ) -> Self {
        Self {
            scanner,
            reader,
            cache,
            outputs,
            config,
            on_progress,
        }
    }

    pub fn execute(&mut self, sources: &[PathBuf]) -> Result<BatchReport, Box<dyn std::error::Error>> {
        if let Some(store) = &self.outputs.store {
            if !store.list_groups().is_empty() {
                return Err("the cluster store already holds groups; \
                            batch seeding needs an empty store"
                    .into());
            }
        }

        let total = sources.len();
        let mut report = BatchReport {
            images_seen: total,
            ..BatchReport::default()
        };

        let (scanned, cancelled) = self.scan_pending(sources, &mut report)?;
        if cancelled {
            return Err("Cancelled".into());
        }

        let mut observations = Vec::new();
        for source in sources {
            let faces = match self.cache.as_ref().and_then(|c| c.faces(source)) {
                Some(faces) => faces,
                None => match scanned.iter().find(|(s, _)| s == source) {
                    Some((_, faces)) => faces.as_slice(),
                    None => continue,
                },
            };
            if faces.is_empty() {
                report.unclusterable_images += 1;
                self.place_unclusterable(source);
            }
            observations.extend(faces.iter().map(|(bbox, embedding)| Observation {
                source: source.clone(),
                bbox: *bbox,
                embedding: embedding.clone(),
            }));
        }
        report.faces = observations.len();

        let embeddings: Vec<Embedding> = observations.iter().map(|o| o.embedding.clone()).collect();
        let labels = Dbscan::new(self.config.eps, self.config.min_samples).fit(&embeddings);
        report.clusters = labels.iter().flatten().max().map_or(0, |max| max + 1);
        report.noise = labels.iter().filter(|l| l.is_none()).count();
        log::info!(
            "DBSCAN found {} clusters and {} noise faces among {} faces",
            report.clusters,
            report.noise,
            report.faces
        );

        self.write_outputs(&observations, &labels, &mut report);
        self.seed_store(&observations, &labels, &mut report)?;

        log::info!("Batch finished: {report}");
        Ok(report)
    }

    /// Scans images the cache does not hold yet. Returns the faces of each
    /// scanned image that did not go into the cache.
    fn scan_pending(
        &mut self,
        sources: &[PathBuf],
        report: &mut BatchReport,
    ) -> Result<(Vec<(PathBuf, Vec<(BoundingBox, Embedding)>)>, bool), Box<dyn std::error::Error>>
    {
        let total = sources.len();
        let pending: Vec<PathBuf> = sources
            .iter()
            .filter(|s| !self.cache.as_ref().is_some_and(|c| c.contains(s)))
            .cloned()
            .collect();
        report.images_cached = total - pending.len();
        if report.images_cached > 0 {
            log::info!("Reusing {} cached scans", report.images_cached);
        }

        let mut scanned = Vec::new();
        let mut done = report.images_cached;
        let mut cancelled = false;
        let cache = &mut self.cache;
        let on_progress = &self.on_progress;
        self.scanner.scan(&pending, &mut |scan| {
            let ImageScan { source, outcome } = scan;
            let (faces, complete) = match outcome {
                ScanOutcome::Unreadable(e) => {
                    log::warn!("Skipping unreadable image {}: {e}", source.display());
                    report.images_failed += 1;
                    (None, false)
                }
                ScanOutcome::NoFaces | ScanOutcome::NoEmbeddings { .. } => {
                    (Some(Vec::new()), true)
                }
                ScanOutcome::Faces { faces, dropped, .. } => (Some(faces), dropped == 0),
            };
            if let Some(faces) = faces {
                match cache.as_mut() {
                    // A partial scan is clustered now but rescanned next run.
                    Some(cache) if complete => {
                        if let Err(e) = cache.record(&source, &faces) {
                            log::warn!("Failed to cache scan of {}: {e}", source.display());
                            scanned.push((source, faces));
                        }
                    }
                    _ => scanned.push((source, faces)),
                }
            }
            done += 1;
            if let Some(callback) = on_progress {
                if !callback(done, total) {
                    cancelled = true;
                    return false;
                }
            }
            true
        })?;
        Ok((scanned, cancelled))
    }

    fn place_unclusterable(&self, source: &Path) {
        let dest_dir = self.outputs.output_dir.join(&self.outputs.unclusterable_dir);
        if let Err(e) = self
            .outputs
            .file_store
            .copy_or_move(source, &dest_dir, Transfer::Copy)
        {
            log::warn!(
                "Failed to copy {} to {}: {e}",
                source.display(),
                dest_dir.display()
            );
        }
    }

    /// Writes crops and audit rows in observation order, decoding each
    /// source image once.
    fn write_outputs(
        &mut self,
        observations: &[Observation],
        labels: &[Option<usize>],
        report: &mut BatchReport,
    ) {
        let mut member_counts = vec![0usize; report.clusters];
        let mut current: Option<(&Path, Option<Frame>)> = None;

        for (observation, label) in observations.iter().zip(labels) {
            let group = match label {
                Some(k) => self.cluster_dir_name(*k),
                None => NOISE_LABEL.to_string(),
            };
            self.audit(observation, group.clone());

            let Some(k) = *label else {
                continue;
            };
            let index = member_counts[k];
            member_counts[k] += 1;

            if current.as_ref().map(|(p, _)| *p) != Some(observation.source.as_path()) {
                let frame = match self.reader.read(&observation.source) {
                    Ok(frame) => Some(frame),
                    Err(e) => {
                        log::warn!(
                            "Failed to re-read {} for face crops: {e}",
                            observation.source.display()
                        );
                        None
                    }
                };
                current = Some((observation.source.as_path(), frame));
            }
            let Some((_, Some(frame))) = current.as_ref() else {
                continue;
            };
            let Some(crop) = frame.square_crop(&observation.bbox) else {
                continue;
            };
            let path = self
                .outputs
                .output_dir
                .join(&group)
                .join(format!("{group}_{index}.jpg"));
            let size = Some((FACE_CROP_SIZE, FACE_CROP_SIZE));
            match self.outputs.image_writer.write(&path, &crop, size) {
                Ok(()) => report.crops_written += 1,
                Err(e) => log::warn!("Failed to save face crop {}: {e}", path.display()),
            }
        }
    }

    fn audit(&mut self, observation: &Observation, group: String) {
        if let Some(log) = self.outputs.audit_log.as_mut() {
            let row = AuditRow {
                image_path: observation.source.clone(),
                bbox: Some(observation.bbox),
                group,
            };
            if let Err(e) = log.record(&row) {
                log::warn!(
                    "Failed to write audit row for {}: {e}",
                    observation.source.display()
                );
            }
        }
    }

    /// Creates one store group per cluster, in label order.
    fn seed_store(
        &mut self,
        observations: &[Observation],
        labels: &[Option<usize>],
        report: &mut BatchReport,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let Some(store) = self.outputs.store.as_mut() else {
            return Ok(());
        };
        for k in 0..report.clusters {
            let mut members = observations
                .iter()
                .zip(labels)
                .filter(|(_, label)| **label == Some(k))
                .map(|(o, _)| o.embedding.clone());
            let Some(first) = members.next() else {
                continue;
            };
            let id = store.create_group(first)?;
            for embedding in members {
                store.append(id, embedding)?;
            }
            log::info!("Seeded group {id} from cluster {k}");
            report.groups_seeded += 1;
        }
        Ok(())
    }

    fn cluster_dir_name(&self, k: usize) -> String {
        format!("{}{k}", self.config.dir_prefix)
    }
}
