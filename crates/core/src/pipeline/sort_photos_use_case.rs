use std::path::{Path, PathBuf};

use crate::clustering::cluster_engine::{Assignment, AssignmentKind, ClusterEngine};
use crate::clustering::domain::observation::{Observation, Placement, UnclusterableReason};
use crate::config::SortConfig;
use crate::imaging::domain::image_writer::ImageWriter;
use crate::pipeline::image_scanner::{ImageScan, ImageScanner, ScanOutcome};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::{FACE_CROPS_DIR_NAME, FACE_CROP_SIZE};
use crate::shared::frame::Frame;
use crate::storage::domain::audit_log::{AuditLog, AuditRow};
use crate::storage::domain::file_store::{FileStore, Transfer};

/// Counters for one sort run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SortReport {
    pub images_seen: usize,
    /// Already complete in the checkpoint; not scanned.
    pub images_skipped: usize,
    /// Could not be decoded.
    pub images_failed: usize,
    pub faces_assigned: usize,
    pub faces_replayed: usize,
    /// Detected but not embedded; their images are left for a rerun.
    pub faces_unembedded: usize,
    pub groups_created: usize,
    pub unclusterable_images: usize,
    pub placement_failures: usize,
    pub storage_failures: usize,
}

impl std::fmt::Display for SortReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} images ({} skipped, {} unreadable), {} faces assigned, {} replayed, \
             {} new groups, {} without faces",
            self.images_seen,
            self.images_skipped,
            self.images_failed,
            self.faces_assigned,
            self.faces_replayed,
            self.groups_created,
            self.unclusterable_images
        )?;
        if self.faces_unembedded > 0 {
            write!(f, ", {} faces not embedded", self.faces_unembedded)?;
        }
        if self.placement_failures + self.storage_failures > 0 {
            write!(
                f,
                ", {} placement and {} storage failures",
                self.placement_failures, self.storage_failures
            )?;
        }
        Ok(())
    }
}

/// Everything that happens to a scanned image after scanning.
struct ImageSorter {
    engine: ClusterEngine,
    file_store: Box<dyn FileStore>,
    image_writer: Box<dyn ImageWriter>,
    audit_log: Option<Box<dyn AuditLog>>,
    config: SortConfig,
    output_dir: PathBuf,
}

/// Incremental photo sort: scan → assign → place → checkpoint.
///
/// Images already marked complete are skipped before scanning. Assignment
/// runs on the calling thread in source order; scanning may overlap with it.
/// A failure on one image is counted and logged and the run continues.
pub struct SortPhotosUseCase {
    scanner: Box<dyn ImageScanner>,
    sorter: ImageSorter,
    on_progress: Option<Box<dyn Fn(usize, usize) -> bool + Send>>,
}

impl SortPhotosUseCase {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scanner: Box<dyn ImageScanner>,
        engine: ClusterEngine,
        file_store: Box<dyn FileStore>,
        image_writer: Box<dyn ImageWriter>,
        audit_log: Option<Box<dyn AuditLog>>,
        config: SortConfig,
        output_dir: &Path,
        on_progress: Option<Box<dyn Fn(usize, usize) -> bool + Send>>,
    ) -> Self {
        Self {
            scanner,
            sorter: ImageSorter {
                engine,
                file_store,
                image_writer,
                audit_log,
                config,
                output_dir: output_dir.to_path_buf(),
            },
            on_progress,
        }
    }

    pub fn execute(&mut self, sources: &[PathBuf]) -> Result<SortReport, Box<dyn std::error::Error>> {
        let total = sources.len();
        let mut report = SortReport {
            images_seen: total,
            ..SortReport::default()
        };

        let pending: Vec<PathBuf> = sources
            .iter()
            .filter(|s| !self.sorter.engine.is_image_complete(s))
            .cloned()
            .collect();
        report.images_skipped = total - pending.len();
        if report.images_skipped > 0 {
            log::info!("Skipping {} already sorted images", report.images_skipped);
        }

        let mut done = report.images_skipped;
        let mut cancelled = false;
        let sorter = &mut self.sorter;
        let on_progress = &self.on_progress;
        self.scanner.scan(&pending, &mut |scan| {
            sorter.handle(scan, &mut report);
            done += 1;
            if let Some(callback) = on_progress {
                if !callback(done, total) {
                    cancelled = true;
                    return false;
                }
            }
            true
        })?;

        if let Err(e) = self.sorter.engine.flush() {
            log::warn!("Failed to compact checkpoint: {e}");
        }
        log::info!("Sort finished: {report}");

        if cancelled {
            return Err("Cancelled".into());
        }
        Ok(report)
    }
}

impl ImageSorter {
    fn handle(&mut self, scan: ImageScan, report: &mut SortReport) {
        let ImageScan { source, outcome } = scan;
        match outcome {
            ScanOutcome::Unreadable(e) => {
                log::warn!("Skipping unreadable image {}: {e}", source.display());
                report.images_failed += 1;
            }
            ScanOutcome::NoFaces => {
                self.handle_unclusterable(&source, UnclusterableReason::DetectionEmpty, report)
            }
            ScanOutcome::NoEmbeddings { .. } => {
                self.handle_unclusterable(&source, UnclusterableReason::EmbeddingEmpty, report)
            }
            ScanOutcome::Faces {
                frame,
                faces,
                dropped,
            } => {
                let mut destinations: Vec<Placement> = Vec::new();
                let mut all_assigned = dropped == 0;
                if dropped > 0 {
                    log::warn!(
                        "{}: {dropped} faces not embedded, leaving image incomplete",
                        source.display()
                    );
                    report.faces_unembedded += dropped;
                }
                for (bbox, embedding) in faces {
                    let observation = Observation {
                        source: source.clone(),
                        bbox,
                        embedding,
                    };
                    match self.engine.assign(observation) {
                        Ok(assignment) => {
                            self.count(assignment, report);
                            self.note_assignment(&source, &frame, bbox, assignment);
                            if !destinations.contains(&assignment.placement) {
                                destinations.push(assignment.placement);
                            }
                        }
                        Err(e) => {
                            log::error!("Could not assign {} {bbox}: {e}", source.display());
                            report.storage_failures += 1;
                            all_assigned = false;
                        }
                    }
                }
                let placed = self.place(&source, &destinations, all_assigned, report);
                if all_assigned && placed {
                    self.complete(&source, report);
                }
            }
        }
    }

    fn handle_unclusterable(
        &mut self,
        source: &Path,
        reason: UnclusterableReason,
        report: &mut SortReport,
    ) {
        match self.engine.mark_unclusterable(source, reason) {
            Ok(assignment) => {
                report.unclusterable_images += 1;
                if assignment.kind != AssignmentKind::Replayed {
                    self.audit(source, None, assignment.placement);
                }
                if self.place(source, &[assignment.placement], true, report) {
                    self.complete(source, report);
                }
            }
            Err(e) => {
                log::error!("Could not record {}: {e}", source.display());
                report.storage_failures += 1;
            }
        }
    }

    fn count(&self, assignment: Assignment, report: &mut SortReport) {
        match assignment.kind {
            AssignmentKind::Replayed => report.faces_replayed += 1,
            AssignmentKind::Matched => report.faces_assigned += 1,
            AssignmentKind::Created => {
                report.faces_assigned += 1;
                report.groups_created += 1;
            }
            AssignmentKind::Unclusterable => {}
        }
    }

    fn note_assignment(
        &mut self,
        source: &Path,
        frame: &Frame,
        bbox: BoundingBox,
        assignment: Assignment,
    ) {
        if assignment.kind != AssignmentKind::Replayed {
            self.audit(source, Some(bbox), assignment.placement);
        }
        if self.config.save_face_crops {
            self.save_crop(source, frame, bbox, assignment.placement);
        }
    }

    fn audit(&mut self, source: &Path, bbox: Option<BoundingBox>, placement: Placement) {
        let group = self.config.destination_label(placement);
        if let Some(log) = self.audit_log.as_mut() {
            let row = AuditRow {
                image_path: source.to_path_buf(),
                bbox,
                group,
            };
            if let Err(e) = log.record(&row) {
                log::warn!("Failed to write audit row for {}: {e}", source.display());
            }
        }
    }

    /// Writes a thumbnail of the face unless one already exists.
    fn save_crop(&self, source: &Path, frame: &Frame, bbox: BoundingBox, placement: Placement) {
        let path = self
            .destination_dir(placement)
            .join(FACE_CROPS_DIR_NAME)
            .join(crop_file_name(source, &bbox));
        if path.exists() {
            return;
        }
        let Some(crop) = frame.square_crop(&bbox) else {
            return;
        };
        let size = Some((FACE_CROP_SIZE, FACE_CROP_SIZE));
        if let Err(e) = self.image_writer.write(&path, &crop, size) {
            log::warn!("Failed to save face crop {}: {e}", path.display());
        }
    }

    /// Places the source once per destination.
    ///
    /// In move mode only the last placement moves, and only when every face
    /// was assigned; otherwise the source must stay for the retry.
    fn place(
        &self,
        source: &Path,
        destinations: &[Placement],
        all_assigned: bool,
        report: &mut SortReport,
    ) -> bool {
        let mut ok = true;
        for (i, placement) in destinations.iter().enumerate() {
            let last = i + 1 == destinations.len();
            let transfer = match self.config.transfer {
                Transfer::Move if last && all_assigned && ok => Transfer::Move,
                _ => Transfer::Copy,
            };
            let dest_dir = self.destination_dir(*placement);
            match self.file_store.copy_or_move(source, &dest_dir, transfer) {
                Ok(dest) => log::debug!("{} -> {}", source.display(), dest.display()),
                Err(e) => {
                    log::warn!(
                        "Failed to {transfer} {} to {}: {e}",
                        source.display(),
                        dest_dir.display()
                    );
                    report.placement_failures += 1;
                    ok = false;
                }
            }
        }
        ok
    }

    fn complete(&mut self, source: &Path, report: &mut SortReport) {
        if let Err(e) = self.engine.complete_image(source) {
            log::error!("Could not mark {} complete: {e}", source.display());
            report.storage_failures += 1;
        }
    }

    fn destination_dir(&self, placement: Placement) -> PathBuf {
        self.output_dir
            .join(self.config.destination_label(placement))
    }
}

/// `<stem>_<tag>_<x>_<y>.jpg` for the face at `bbox`.
///
/// The tag is derived from the full source path so that same-named photos
/// from different folders never share a crop.
fn crop_file_name(source: &Path, bbox: &BoundingBox) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "face".to_string());
    format!("{stem}_{:08x}_{}_{}.jpg", path_tag(source), bbox.x, bbox.y)
}

/// 32-bit FNV-1a of the path. Stable across runs and toolchains.
fn path_tag(source: &Path) -> u32 {
    source
        .to_string_lossy()
        .bytes()
        .fold(0x811c_9dc5, |hash: u32, byte| {
            (hash ^ u32::from(byte)).wrapping_mul(0x0100_0193)
        })
}
