use std::path::PathBuf;

use crate::detection::domain::face_model::FaceModel;
use crate::imaging::domain::image_reader::ImageReader;
use crate::pipeline::image_scanner::{scan_image, ImageScan, ImageScanner};

const DEFAULT_CHANNEL_CAPACITY: usize = 4;

/// Scans images on a dedicated thread while the caller consumes results.
///
/// Layout: `scan [read → detect → embed] → caller`
///
/// Decoding and inference for the next images overlap with the caller's
/// storage work. Results arrive in source order over a bounded channel, so
/// at most `channel_capacity` decoded frames are held in memory.
pub struct ThreadedImageScanner {
    reader: Box<dyn ImageReader>,
    model: Box<dyn FaceModel>,
    channel_capacity: usize,
}

impl ThreadedImageScanner {
    pub fn new(reader: Box<dyn ImageReader>, model: Box<dyn FaceModel>) -> Self {
        Self {
            reader,
            model,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

impl ImageScanner for ThreadedImageScanner {
    fn scan(
        &mut self,
        sources: &[PathBuf],
        on_scan: &mut dyn FnMut(ImageScan) -> bool,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let (scan_tx, scan_rx) = crossbeam_channel::bounded::<ImageScan>(self.channel_capacity);
        let reader = &mut self.reader;
        let model = &mut self.model;

        let joined = std::thread::scope(|scope| {
            let handle = scope.spawn(move || {
                for source in sources {
                    let scan = scan_image(reader.as_ref(), model.as_mut(), source);
                    if scan_tx.send(scan).is_err() {
                        // Consumer stopped early.
                        break;
                    }
                }
            });

            for scan in scan_rx.iter() {
                if !on_scan(scan) {
                    break;
                }
            }
            // Unblocks a producer waiting on a full channel.
            drop(scan_rx);
            handle.join()
        });

        joined.map_err(|_| "Scan thread panicked".into())
    }
}
