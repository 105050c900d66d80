use ndarray::ArrayView3;

use crate::shared::bounding_box::BoundingBox;

/// A decoded image: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at I/O boundaries only; the domain layer
/// treats pixel data as opaque.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Extracts a square crop centered on the box, clamped to frame bounds.
    ///
    /// Returns `None` when the clamped crop is empty.
    pub fn square_crop(&self, bbox: &BoundingBox) -> Option<Frame> {
        let fw = self.width as i32;
        let fh = self.height as i32;

        let (cx, cy) = bbox.center();
        let half = bbox.width.max(bbox.height) / 2;

        let x1 = (cx - half).clamp(0, fw) as usize;
        let y1 = (cy - half).clamp(0, fh) as usize;
        let x2 = (cx + half).clamp(0, fw) as usize;
        let y2 = (cy + half).clamp(0, fh) as usize;
        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        let crop_w = x2 - x1;
        let crop_h = y2 - y1;
        let channels = self.channels as usize;

        let src = self.as_ndarray();
        let mut data = Vec::with_capacity(crop_w * crop_h * channels);
        for row in y1..y2 {
            for col in x1..x2 {
                for c in 0..channels {
                    data.push(src[[row, col, c]]);
                }
            }
        }

        Some(Frame::new(data, crop_w as u32, crop_h as u32, channels as u8))
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
