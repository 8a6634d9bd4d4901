//! Debug overlay output.
//!
//! Drawing is best effort: nothing here can fail a frame.

use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};

use image::{GrayImage, Luma};
use imageproc::drawing::{draw_cross_mut, draw_filled_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::module::vision::{Detection, Pose};

pub mod font;

/// Overlay ink.
const INK: Luma<u8> = Luma([255]);

/// Pixels per font cell.
const TEXT_SCALE: u32 = 4;

/// Overlay sink.
pub trait Display: Send + Sync {
    /// Whether overlays should be built at all.
    fn enabled(&self) -> bool {
        true
    }

    /// Outline one tag and label it with its id and range.
    fn tag(&self, image: &mut GrayImage, detection: &Detection, pose: &Pose);

    /// Write text with its lower left corner at `origin`.
    fn text(&self, image: &mut GrayImage, text: &str, origin: (i32, i32));

    /// Hand over a finished overlay.
    fn put(&self, image: GrayImage);
}

/// Display that draws nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

impl Display for NullDisplay {
    fn enabled(&self) -> bool {
        false
    }

    fn tag(&self, _image: &mut GrayImage, _detection: &Detection, _pose: &Pose) {}

    fn text(&self, _image: &mut GrayImage, _text: &str, _origin: (i32, i32)) {}

    fn put(&self, _image: GrayImage) {}
}

/// Writes the latest overlay to a JPEG file from a background thread.
///
/// A frame that arrives while the previous one is still being written is
/// dropped.
pub struct FileDisplay {
    tx: Option<SyncSender<GrayImage>>,
    writer: Option<JoinHandle<()>>,
}

impl FileDisplay {
    /// Starts the writer thread.
    ///
    /// # Arguments
    ///
    /// * `path` - Image file to overwrite with each overlay.
    ///
    pub fn new(path: &str) -> Self {
        let (tx, rx) = sync_channel::<GrayImage>(1);
        let path = path.to_owned();
        let writer = thread::spawn(move || {
            for image in rx {
                if let Err(e) = image.save(&path) {
                    log::warn!("Cannot write overlay {}: {}", path, e);
                }
            }
        });
        Self {
            tx: Some(tx),
            writer: Some(writer),
        }
    }
}

impl Display for FileDisplay {
    fn tag(&self, image: &mut GrayImage, detection: &Detection, pose: &Pose) {
        draw_tag(image, detection, pose);
    }

    fn text(&self, image: &mut GrayImage, text: &str, origin: (i32, i32)) {
        draw_text(image, text, origin);
    }

    fn put(&self, image: GrayImage) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(image) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => log::debug!("Overlay writer busy, frame dropped"),
            Err(TrySendError::Disconnected(_)) => log::warn!("Overlay writer is gone"),
        }
    }
}

impl Drop for FileDisplay {
    fn drop(&mut self) {
        // closing the channel ends the writer after its last frame
        self.tx.take();
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
    }
}

/// Outline, center cross, id and range.
pub fn draw_tag(image: &mut GrayImage, detection: &Detection, pose: &Pose) {
    let corners = detection.corners;
    for i in 0..4 {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        draw_line_segment_mut(
            image,
            (a[0] as f32, a[1] as f32),
            (b[0] as f32, b[1] as f32),
            INK,
        );
    }
    let [cx, cy] = detection.center();
    draw_cross_mut(image, INK, cx.round() as i32, cy.round() as i32);

    let label = format!("{} {:.2}", detection.id, pose.translation.norm());
    draw_text(image, &label, (cx.round() as i32 + 6, cy.round() as i32 - 6));
}

/// Bitmap text, lower left corner at `origin`.
pub fn draw_text(image: &mut GrayImage, text: &str, origin: (i32, i32)) {
    let (x0, y0) = origin;
    let top = y0 - (font::HEIGHT * TEXT_SCALE) as i32;
    let advance = ((font::WIDTH + 1) * TEXT_SCALE) as i32;
    for (n, c) in text.chars().enumerate() {
        let left = x0 + n as i32 * advance;
        for (row, bits) in font::glyph(c).iter().enumerate() {
            for col in 0..font::WIDTH {
                if bits & (0b100 >> col) == 0 {
                    continue;
                }
                let rect = Rect::at(
                    left + (col * TEXT_SCALE) as i32,
                    top + row as i32 * TEXT_SCALE as i32,
                )
                .of_size(TEXT_SCALE, TEXT_SCALE);
                draw_filled_rect_mut(image, rect, INK);
            }
        }
    }
}
