//! Detection overlays drawn onto a copy of the scanned image.
//!
//! Corners are green dots joined by a green outline, the center is a red dot.
//! Text labels (ID, family, distance, margin, position, rotation) need a
//! TrueType font; without one only the geometry is drawn.

use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_text_mut};
use tagscan_core::LumaImage;

use crate::PosedDetection;

pub const CORNER_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const CENTER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const DISTANCE_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const POSE_COLOR: Rgb<u8> = Rgb([0, 255, 255]);

const CORNER_RADIUS: i32 = 4;
const CENTER_RADIUS: i32 = 6;
const LABEL_LINE: i32 = 15;

#[derive(thiserror::Error, Debug)]
pub enum AnnotateError {
    #[error("cannot read font {}: {source}", path.display())]
    FontIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid font {}", path.display())]
    InvalidFont { path: PathBuf },
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// TrueType font used for labels.
pub struct LabelFont {
    font: FontVec,
    scale: PxScale,
}

impl LabelFont {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AnnotateError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| AnnotateError::FontIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(bytes).ok_or_else(|| AnnotateError::InvalidFont {
            path: path.to_path_buf(),
        })
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        let font = FontVec::try_from_vec(bytes).ok()?;
        Some(Self {
            font,
            scale: PxScale::from(13.0),
        })
    }
}

impl std::fmt::Debug for LabelFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelFont")
            .field("scale", &self.scale.y)
            .finish()
    }
}

/// One line of text placed relative to the tag center.
#[derive(Clone, Debug, PartialEq)]
pub struct Label {
    pub text: String,
    pub offset: (i32, i32),
    pub color: Rgb<u8>,
}

/// Label lines for one tag; pose lines only when a pose is known.
pub fn tag_labels(tag: &PosedDetection) -> Vec<Label> {
    let record = &tag.record;
    let top = -4 * LABEL_LINE;
    let mut labels = vec![Label {
        text: format!("ID: {}", record.id),
        offset: (-30, top),
        color: TEXT_COLOR,
    }];
    labels.push(Label {
        text: format!("Family: {}", record.family),
        offset: (-50, top + LABEL_LINE),
        color: TEXT_COLOR,
    });
    if let Some(pose) = &tag.pose {
        labels.push(Label {
            text: format!("Distance: {:.2}m", pose.distance),
            offset: (-50, top + 2 * LABEL_LINE),
            color: DISTANCE_COLOR,
        });
    }
    labels.push(Label {
        text: format!("Margin: {:.1}", record.decision_margin),
        offset: (-50, top + 3 * LABEL_LINE),
        color: TEXT_COLOR,
    });
    if let Some(pose) = &tag.pose {
        let t = &pose.translation;
        let e = &pose.euler;
        labels.push(Label {
            text: format!("Position: ({:.2}, {:.2}, {:.2})", t.x, t.y, t.z),
            offset: (-70, top + 4 * LABEL_LINE),
            color: POSE_COLOR,
        });
        labels.push(Label {
            text: format!(
                "Rotation: ({:.1}°, {:.1}°, {:.1}°)",
                e.roll, e.pitch, e.yaw
            ),
            offset: (-70, top + 5 * LABEL_LINE),
            color: POSE_COLOR,
        });
    }
    labels
}

/// Gray image expanded to RGB.
pub fn to_rgb(image: &LumaImage) -> RgbImage {
    RgbImage::from_fn(image.width() as u32, image.height() as u32, |x, y| {
        let v = image.row(y as usize)[x as usize];
        Rgb([v, v, v])
    })
}

fn draw_outline(canvas: &mut RgbImage, corners: &[[f64; 2]; 4]) {
    for j in 0..4 {
        let [x1, y1] = corners[j];
        let [x2, y2] = corners[(j + 1) % 4];
        let (dx, dy) = (x2 - x1, y2 - y1);
        let len = (dx * dx + dy * dy).sqrt();
        // Two parallel strokes half a pixel either side make a 2 px line.
        let (nx, ny) = if len > 0.0 {
            (-dy / len * 0.5, dx / len * 0.5)
        } else {
            (0.0, 0.0)
        };
        for s in [-1.0, 1.0] {
            draw_line_segment_mut(
                canvas,
                ((x1 + s * nx) as f32, (y1 + s * ny) as f32),
                ((x2 + s * nx) as f32, (y2 + s * ny) as f32),
                CORNER_COLOR,
            );
        }
    }
}

/// Draw every tag onto `canvas` in place.
pub fn annotate_mut(canvas: &mut RgbImage, tags: &[PosedDetection], font: Option<&LabelFont>) {
    for tag in tags {
        let record = &tag.record;
        for [x, y] in record.corners {
            draw_filled_circle_mut(canvas, (x as i32, y as i32), CORNER_RADIUS, CORNER_COLOR);
        }
        draw_outline(canvas, &record.corners);

        let center = (record.center[0] as i32, record.center[1] as i32);
        draw_filled_circle_mut(canvas, center, CENTER_RADIUS, CENTER_COLOR);

        if let Some(font) = font {
            for label in tag_labels(tag) {
                draw_text_mut(
                    canvas,
                    label.color,
                    center.0 + label.offset.0,
                    center.1 + label.offset.1,
                    font.scale,
                    &font.font,
                    &label.text,
                );
            }
        }
    }
}

/// Annotated RGB copy of `image`.
pub fn annotate(image: &LumaImage, tags: &[PosedDetection], font: Option<&LabelFont>) -> RgbImage {
    let mut canvas = to_rgb(image);
    annotate_mut(&mut canvas, tags, font);
    log::debug!("annotated {} tags", tags.len());
    canvas
}
