//! Detection overlay: boxes and caption tags drawn onto a copy of a frame.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use image::Rgb;
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use vlab_models::Detection;

use crate::font::{draw_text, text_height, text_width};
use crate::frame::Frame;

/// Box outline thickness in pixels.
pub const BOX_THICKNESS: i32 = 2;
/// Caption glyph scale.
pub const CAPTION_SCALE: u32 = 2;
/// Padding between caption text and tag border.
const TAG_PADDING: i32 = 5;

const CAPTION_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Stable color for a label.
///
/// Derived from a keyless hash, so the same label maps to the same color
/// across calls and across runs of the same build.
pub fn color_for_label(label: &str) -> Rgb<u8> {
    let mut hasher = DefaultHasher::new();
    label.hash(&mut hasher);
    let h = hasher.finish();
    Rgb([
        ((h >> 16) & 0xFF) as u8,
        ((h >> 8) & 0xFF) as u8,
        (h & 0xFF) as u8,
    ])
}

/// Draw every detection onto a copy of `frame`.
///
/// Each detection gets a box outline and a filled caption tag above it with
/// `"{label} {confidence:.2}"` in white. Boxes with no area are skipped;
/// everything is clipped to the frame.
pub fn annotate(frame: &Frame, detections: &[Detection]) -> Frame {
    let mut out = frame.clone();
    let img = out.as_rgb_mut();

    for det in detections {
        let bbox = det.bbox;
        if bbox.width <= 0 || bbox.height <= 0 {
            continue;
        }
        let color = color_for_label(&det.label);

        for inset in 0..BOX_THICKNESS {
            let w = bbox.width - 2 * inset;
            let h = bbox.height - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            draw_hollow_rect_mut(
                img,
                Rect::at(bbox.x + inset, bbox.y + inset).of_size(w as u32, h as u32),
                color,
            );
        }

        let caption = det.caption();
        let tw = text_width(&caption, CAPTION_SCALE) as i32;
        let th = text_height(CAPTION_SCALE) as i32;
        let tag = Rect::at(bbox.x, bbox.y - th - 2 * TAG_PADDING)
            .of_size((tw + 2 * TAG_PADDING) as u32, (th + 2 * TAG_PADDING) as u32);
        draw_filled_rect_mut(img, tag, color);
        draw_text(
            img,
            bbox.x + TAG_PADDING,
            bbox.y - TAG_PADDING - th,
            &caption,
            CAPTION_COLOR,
            CAPTION_SCALE,
        );
    }

    out
}
