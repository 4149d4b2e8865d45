//! Detection overlay.
//!
//! Draws each detection's outline and a `Helmet 0.87` label onto a frame.
//! Labels use a built-in 5x7 bitmap face scaled 2x, so rendering needs no
//! font files and is identical on every host.

use image::{ImageBuffer, Rgb};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::detect::DetectionBox;
use crate::frame::Frame;

/// Overlay colour (yellow).
pub const BOX_COLOR: [u8; 3] = [255, 255, 0];

/// Outline thickness in pixels.
const BOX_THICKNESS: u32 = 2;

/// Label baseline sits this far above the box top...
const LABEL_OFFSET: i32 = 10;
/// ...but never above this row, so the label stays inside the frame.
const LABEL_MIN_BASELINE: i32 = 20;

const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;
const GLYPH_SCALE: i32 = 2;
const GLYPH_ADVANCE: i32 = (GLYPH_WIDTH + 1) * GLYPH_SCALE;

/// RGB view drawing straight into a frame's buffer.
type Overlay<'a> = ImageBuffer<Rgb<u8>, &'a mut [u8]>;

/// Label text for one detection.
pub fn label_for(detection: &DetectionBox) -> String {
    format!("Helmet {:.2}", detection.confidence)
}

/// Draw `detections` onto `frame`. Dimensions are unchanged and the
/// detections are only read.
pub fn annotate(mut frame: Frame, detections: &[DetectionBox]) -> Frame {
    if detections.is_empty() || frame.is_empty() {
        return frame;
    }
    let (width, height) = (frame.width(), frame.height());
    if let Some(mut canvas) = Overlay::from_raw(width, height, frame.pixels_mut()) {
        for detection in detections {
            let x1 = detection.x1 as i32;
            let y1 = detection.y1 as i32;
            let x2 = detection.x2 as i32;
            let y2 = detection.y2 as i32;

            draw_outline(&mut canvas, x1, y1, x2, y2);

            let baseline = (y1 - LABEL_OFFSET).max(LABEL_MIN_BASELINE);
            draw_label(&mut canvas, &label_for(detection), x1, baseline);
        }
    }
    frame
}

fn draw_outline(canvas: &mut Overlay<'_>, x1: i32, y1: i32, x2: i32, y2: i32) {
    let (w, h) = (canvas.width() as i32, canvas.height() as i32);
    if x2 < 0 || y2 < 0 || x1 >= w || y1 >= h || x2 < x1 || y2 < y1 {
        return;
    }
    let x1 = x1.clamp(0, w - 1);
    let y1 = y1.clamp(0, h - 1);
    let x2 = x2.clamp(0, w - 1);
    let y2 = y2.clamp(0, h - 1);

    for inset in 0..BOX_THICKNESS as i32 {
        let rw = x2 - x1 + 1 - 2 * inset;
        let rh = y2 - y1 + 1 - 2 * inset;
        if rw <= 0 || rh <= 0 {
            break;
        }
        let rect = Rect::at(x1 + inset, y1 + inset).of_size(rw as u32, rh as u32);
        draw_hollow_rect_mut(canvas, rect, Rgb(BOX_COLOR));
    }
}

fn draw_label(canvas: &mut Overlay<'_>, text: &str, left: i32, baseline: i32) {
    let top = baseline - GLYPH_HEIGHT * GLYPH_SCALE;
    let mut x = left;
    for ch in text.chars() {
        if let Some(rows) = glyph(ch) {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if bits >> (GLYPH_WIDTH - 1 - col) & 1 == 1 {
                        fill_cell(
                            canvas,
                            x + col * GLYPH_SCALE,
                            top + row as i32 * GLYPH_SCALE,
                        );
                    }
                }
            }
        }
        x += GLYPH_ADVANCE;
        if x >= canvas.width() as i32 {
            break;
        }
    }
}

fn fill_cell(canvas: &mut Overlay<'_>, x: i32, y: i32) {
    for dy in 0..GLYPH_SCALE {
        for dx in 0..GLYPH_SCALE {
            let (px, py) = (x + dx, y + dy);
            if px >= 0 && py >= 0 && (px as u32) < canvas.width() && (py as u32) < canvas.height()
            {
                canvas.put_pixel(px as u32, py as u32, Rgb(BOX_COLOR));
            }
        }
    }
}

fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'e' => [0x00, 0x00, 0x0E, 0x11, 0x1F, 0x10, 0x0E],
        'l' => [0x0C, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'm' => [0x00, 0x00, 0x1A, 0x15, 0x15, 0x11, 0x11],
        't' => [0x08, 0x08, 0x1C, 0x08, 0x08, 0x09, 0x06],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: [u8; 3] = [0, 0, 0];

    fn blank(width: u32, height: u32) -> Frame {
        Frame::filled(width, height, BLACK).unwrap()
    }

    #[test]
    fn label_uses_two_decimals() {
        let det = DetectionBox::new(0.0, 0.0, 1.0, 1.0, 0.8765);
        assert_eq!(label_for(&det), "Helmet 0.88");
    }

    #[test]
    fn no_detections_leaves_frame_untouched() {
        let frame = blank(32, 32);
        assert_eq!(annotate(frame.clone(), &[]), frame);
    }

    #[test]
    fn draws_in_place_over_the_frame_buffer() {
        let mut frame = blank(40, 30);
        frame.pixels_mut()[..3].copy_from_slice(&[7, 8, 9]);
        let before = frame.pixels().as_ptr();

        let out = annotate(frame, &[DetectionBox::new(20.0, 20.0, 30.0, 28.0, 0.7)]);
        assert_eq!(out.pixels().as_ptr(), before);
        assert_eq!(out.pixel(0, 0), Some([7, 8, 9]));
        assert_eq!(out.pixel(20, 20), Some(BOX_COLOR));
    }

    #[test]
    fn outline_is_drawn_and_interior_kept() {
        let det = DetectionBox::new(10.0, 30.0, 60.0, 60.0, 0.9);
        let out = annotate(blank(100, 80), &[det]);

        assert_eq!((out.width(), out.height()), (100, 80));
        assert_eq!(out.pixel(10, 30), Some(BOX_COLOR));
        assert_eq!(out.pixel(11, 31), Some(BOX_COLOR));
        assert_eq!(out.pixel(60, 60), Some(BOX_COLOR));
        assert_eq!(out.pixel(35, 45), Some(BLACK));
        assert_eq!(out.pixel(80, 70), Some(BLACK));
    }

    #[test]
    fn label_sits_above_box() {
        let det = DetectionBox::new(10.0, 60.0, 60.0, 75.0, 0.9);
        let out = annotate(blank(100, 80), &[det]);

        // Baseline at y1 - 10 = 50, glyphs occupy rows 36..50. 'H' starts with a lit column.
        assert_eq!(out.pixel(10, 36), Some(BOX_COLOR));
        assert_eq!(out.pixel(10, 35), Some(BLACK));
    }

    #[test]
    fn label_is_clamped_inside_frame() {
        let det = DetectionBox::new(10.0, 3.0, 60.0, 40.0, 0.9);
        let out = annotate(blank(100, 60), &[det]);

        for y in 0..3 {
            for x in 0..100 {
                assert_eq!(out.pixel(x, y), Some(BLACK), "pixel ({x}, {y})");
            }
        }
        // Baseline clamped to 20, so the label's first row is 6.
        assert_eq!(out.pixel(10, 6), Some(BOX_COLOR));
    }

    #[test]
    fn boxes_outside_the_frame_are_clipped() {
        let dets = [
            DetectionBox::new(-20.0, -20.0, 5.0, 5.0, 0.5),
            DetectionBox::new(90.0, 50.0, 200.0, 200.0, 0.5),
            DetectionBox::new(300.0, 300.0, 400.0, 400.0, 0.5),
        ];
        let out = annotate(blank(100, 60), &dets);
        assert_eq!((out.width(), out.height()), (100, 60));
        assert_eq!(out.pixel(5, 5), Some(BOX_COLOR));
        assert_eq!(out.pixel(99, 59), Some(BOX_COLOR));
    }
}
