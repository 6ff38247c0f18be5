use image::Rgb;
use signcast_core::{Detection, RawImage};

/// Per-class box colours, cycled by class id.
const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];

const LINE_WIDTH: i32 = 2;
const GLYPH_W: i32 = 5;
const GLYPH_H: i32 = 7;
const TAG_PAD: i32 = 2;

pub fn class_color(class_id: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_id % PALETTE.len()])
}

/// Draw every detection onto a copy of `image`: a box outline plus a filled tag with the
/// confidence percentage. Boxes are clipped to the frame.
///
/// The tag carries no class name. The built-in glyph set covers only digits and `%`, and
/// the Chinese vocabulary would need a CJK font; clients read the name from `className`
/// and tell classes apart on the frame by box colour.
pub fn annotate(image: &RawImage, detections: &[Detection]) -> RawImage {
    let mut canvas = image.clone();
    if canvas.width() == 0 || canvas.height() == 0 {
        return canvas;
    }

    for detection in detections {
        let color = class_color(detection.class_id);
        let b = detection.bbox;
        for inset in 0..LINE_WIDTH {
            stroke_rect(
                &mut canvas,
                b.xmin + inset,
                b.ymin + inset,
                b.xmax - inset,
                b.ymax - inset,
                color,
            );
        }

        let text = format!("{:.0}%", detection.confidence * 100.0);
        let tag_w = text.chars().count() as i32 * (GLYPH_W + 1) + TAG_PAD * 2;
        let tag_h = GLYPH_H + TAG_PAD * 2;
        let tag_top = if b.ymin - tag_h >= 0 { b.ymin - tag_h } else { b.ymin };
        fill_rect(
            &mut canvas,
            b.xmin,
            tag_top,
            b.xmin + tag_w - 1,
            tag_top + tag_h - 1,
            color,
        );
        draw_text(
            &mut canvas,
            b.xmin + TAG_PAD,
            tag_top + TAG_PAD,
            &text,
            Rgb([255, 255, 255]),
        );
    }

    canvas
}

fn put(image: &mut RawImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn stroke_rect(image: &mut RawImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    if left > right || top > bottom {
        return;
    }
    let max_x = image.width() as i32 - 1;
    let max_y = image.height() as i32 - 1;
    for x in left.max(0)..=right.min(max_x) {
        put(image, x, top, color);
        put(image, x, bottom, color);
    }
    for y in top.max(0)..=bottom.min(max_y) {
        put(image, left, y, color);
        put(image, right, y, color);
    }
}

fn fill_rect(image: &mut RawImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let max_x = image.width() as i32 - 1;
    let max_y = image.height() as i32 - 1;
    for y in top.max(0)..=bottom.min(max_y) {
        for x in left.max(0)..=right.min(max_x) {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

fn draw_text(image: &mut RawImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>) {
    for ch in text.chars() {
        if let Some(rows) = glyph(ch) {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_W {
                    if (bits >> (GLYPH_W - 1 - col)) & 1 == 1 {
                        put(image, x + col, y + row as i32, color);
                    }
                }
            }
        }
        x += GLYPH_W + 1;
    }
}

fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '%' => [0b11001, 0b11010, 0b00010, 0b00100, 0b01000, 0b01011, 0b10011],
        _ => return None,
    };
    Some(rows)
}
