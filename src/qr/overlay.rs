//! Drawing helpers for the operator-facing video overlay
//!
//! Everything here is cosmetic: outlines around detected symbols, text labels
//! rendered with a built-in 5x7 bitmap font, and the synthetic frames shown
//! when no live image is available.

use crate::camera::Frame;
use crate::qr::Point;
use image::Rgb;

/// Overlay colour for detections
pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
/// Text colour on synthetic frames
pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;
const GLYPH_ADVANCE: i32 = GLYPH_WIDTH + 1;

/// Build a black frame with `message` centred in white
pub fn placeholder(width: u32, height: u32, message: &str) -> Frame {
    let mut frame = Frame::new(width.max(1), height.max(1));

    let chars = message.chars().count().max(1) as i32;
    // Largest scale that still fits with a margin, capped for readability
    let scale = ((frame.width() as i32 - 20) / (chars * GLYPH_ADVANCE)).clamp(1, 4) as u32;
    let text_w = text_width(message, scale) as i32;
    let text_h = GLYPH_HEIGHT * scale as i32;
    let x = (frame.width() as i32 - text_w) / 2;
    let y = (frame.height() as i32 - text_h) / 2;

    draw_text(&mut frame, x, y, message, WHITE, scale);
    frame
}

/// Width in pixels of `text` rendered at `scale`
pub fn text_width(text: &str, scale: u32) -> u32 {
    let n = text.chars().count() as u32;
    if n == 0 {
        return 0;
    }
    (n * GLYPH_ADVANCE as u32 - 1) * scale
}

/// Render `text` with its top-left corner at (`x`, `y`). Lowercase is drawn as uppercase.
pub fn draw_text(frame: &mut Frame, x: i32, y: i32, text: &str, color: Rgb<u8>, scale: u32) {
    let scale = scale.max(1) as i32;
    let mut pen_x = x;

    for ch in text.chars().flat_map(char::to_uppercase) {
        let glyph = glyph_bits(ch).unwrap_or(QUESTION);
        for (row, pattern) in glyph.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if (pattern >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                    fill_rect(
                        frame,
                        pen_x + col * scale,
                        y + row as i32 * scale,
                        scale as u32,
                        scale as u32,
                        color,
                    );
                }
            }
        }
        pen_x += GLYPH_ADVANCE * scale;
    }
}

/// Fill a rectangle, clipped to the frame
pub fn fill_rect(frame: &mut Frame, x: i32, y: i32, width: u32, height: u32, color: Rgb<u8>) {
    let (fw, fh) = (frame.width() as i32, frame.height() as i32);
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + width as i32).min(fw);
    let y1 = (y + height as i32).min(fh);

    for py in y0..y1 {
        for px in x0..x1 {
            frame.put_pixel(px as u32, py as u32, color);
        }
    }
}

/// Bresenham line with a square brush of `thickness` pixels
pub fn draw_line(frame: &mut Frame, from: Point, to: Point, color: Rgb<u8>, thickness: u32) {
    let thickness = thickness.max(1);
    let offset = (thickness as i32 - 1) / 2;

    let (mut x, mut y) = (from.x, from.y);
    let dx = (to.x - from.x).abs();
    let dy = -(to.y - from.y).abs();
    let sx = if from.x < to.x { 1 } else { -1 };
    let sy = if from.y < to.y { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        fill_rect(frame, x - offset, y - offset, thickness, thickness, color);
        if x == to.x && y == to.y {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Draw a closed polygon outline
pub fn draw_polygon(frame: &mut Frame, points: &[Point], color: Rgb<u8>, thickness: u32) {
    match points {
        [] => {}
        [only] => draw_line(frame, *only, *only, color, thickness),
        _ => {
            for (i, &a) in points.iter().enumerate() {
                let b = points[(i + 1) % points.len()];
                draw_line(frame, a, b, color, thickness);
            }
        }
    }
}

/// True if `points` is a non-degenerate convex quadrilateral in either winding
pub fn is_convex_quad(points: &[Point]) -> bool {
    if points.len() != 4 {
        return false;
    }

    let mut sign = 0i64;
    for i in 0..4 {
        let turn = cross(points[i], points[(i + 1) % 4], points[(i + 2) % 4]);
        if turn == 0 {
            return false;
        }
        let s = turn.signum();
        if sign == 0 {
            sign = s;
        } else if s != sign {
            return false;
        }
    }
    true
}

/// Convex hull (monotone chain), counter-clockwise in image coordinates
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut pts = points.to_vec();
    pts.sort_by_key(|p| (p.x, p.y));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let mut lower: Vec<Point> = Vec::with_capacity(pts.len());
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<Point> = Vec::with_capacity(pts.len());
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

fn cross(o: Point, a: Point, b: Point) -> i64 {
    (a.x - o.x) as i64 * (b.y - o.y) as i64 - (a.y - o.y) as i64 * (b.x - o.x) as i64
}

const QUESTION: [u8; 7] = [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b00000, 0b00100];

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let bits = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        ' ' => [0; 7],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        '_' => [0, 0, 0, 0, 0, 0, 0b11111],
        '.' => [0, 0, 0, 0, 0, 0b01100, 0b01100],
        ',' => [0, 0, 0, 0, 0b01100, 0b00100, 0b01000],
        ':' => [0, 0b01100, 0b01100, 0, 0b01100, 0b01100, 0],
        ';' => [0, 0b01100, 0b01100, 0, 0b01100, 0b00100, 0b01000],
        '/' => [0b00001, 0b00010, 0b00010, 0b00100, 0b01000, 0b01000, 0b10000],
        '\\' => [0b10000, 0b01000, 0b01000, 0b00100, 0b00010, 0b00010, 0b00001],
        '!' => [0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0, 0b00100],
        '?' => QUESTION,
        '=' => [0, 0, 0b11111, 0, 0b11111, 0, 0],
        '+' => [0, 0b00100, 0b00100, 0b11111, 0b00100, 0b00100, 0],
        '*' => [0, 0b00100, 0b10101, 0b01110, 0b10101, 0b00100, 0],
        '(' => [0b00010, 0b00100, 0b01000, 0b01000, 0b01000, 0b00100, 0b00010],
        ')' => [0b01000, 0b00100, 0b00010, 0b00010, 0b00010, 0b00100, 0b01000],
        '<' => [0b00010, 0b00100, 0b01000, 0b10000, 0b01000, 0b00100, 0b00010],
        '>' => [0b01000, 0b00100, 0b00010, 0b00001, 0b00010, 0b00100, 0b01000],
        '#' => [0b01010, 0b01010, 0b11111, 0b01010, 0b11111, 0b01010, 0b01010],
        '@' => [0b01110, 0b10001, 0b10111, 0b10101, 0b10111, 0b10000, 0b01110],
        '&' => [0b01100, 0b10010, 0b10100, 0b01000, 0b10101, 0b10010, 0b01101],
        '%' => [0b11000, 0b11001, 0b00010, 0b00100, 0b01000, 0b10011, 0b00011],
        '\'' => [0b00100, 0b00100, 0b01000, 0, 0, 0, 0],
        '"' => [0b01010, 0b01010, 0, 0, 0, 0, 0],
        _ => return None,
    };
    Some(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: i32, y: i32) -> Point {
        Point::new(x, y)
    }

    #[test]
    fn test_convex_quad_detection() {
        assert!(is_convex_quad(&[p(0, 0), p(10, 0), p(10, 10), p(0, 10)]));
        assert!(is_convex_quad(&[p(0, 0), p(0, 10), p(10, 10), p(10, 0)]));
        // bow-tie ordering
        assert!(!is_convex_quad(&[p(0, 0), p(10, 10), p(10, 0), p(0, 10)]));
        // collapsed corner
        assert!(!is_convex_quad(&[p(0, 0), p(0, 0), p(10, 10), p(0, 10)]));
        assert!(!is_convex_quad(&[p(0, 0), p(10, 0), p(10, 10)]));
    }

    #[test]
    fn test_convex_hull_drops_interior_points() {
        let hull = convex_hull(&[p(0, 0), p(10, 0), p(5, 5), p(10, 10), p(0, 10), p(0, 0)]);
        assert_eq!(hull.len(), 4);
        assert!(!hull.contains(&p(5, 5)));
        assert!(is_convex_quad(&hull));
    }

    #[test]
    fn test_convex_hull_of_collinear_points() {
        let hull = convex_hull(&[p(0, 0), p(5, 0), p(10, 0)]);
        assert_eq!(hull, vec![p(0, 0), p(10, 0)]);
    }

    #[test]
    fn test_draw_line_is_clipped() {
        let mut frame = Frame::new(10, 10);
        draw_line(&mut frame, p(-5, -5), p(20, 20), GREEN, 3);
        assert_eq!(*frame.get_pixel(5, 5), GREEN);
        assert_eq!(*frame.get_pixel(9, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_polygon_outline_leaves_interior() {
        let mut frame = Frame::new(20, 20);
        draw_polygon(&mut frame, &[p(2, 2), p(17, 2), p(17, 17), p(2, 17)], GREEN, 1);
        assert_eq!(*frame.get_pixel(2, 10), GREEN);
        assert_eq!(*frame.get_pixel(10, 17), GREEN);
        assert_eq!(*frame.get_pixel(10, 10), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_text_width() {
        assert_eq!(text_width("", 2), 0);
        assert_eq!(text_width("A", 1), 5);
        assert_eq!(text_width("AB", 2), 22);
    }

    #[test]
    fn test_placeholder_draws_centred_text() {
        let frame = placeholder(640, 480, "CAMERA NOT AVAILABLE");
        assert_eq!(frame.dimensions(), (640, 480));
        let lit = frame.pixels().filter(|px| px.0 == WHITE.0).count();
        assert!(lit > 0);
        assert_eq!(*frame.get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_unknown_glyph_falls_back() {
        let mut a = Frame::new(12, 12);
        let mut b = Frame::new(12, 12);
        draw_text(&mut a, 0, 0, "é", WHITE, 1);
        draw_text(&mut b, 0, 0, "?", WHITE, 1);
        assert_eq!(a, b);
    }
}
