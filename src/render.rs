//! All drawing happens here: background treatment, shape primitives, glyph
//! rasterisation and the two canvas layouts.

use std::path::Path;

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba, RgbaImage};
use rusttype::{point, Font, Scale};

use crate::metadata::VideoMetadata;

pub const CANVAS_W: u32 = 1280;
pub const CANVAS_H: u32 = 720;

const BG_BLUR_SIGMA: f32 = 20.0;
const BG_BRIGHTNESS: f32 = 0.6;

const GOLD: Rgba<u8> = Rgba([255, 204, 0, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const SILVER: Rgba<u8> = Rgba([192, 192, 192, 255]);
const GRAY: Rgba<u8> = Rgba([128, 128, 128, 255]);

const TITLE_BUDGET_CARD: usize = 50;
const TITLE_BUDGET_PLAIN: usize = 36;
const VIEWS_MAX_CHARS: usize = 23;

/// The two bundled font assets at their fixed roles.
pub struct FontSet {
    regular: Font<'static>,
    bold: Font<'static>,
}

impl FontSet {
    pub fn load(assets_dir: &Path) -> Result<Self> {
        Ok(Self {
            regular: load_font(&assets_dir.join("font.ttf"))?,
            bold: load_font(&assets_dir.join("font2.ttf"))?,
        })
    }
}

fn load_font(path: &Path) -> Result<Font<'static>> {
    let data = std::fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
    Font::try_from_vec(data).with_context(|| format!("parsing font {}", path.display()))
}

/// Resize to exactly `w`×`h`, the working resolution of every backdrop.
pub fn scale_to_fill(img: &RgbaImage, w: u32, h: u32) -> RgbaImage {
    imageops::resize(img, w, h, FilterType::Triangle)
}

/// Multiply RGB channels in place, leaving alpha untouched.
pub fn darken(img: &mut RgbaImage, factor: f32) {
    for px in img.pixels_mut() {
        for ch in 0..3 {
            px.0[ch] = (px.0[ch] as f32 * factor).round().min(255.0) as u8;
        }
    }
}

/// Blurred, darkened full-canvas copy of the thumbnail.
fn blurred_backdrop(thumb: &RgbaImage) -> RgbaImage {
    let scaled = scale_to_fill(thumb, CANVAS_W, CANVAS_H);
    let mut bg = imageops::blur(&scaled, BG_BLUR_SIGMA);
    darken(&mut bg, BG_BRIGHTNESS);
    bg
}

/// Centred square crop of `min(w, h)`, resized to `diameter` and masked
/// through a full circle onto a transparent canvas.
pub fn circle_crop(img: &RgbaImage, diameter: u32) -> RgbaImage {
    let side = img.width().min(img.height());
    let left = (img.width() - side) / 2;
    let top = (img.height() - side) / 2;
    let square = imageops::crop_imm(img, left, top, side, side).to_image();
    let square = imageops::resize(&square, diameter, diameter, FilterType::Triangle);

    let mut out = ImageBuffer::from_pixel(diameter, diameter, Rgba([0, 0, 0, 0]));
    let center = (diameter as f32 - 1.0) / 2.0;
    let radius = diameter as f32 / 2.0;
    for (x, y, px) in square.enumerate_pixels() {
        let dx = x as f32 - center;
        let dy = y as f32 - center;
        if dx * dx + dy * dy <= radius * radius {
            out.put_pixel(x, y, *px);
        }
    }
    out
}

/// Greedy word wrap against a per-line character budget. Words are never
/// split; once `max_lines` lines are full the remaining words are dropped.
/// Budgets are in characters, not bytes, so multibyte titles wrap the same
/// as ASCII ones. A word that alone exceeds the budget still gets a line of
/// its own rather than an empty one before it.
pub fn wrap_title(title: &str, budget: usize, max_lines: usize) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in title.split_whitespace() {
        let fits = current.chars().count() + word.chars().count() < budget;
        if fits || current.is_empty() {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        } else if lines.len() + 1 < max_lines {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        } else {
            break;
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

fn blend(dst: &mut Rgba<u8>, src: Rgba<u8>, alpha: f32) {
    let a = alpha.max(0.0).min(1.0);
    let inv = 1.0 - a;
    for ch in 0..3 {
        dst.0[ch] = (src.0[ch] as f32 * a + dst.0[ch] as f32 * inv).round() as u8;
    }
    dst.0[3] = 255;
}

/// Rasterise a line of text with `(x, y)` as its top-left corner.
pub fn draw_text(
    img: &mut RgbaImage,
    font: &Font<'static>,
    size: f32,
    x: i32,
    y: i32,
    color: Rgba<u8>,
    text: &str,
) {
    let scale = Scale::uniform(size);
    let v_metrics = font.v_metrics(scale);
    for glyph in font.layout(text, scale, point(x as f32, y as f32 + v_metrics.ascent)) {
        if let Some(bb) = glyph.pixel_bounding_box() {
            glyph.draw(|gx, gy, coverage| {
                let px = gx as i32 + bb.min.x;
                let py = gy as i32 + bb.min.y;
                if px < 0 || py < 0 || px as u32 >= img.width() || py as u32 >= img.height() {
                    return;
                }
                if coverage > 0.0 {
                    blend(img.get_pixel_mut(px as u32, py as u32), color, coverage);
                }
            });
        }
    }
}

fn in_rounded_rect(x: i32, y: i32, w: i32, h: i32, r: i32) -> bool {
    if x < 0 || y < 0 || x >= w || y >= h {
        return false;
    }
    if x >= r && x < w - r {
        return true;
    }
    if y >= r && y < h - r {
        return true;
    }
    let cx = if x < r { r - 1 } else { w - r };
    let cy = if y < r { r - 1 } else { h - r };
    let dx = x - cx;
    let dy = y - cy;
    dx * dx + dy * dy <= r * r
}

/// Rounded-rectangle border of the given stroke width.
pub fn draw_rounded_rect_outline(
    img: &mut RgbaImage,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    radius: i32,
    width: i32,
    color: Rgba<u8>,
) {
    let w = right - left;
    let h = bottom - top;
    let inner_r = (radius - width).max(0);
    for y in 0..h {
        for x in 0..w {
            let outer = in_rounded_rect(x, y, w, h, radius);
            let inner =
                in_rounded_rect(x - width, y - width, w - 2 * width, h - 2 * width, inner_r);
            if outer && !inner {
                put_pixel_checked(img, left + x, top + y, color);
            }
        }
    }
}

pub fn draw_filled_circle(img: &mut RgbaImage, cx: i32, cy: i32, radius: i32, color: Rgba<u8>) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put_pixel_checked(img, cx + dx, cy + dy, color);
            }
        }
    }
}

/// Horizontal bar centred on `y`.
pub fn draw_hbar(img: &mut RgbaImage, x0: i32, x1: i32, y: i32, thickness: i32, color: Rgba<u8>) {
    let half = thickness / 2;
    for yy in (y - half)..(y - half + thickness) {
        for xx in x0..x1 {
            put_pixel_checked(img, xx, yy, color);
        }
    }
}

fn put_pixel_checked(img: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn short_views(views: &str) -> String {
    views.chars().take(VIEWS_MAX_CHARS).collect()
}

/// Compose the final canvas, choosing the layout by avatar availability.
pub fn compose(
    meta: &VideoMetadata,
    thumb: &RgbaImage,
    avatar: Option<&RgbaImage>,
    fonts: &FontSet,
) -> RgbaImage {
    match avatar {
        Some(avatar) => compose_card(meta, thumb, avatar, fonts),
        None => compose_plain(meta, thumb, fonts),
    }
}

/// Card layout: white rounded frame, gold headings, requester avatar, the
/// clean thumbnail against the right edge of the card.
fn compose_card(
    meta: &VideoMetadata,
    thumb: &RgbaImage,
    avatar: &RgbaImage,
    fonts: &FontSet,
) -> RgbaImage {
    let mut canvas = blurred_backdrop(thumb);

    draw_rounded_rect_outline(&mut canvas, 150, 100, 1130, 480, 30, 6, WHITE);

    // clean copy of the thumbnail, 360px tall, aspect preserved
    let thumb_h = 360u32;
    let thumb_w =
        ((thumb_h as f32 * thumb.width() as f32 / thumb.height().max(1) as f32) as u32).max(1);
    let clean = imageops::resize(thumb, thumb_w, thumb_h, FilterType::Triangle);
    let clean_x = (1130 - thumb_w as i32 - 10).max(0) as u32;
    imageops::overlay(&mut canvas, &clean, clean_x, 110);

    draw_text(&mut canvas, &fonts.bold, 80.0, 190, 130, GOLD, "NOW");
    draw_text(&mut canvas, &fonts.bold, 80.0, 190, 210, GOLD, "PLAYING");

    let pfp = circle_crop(avatar, 80);
    imageops::overlay(&mut canvas, &pfp, 190, 380);
    draw_text(&mut canvas, &fonts.regular, 25.0, 290, 400, WHITE, "Requested By");

    if let Some(line) = wrap_title(&meta.title, TITLE_BUDGET_CARD, 1).first() {
        draw_text(&mut canvas, &fonts.bold, 45.0, 150, 520, WHITE, line);
    }
    let byline = format!("{}  |  {}", meta.channel, short_views(&meta.views));
    draw_text(&mut canvas, &fonts.regular, 35.0, 150, 580, SILVER, &byline);

    // progress bar, marker parked at 00:00
    draw_hbar(&mut canvas, 150, 1130, 660, 4, GRAY);
    draw_filled_circle(&mut canvas, 150, 660, 10, WHITE);
    draw_text(&mut canvas, &fonts.regular, 35.0, 140, 685, WHITE, "00:00");
    draw_text(&mut canvas, &fonts.regular, 35.0, 1050, 685, WHITE, &meta.duration);

    canvas
}

/// Plain layout: no card; a large circular album-art crop taken from the
/// thumbnail itself, two-line title, elapsed segment on the progress bar.
fn compose_plain(meta: &VideoMetadata, thumb: &RgbaImage, fonts: &FontSet) -> RgbaImage {
    let mut canvas = blurred_backdrop(thumb);

    let art = circle_crop(thumb, 400);
    imageops::overlay(&mut canvas, &art, 120, 160);

    draw_text(&mut canvas, &fonts.bold, 50.0, 565, 180, GOLD, "NOW PLAYING");

    let lines = wrap_title(&meta.title, TITLE_BUDGET_PLAIN, 2);
    for (i, line) in lines.iter().enumerate() {
        draw_text(&mut canvas, &fonts.bold, 45.0, 565, 260 + i as i32 * 60, WHITE, line);
    }

    let byline = format!("{}  |  {}", meta.channel, short_views(&meta.views));
    draw_text(&mut canvas, &fonts.regular, 35.0, 565, 400, SILVER, &byline);

    // progress bar with a fixed elapsed segment
    let (x0, x1, bar_y) = (565, 1160, 480);
    let elapsed_x = x0 + (x1 - x0) * 3 / 10;
    draw_hbar(&mut canvas, x0, x1, bar_y, 4, GRAY);
    draw_hbar(&mut canvas, x0, elapsed_x, bar_y, 6, WHITE);
    draw_filled_circle(&mut canvas, elapsed_x, bar_y, 10, WHITE);
    draw_text(&mut canvas, &fonts.regular, 35.0, x0, 505, WHITE, "00:00");
    draw_text(&mut canvas, &fonts.regular, 35.0, x1 - 100, 505, WHITE, &meta.duration);

    canvas
}
