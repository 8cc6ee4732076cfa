use std::cell::OnceCell;

use font_kit::family_name::FamilyName;
use font_kit::font::Font;
use font_kit::properties::Properties;
use font_kit::source::SystemSource;
use image::RgbImage;
use raqote::{DrawOptions, DrawTarget, Point, SolidSource, Source};

use crate::vision::glyphs::{GLYPH_HEIGHT, GLYPH_WIDTH, lit_pixels};

// 标签左上角位置，与画面边缘的距离
const TEXT_ORIGIN: (f32, f32) = (10.0, 10.0);
const BANNER_PADDING: f32 = 6.0;

thread_local! {
    // font-kit的字体句柄不跨线程共享，每个检测线程各加载一次
    static SYSTEM_FONT: OnceCell<Option<Font>> = const { OnceCell::new() };
}

/// 加载系统的无衬线字体，找不到时返回 `None`
pub fn load_system_font() -> Option<Font> {
    let handle = match SystemSource::new()
        .select_best_match(&[FamilyName::SansSerif], &Properties::new())
    {
        Ok(handle) => handle,
        Err(e) => {
            log::debug!("没有可用的系统字体 ({:?})，改用内置点阵字库", e);
            return None;
        }
    };
    match handle.load() {
        Ok(font) => Some(font),
        Err(e) => {
            log::debug!("系统字体加载失败 ({:?})，改用内置点阵字库", e);
            None
        }
    }
}

/// 在画面上写预测标签
///
/// 标签画在左上角，底下垫一块半透明的深色背景。普通标签用绿色，报警标签用红色。
/// 文字用系统字体绘制，系统里没有字体时用内置的点阵字库。
///
/// # 参数
/// * `image` - 原始画面
/// * `text` - 要写的文字
/// * `alert` - 是否是报警类别
///
/// # 返回值
/// 返回写好标签的新画面
pub fn draw_label(image: &RgbImage, text: &str, alert: bool) -> RgbImage {
    SYSTEM_FONT.with(|cell| {
        let font = cell.get_or_init(load_system_font);
        draw_label_with(image, text, alert, font.as_ref())
    })
}

/// 用指定字体写标签，`font` 为 `None` 时用点阵字库
pub fn draw_label_with(image: &RgbImage, text: &str, alert: bool, font: Option<&Font>) -> RgbImage {
    let (img_width, img_height) = image.dimensions();
    let mut dt = DrawTarget::new(img_width as i32, img_height as i32);

    // 将原始图像绘制到DrawTarget上
    let image_data: Vec<u32> = image
        .pixels()
        .map(|pixel| {
            let [r, g, b] = pixel.0;
            u32::from_le_bytes([b, g, r, 0xFF])
        })
        .collect();
    let img = raqote::Image {
        width: img_width as i32,
        height: img_height as i32,
        data: &image_data,
    };
    dt.draw_image_at(0.0, 0.0, &img, &DrawOptions::new());

    let color = if alert {
        SolidSource { r: 0xFF, g: 0x00, b: 0x00, a: 0xFF }
    } else {
        SolidSource { r: 0x00, g: 0xFF, b: 0x00, a: 0xFF }
    };
    let pen = Source::Solid(color);

    match font {
        Some(font) => draw_font_text(&mut dt, font, text, img_height, &pen),
        None => draw_bitmap_text(&mut dt, text, img_height, &pen),
    }

    // 将DrawTarget转换回图像，底图不透明，无需反预乘
    let pixels: Vec<u8> = dt
        .get_data()
        .iter()
        .flat_map(|&pixel| {
            let [b, g, r, _a] = pixel.to_le_bytes();
            [r, g, b]
        })
        .collect();

    RgbImage::from_raw(img_width, img_height, pixels).unwrap_or_else(|| image.clone())
}

fn draw_banner(dt: &mut DrawTarget, text_width: f32, text_height: f32) {
    let (x0, y0) = TEXT_ORIGIN;
    let banner = SolidSource::from_unpremultiplied_argb(0xA0, 0x00, 0x00, 0x00);
    dt.fill_rect(
        x0 - BANNER_PADDING,
        y0 - BANNER_PADDING,
        text_width + BANNER_PADDING * 2.0,
        text_height + BANNER_PADDING * 2.0,
        &Source::Solid(banner),
        &DrawOptions::new(),
    );
}

fn draw_font_text(dt: &mut DrawTarget, font: &Font, text: &str, img_height: u32, pen: &Source) {
    let (x0, y0) = TEXT_ORIGIN;
    let point_size = font_size(img_height);
    let metrics = font.metrics();
    let units = metrics.units_per_em as f32;
    let ascent = metrics.ascent * point_size / units;
    let text_height = (metrics.ascent - metrics.descent) * point_size / units;

    let mut ids = Vec::new();
    let mut positions = Vec::new();
    let mut x = x0;
    for c in text.chars() {
        // 字体里没有的字符画成问号，问号也没有就跳过
        let Some(id) = font.glyph_for_char(c).or_else(|| font.glyph_for_char('?')) else {
            continue;
        };
        let Ok(advance) = font.advance(id) else {
            continue;
        };
        if font.typographic_bounds(id).is_err() {
            continue;
        }
        ids.push(id);
        positions.push(Point::new(x, y0 + ascent));
        x += advance.x() * point_size / units;
    }

    draw_banner(dt, x - x0, text_height);
    if !ids.is_empty() {
        dt.draw_glyphs(font, point_size, &ids, &positions, pen, &DrawOptions::new());
    }
}

fn draw_bitmap_text(dt: &mut DrawTarget, text: &str, img_height: u32, pen: &Source) {
    let (x0, y0) = TEXT_ORIGIN;
    let scale = text_scale(img_height);
    let advance = ((GLYPH_WIDTH + 1) * scale) as f32;
    let text_width = advance * text.chars().count() as f32;
    let text_height = (GLYPH_HEIGHT * scale) as f32;

    draw_banner(dt, text_width, text_height);
    for (i, c) in text.chars().enumerate() {
        let cx = x0 + advance * i as f32;
        for (col, row) in lit_pixels(c) {
            dt.fill_rect(
                cx + (col * scale) as f32,
                y0 + (row * scale) as f32,
                scale as f32,
                scale as f32,
                pen,
                &DrawOptions::new(),
            );
        }
    }
}

/// 按画面高度选择点阵字形放大倍数，480p大约是4倍
fn text_scale(img_height: u32) -> u32 {
    (img_height / 120).max(1)
}

/// 按画面高度选择字号，480p大约24像素
fn font_size(img_height: u32) -> f32 {
    (img_height as f32 / 20.0).max(12.0)
}
