// 该文件是 Qianli （千里眼） 项目的一部分。
// src/output/draw.rs - 在帧的副本上绘制检测框与标签
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
  labels::LabelMap,
  model::{DetectItem, DetectResult},
};

/// 按槽位序号取色
pub const SLOT_COLORS: [[u8; 3]; 10] = [
  [0, 0, 255],     // 蓝
  [0, 255, 0],     // 绿
  [255, 0, 0],     // 红
  [0, 255, 255],   // 青
  [136, 136, 136], // 灰
  [0, 0, 0],       // 黑
  [68, 68, 68],    // 深灰
  [255, 0, 255],   // 品红
  [255, 255, 0],   // 黄
  [255, 0, 0],     // 红
];

/// DejaVu Sans，许可证见 `assets/font-LICENSE.txt`
const DEFAULT_FONT: &[u8] = include_bytes!("../../assets/font.ttf");

#[derive(Error, Debug)]
pub enum FontError {
  #[error("无法读取字体文件 {0}: {1}")]
  Io(String, std::io::Error),
  #[error("字体文件无效: {0}")]
  Invalid(String),
}

pub fn load_font(path: &Path) -> Result<FontArc, FontError> {
  let data = std::fs::read(path).map_err(|e| FontError::Io(path.display().to_string(), e))?;
  FontArc::try_from_vec(data).map_err(|_| FontError::Invalid(path.display().to_string()))
}

pub fn default_font() -> Result<FontArc, FontError> {
  FontArc::try_from_slice(DEFAULT_FONT).map_err(|_| FontError::Invalid("内置字体".to_string()))
}

/// 优先使用指定字体，否则使用内置字体
pub fn find_font(preferred: Option<&Path>) -> Option<FontArc> {
  if let Some(path) = preferred {
    match load_font(path) {
      Ok(font) => {
        info!("使用字体: {}", path.display());
        return Some(font);
      }
      Err(e) => warn!("{}, 改用内置字体", e),
    }
  }

  match default_font() {
    Ok(font) => Some(font),
    Err(e) => {
      warn!("{}, 只绘制检测框, 不绘制标签文字", e);
      None
    }
  }
}

/// 与帧高度相关的画笔参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paint {
  pub text_size: f32,
  pub stroke_width: u32,
}

impl Paint {
  pub fn for_height(height: u32) -> Self {
    let height = height as f32;
    Self {
      text_size: height / 15.0,
      stroke_width: ((height / 85.0).round() as u32).max(1),
    }
  }
}

#[derive(Clone)]
pub struct Annotator {
  labels: LabelMap,
  font: Option<FontArc>,
}

impl Annotator {
  pub fn new(labels: LabelMap, font: Option<FontArc>) -> Self {
    Self { labels, font }
  }

  /// 返回绘制好的副本，原图保持不变
  pub fn annotate(&self, image: &RgbImage, result: &DetectResult) -> RgbImage {
    let mut canvas = image.clone();
    self.draw_on(&mut canvas, result);
    canvas
  }

  fn draw_on(&self, image: &mut RgbImage, result: &DetectResult) {
    let paint = Paint::for_height(image.height());
    for item in result.iter() {
      self.draw_item(image, item, paint);
    }
  }

  pub fn label_text(&self, item: &DetectItem) -> String {
    format!("{} {}", self.labels.display_name(item.class_id), item.score)
  }

  fn draw_item(&self, image: &mut RgbImage, item: &DetectItem, paint: Paint) {
    let color = Rgb(SLOT_COLORS[item.slot % SLOT_COLORS.len()]);
    let (w, h) = (image.width() as f32, image.height() as f32);

    // 坐标颠倒的框按左上、右下重新排序
    let (x0, x1) = ((item.bbox[0] * w) as i32, (item.bbox[2] * w) as i32);
    let (y0, y1) = ((item.bbox[1] * h) as i32, (item.bbox[3] * h) as i32);
    let (left, right) = (x0.min(x1), x0.max(x1));
    let (top, bottom) = (y0.min(y1), y0.max(y1));

    draw_stroked_rect(image, (left, top, right, bottom), paint.stroke_width, color);

    if let Some(font) = &self.font {
      let scale = PxScale::from(paint.text_size);
      // 文字基线落在框的左上角
      let ascent = font.as_scaled(scale).ascent();
      let y = (top as f32 - ascent).round() as i32;
      draw_text_mut(image, color, left, y, scale, font, &self.label_text(item));
    }
  }
}

/// 以边线为中心描出 `stroke` 像素宽的矩形，面积为零时不画
fn draw_stroked_rect(
  image: &mut RgbImage,
  (left, top, right, bottom): (i32, i32, i32, i32),
  stroke: u32,
  color: Rgb<u8>,
) {
  if right <= left || bottom <= top {
    return;
  }

  let half = (stroke / 2) as i32;
  for layer in 0..stroke as i32 {
    let inset = layer - half;
    let width = right - left - 2 * inset;
    let height = bottom - top - 2 * inset;
    if width <= 0 || height <= 0 {
      continue;
    }
    let rect = Rect::at(left + inset, top + inset).of_size(width as u32, height as u32);
    draw_hollow_rect_mut(image, rect, color);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(slot: usize, class_id: u32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      slot,
      class_id,
      score: 0.875,
      bbox,
    }
  }

  #[test]
  fn paint_scales_with_height() {
    let paint = Paint::for_height(850);
    assert_eq!(paint.stroke_width, 10);
    assert!((paint.text_size - 56.666_67).abs() < 1e-3);

    assert_eq!(Paint::for_height(30).stroke_width, 1);
  }

  #[test]
  fn draws_on_a_copy_with_slot_colour() {
    let source = RgbImage::new(100, 100);
    let result: DetectResult = [
      item(0, 1, [0.25, 0.25, 0.75, 0.75]),
      item(1, 2, [0.1, 0.1, 0.2, 0.2]),
    ]
    .into_iter()
    .collect();

    let annotator = Annotator::new(LabelMap::parse("???\nperson\nbicycle"), None);
    let out = annotator.annotate(&source, &result);

    assert_eq!(source.get_pixel(25, 50), &Rgb([0, 0, 0]));
    assert_eq!(out.get_pixel(25, 50), &Rgb(SLOT_COLORS[0]));
    assert_eq!(out.get_pixel(50, 25), &Rgb(SLOT_COLORS[0]));
    assert_eq!(out.get_pixel(50, 50), &Rgb([0, 0, 0]));
    assert_eq!(out.get_pixel(10, 15), &Rgb(SLOT_COLORS[1]));
  }

  #[test]
  fn slot_colour_wraps() {
    let source = RgbImage::new(20, 20);
    let result: DetectResult = [item(12, 0, [0.0, 0.0, 0.5, 0.5])].into_iter().collect();
    let out = Annotator::new(LabelMap::default(), None).annotate(&source, &result);
    assert_eq!(out.get_pixel(0, 5), &Rgb(SLOT_COLORS[2]));
  }

  #[test]
  fn degenerate_box_is_skipped() {
    let source = RgbImage::new(10, 10);
    let result: DetectResult = [item(0, 0, [0.5, 0.5, 0.5, 0.9])].into_iter().collect();
    let out = Annotator::new(LabelMap::default(), None).annotate(&source, &result);
    assert!(out.pixels().all(|p| p == &Rgb([0, 0, 0])));
  }

  #[test]
  fn inverted_box_is_normalized() {
    let source = RgbImage::new(100, 100);
    let result: DetectResult = [item(0, 0, [0.75, 0.75, 0.25, 0.25])].into_iter().collect();
    let out = Annotator::new(LabelMap::default(), None).annotate(&source, &result);
    assert_eq!(out.get_pixel(25, 50), &Rgb(SLOT_COLORS[0]));
    assert_eq!(out.get_pixel(50, 75), &Rgb(SLOT_COLORS[0]));
    assert_eq!(out.get_pixel(50, 50), &Rgb([0, 0, 0]));
  }

  #[test]
  fn label_is_drawn_above_box_with_embedded_font() {
    let source = RgbImage::new(300, 300);
    let result: DetectResult = [item(0, 1, [0.25, 0.5, 0.75, 0.9])].into_iter().collect();
    let labels = LabelMap::parse("???\nperson");

    let paint = Paint::for_height(300);
    let font = default_font().unwrap();
    let ascent = font.as_scaled(PxScale::from(paint.text_size)).ascent().ceil() as u32;
    let (left, right, top) = (75u32, 225u32, 150u32);
    let rows = (top - ascent)..(top - paint.stroke_width / 2 - 1);
    let label_pixels = |image: &RgbImage| {
      rows
        .clone()
        .flat_map(|y| (left..=right).map(move |x| (x, y)))
        .filter(|&(x, y)| {
          let Rgb([r, g, b]) = *image.get_pixel(x, y);
          r == 0 && g == 0 && b > 0
        })
        .count()
    };

    let with_text = Annotator::new(labels.clone(), Some(font)).annotate(&source, &result);
    assert!(label_pixels(&with_text) > 0);

    let boxes_only = Annotator::new(labels, None).annotate(&source, &result);
    assert_eq!(label_pixels(&boxes_only), 0);
  }

  #[test]
  fn label_text_uses_name_and_raw_score() {
    let annotator = Annotator::new(LabelMap::parse("???\nperson"), None);
    assert_eq!(annotator.label_text(&item(0, 1, [0.0; 4])), "person 0.875");
    assert_eq!(annotator.label_text(&item(0, 7, [0.0; 4])), "#7 0.875");
  }
}
