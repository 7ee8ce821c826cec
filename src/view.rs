// 该文件是 Qianli （千里眼） 项目的一部分。
// src/view.rs - 预览画面到显示窗口的宽高比变换
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::fmt;

use image::{RgbImage, imageops::FilterType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
  pub width: u32,
  pub height: u32,
}

impl Size {
  pub const fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }

  pub fn of(image: &RgbImage) -> Self {
    Self::new(image.width(), image.height())
  }
}

impl fmt::Display for Size {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}x{}", self.width, self.height)
  }
}

/// 把预览画面按原始宽高比居中放入显示区域的缩放 + 平移
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
  pub scale_x: f32,
  pub scale_y: f32,
  pub offset_x: f32,
  pub offset_y: f32,
}

impl ViewTransform {
  pub const IDENTITY: Self = Self {
    scale_x: 1.0,
    scale_y: 1.0,
    offset_x: 0.0,
    offset_y: 0.0,
  };

  /// 计算变换；尚不知道预览尺寸时不做变换
  pub fn fit(preview: Option<Size>, view: Size) -> Self {
    let Some(preview) = preview else {
      return Self::IDENTITY;
    };
    if preview.width == 0 || view.width == 0 || view.height == 0 {
      return Self::IDENTITY;
    }

    let view_width = view.width as f32;
    let view_height = view.height as f32;
    let aspect_ratio = preview.height as f32 / preview.width as f32;

    let (new_width, new_height) = if view_height > view_width * aspect_ratio {
      (view_width as i32, (view_width * aspect_ratio) as i32)
    } else {
      ((view_height / aspect_ratio) as i32, view_height as i32)
    };

    Self {
      scale_x: new_width as f32 / view_width,
      scale_y: new_height as f32 / view_height,
      offset_x: (view_width - new_width as f32) / 2.0,
      offset_y: (view_height - new_height as f32) / 2.0,
    }
  }

  /// 内容在显示区域中的矩形 `(x, y, width, height)`
  pub fn content_rect(&self, view: Size) -> (u32, u32, u32, u32) {
    let width = (view.width as f32 * self.scale_x).round() as u32;
    let height = (view.height as f32 * self.scale_y).round() as u32;
    (
      self.offset_x.max(0.0) as u32,
      self.offset_y.max(0.0) as u32,
      width.clamp(1, view.width.max(1)),
      height.clamp(1, view.height.max(1)),
    )
  }

  /// 生成显示区域大小的画面，内容居中，其余部分填黑
  pub fn letterbox(&self, image: &RgbImage, view: Size) -> RgbImage {
    let (x, y, width, height) = self.content_rect(view);
    let resized = if image.dimensions() == (width, height) {
      image.clone()
    } else {
      image::imageops::resize(image, width, height, FilterType::Triangle)
    };

    if (width, height) == (view.width, view.height) {
      return resized;
    }

    let mut canvas = RgbImage::new(view.width, view.height);
    image::imageops::overlay(&mut canvas, &resized, x as i64, y as i64);
    canvas
  }
}
