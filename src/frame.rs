// 该文件是 Qianli （千里眼） 项目的一部分。
// src/frame.rs - 相机帧与 NHWC 张量帧定义
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::time::Duration;

use image::{RgbImage, imageops::FilterType};

use crate::model::DetectResult;

pub trait AsNhwcFrame<const W: u32, const H: u32> {
  fn as_nhwc(&self) -> &[u8];
}

/// 相机送来的一帧画面
#[derive(Debug, Clone)]
pub struct CameraFrame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引
  pub index: u64,
  /// 自打开相机起的时间戳（毫秒）
  pub timestamp_ms: u64,
}

impl CameraFrame {
  pub fn new(image: RgbImage, index: u64, timestamp_ms: u64) -> Self {
    Self {
      image,
      index,
      timestamp_ms,
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

/// 视频线程处理完的一帧：原始画面、绘制后的副本与检测结果
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
  pub frame: CameraFrame,
  pub annotated: RgbImage,
  pub result: DetectResult,
  pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct RgbNhwcFrame<const W: u32, const H: u32> {
  data: Box<[u8]>,
}

impl<const W: u32, const H: u32> RgbNhwcFrame<W, H> {
  /// 双线性缩放到 W x H 后按 NHWC 排布
  pub fn resized_from(image: &RgbImage) -> Self {
    if image.dimensions() == (W, H) {
      return Self {
        data: image.as_raw().clone().into_boxed_slice(),
      };
    }

    let resized = image::imageops::resize(image, W, H, FilterType::Triangle);
    Self {
      data: resized.into_raw().into_boxed_slice(),
    }
  }
}

impl<const W: u32, const H: u32> AsNhwcFrame<W, H> for RgbNhwcFrame<W, H> {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn resize_keeps_uniform_colour() {
    let image = RgbImage::from_pixel(640, 480, Rgb([10, 20, 30]));
    let frame = RgbNhwcFrame::<300, 300>::resized_from(&image);
    let data = frame.as_nhwc();
    assert_eq!(data.len(), 300 * 300 * 3);
    assert_eq!(&data[..3], &[10, 20, 30]);
    assert_eq!(&data[data.len() - 3..], &[10, 20, 30]);
  }

  #[test]
  fn same_size_is_copied_verbatim() {
    let mut image = RgbImage::new(4, 2);
    image.put_pixel(3, 1, Rgb([1, 2, 3]));
    let frame = RgbNhwcFrame::<4, 2>::resized_from(&image);
    assert_eq!(frame.as_nhwc(), image.as_raw().as_slice());
  }
}
