// 该文件是 Qianli （千里眼） 项目的一部分。
// src/model.rs - 模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  /// 模型输出中的槽位序号，决定绘制颜色
  pub slot: usize,
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，归一化坐标
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem> {
    self.items.iter()
  }
}

impl FromIterator<DetectItem> for DetectResult {
  fn from_iter<T: IntoIterator<Item = DetectItem>>(iter: T) -> Self {
    Self {
      items: iter.into_iter().collect(),
    }
  }
}

mod ssd;
pub use self::ssd::{
  SSD_DEFAULT_THRESHOLD, SSD_INPUT_H, SSD_INPUT_W, SSD_MAX_DETECTIONS, SsdInput, SsdOutput,
};

#[cfg(feature = "model_ssd")]
mod ssd_rknn;
#[cfg(feature = "model_ssd")]
pub use self::ssd_rknn::{Ssd, SsdBuilder, SsdError};
