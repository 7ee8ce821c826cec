// 该文件是 Qianli （千里眼） 项目的一部分。
// src/model/ssd.rs - SSD 检测模型的输入输出约定与解码
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! SSD MobileNet 类模型：输入一张 300x300 RGB 图像，输出四个定长数组
//!
//! | 序号 | 名称          | 形状      | 含义                                   |
//! |------|---------------|-----------|----------------------------------------|
//! | 0    | locations     | [1, N, 4] | `[top, left, bottom, right]`，归一化    |
//! | 1    | classes       | [1, N]    | 类别索引（浮点）                        |
//! | 2    | scores        | [1, N]    | 置信度                                 |
//! | 3    | num_detections| [1]       | 有效检测数量（仅用于日志）             |

use tracing::debug;

use crate::{
  frame::RgbNhwcFrame,
  model::{DetectItem, DetectResult},
};

pub const SSD_INPUT_W: u32 = 300;
pub const SSD_INPUT_H: u32 = 300;
pub const SSD_MAX_DETECTIONS: usize = 10;
pub const SSD_DEFAULT_THRESHOLD: f32 = 0.5;

pub type SsdInput = RgbNhwcFrame<SSD_INPUT_W, SSD_INPUT_H>;

/// 一次推理返回的原始输出，处理完当前帧即丢弃
#[derive(Debug, Clone, Default)]
pub struct SsdOutput {
  pub locations: Vec<f32>,
  pub classes: Vec<f32>,
  pub scores: Vec<f32>,
  pub num_detections: f32,
}

impl SsdOutput {
  /// 固定扫描的槽位数：受各数组长度与最大槽位数限制，`num_detections` 不参与
  pub fn slot_count(&self) -> usize {
    self
      .scores
      .len()
      .min(self.classes.len())
      .min(self.locations.len() / 4)
      .min(SSD_MAX_DETECTIONS)
  }

  /// 只保留置信度严格大于 `threshold` 的槽位
  pub fn decode(&self, threshold: f32) -> DetectResult {
    let slots = self.slot_count();

    let result: DetectResult = (0..slots)
      .filter(|&slot| self.scores[slot] > threshold)
      .map(|slot| {
        let loc = &self.locations[slot * 4..slot * 4 + 4];
        let (top, left, bottom, right) = (loc[0], loc[1], loc[2], loc[3]);
        DetectItem {
          slot,
          class_id: self.classes[slot] as u32,
          score: self.scores[slot],
          bbox: [left, top, right, bottom],
        }
      })
      .collect();

    debug!(
      "{} 个槽位中有 {} 个超过阈值 (模型报告 {} 个检测)",
      slots,
      result.len(),
      self.num_detections
    );
    result
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> SsdOutput {
    let mut locations = vec![0.0f32; 40];
    locations[..4].copy_from_slice(&[0.1, 0.2, 0.5, 0.6]);
    locations[4..8].copy_from_slice(&[0.3, 0.3, 0.9, 0.8]);
    locations[8..12].copy_from_slice(&[0.0, 0.0, 1.0, 1.0]);

    let mut classes = vec![0.0f32; 10];
    classes[0] = 1.0;
    classes[1] = 17.0;
    classes[2] = 3.0;

    let mut scores = vec![0.0f32; 10];
    scores[0] = 0.92;
    scores[1] = 0.5;
    scores[2] = 0.71;

    SsdOutput {
      locations,
      classes,
      scores,
      num_detections: 10.0,
    }
  }

  #[test]
  fn decodes_boxes_above_threshold() {
    let result = sample().decode(SSD_DEFAULT_THRESHOLD);
    assert_eq!(result.len(), 2);

    let first = &result.items[0];
    assert_eq!(first.slot, 0);
    assert_eq!(first.class_id, 1);
    assert_eq!(first.bbox, [0.2, 0.1, 0.6, 0.5]);

    let second = &result.items[1];
    assert_eq!(second.slot, 2);
    assert_eq!(second.class_id, 3);
    assert_eq!(second.score, 0.71);
  }

  #[test]
  fn threshold_is_strict() {
    let result = sample().decode(0.5);
    assert!(result.iter().all(|item| item.slot != 1));

    let result = sample().decode(0.49);
    assert!(result.iter().any(|item| item.slot == 1));
  }

  #[test]
  fn num_detections_does_not_limit_slots() {
    let mut output = sample();
    output.num_detections = 0.0;
    assert_eq!(output.slot_count(), SSD_MAX_DETECTIONS);
    let result = output.decode(SSD_DEFAULT_THRESHOLD);
    assert_eq!(
      result.iter().map(|item| item.slot).collect::<Vec<_>>(),
      vec![0, 2]
    );

    output.num_detections = 1.0;
    assert_eq!(output.decode(SSD_DEFAULT_THRESHOLD).len(), 2);
  }

  #[test]
  fn short_arrays_never_panic() {
    let output = SsdOutput {
      locations: vec![0.1, 0.1, 0.2],
      classes: vec![1.0, 2.0],
      scores: vec![0.9, 0.9],
      num_detections: 2.0,
    };
    assert_eq!(output.slot_count(), 0);
    assert!(output.decode(0.5).is_empty());
  }

  #[test]
  fn never_more_than_ten_slots() {
    let output = SsdOutput {
      locations: vec![0.5; 4 * 20],
      classes: vec![1.0; 20],
      scores: vec![0.9; 20],
      num_detections: 20.0,
    };
    assert_eq!(output.decode(0.5).len(), SSD_MAX_DETECTIONS);
  }
}
