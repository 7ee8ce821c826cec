// 该文件是 Qianli （千里眼） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Datelike, Local};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::ProcessedFrame,
  model::DetectResult,
  output::Render,
  utils::decode_url_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("帧计数器锁已损坏")]
  CounterPoisoned,
}

/// 画面旁附带保存一份 JSON 检测记录
fn write_record(
  path: &Path,
  time: &DateTime<Local>,
  result: &DetectResult,
) -> Result<(), DirectoryRecordOutputError> {
  let detections: Vec<_> = result
    .iter()
    .map(|item| {
      json!({
        "slot": item.slot,
        "class_id": item.class_id,
        "score": item.score,
        "bbox": item.bbox,
      })
    })
    .collect();

  let record = json!({
    "time": time.to_rfc3339(),
    "detections": detections,
  });
  std::fs::write(path.with_extension("json"), serde_json::to_vec_pretty(&record)?)?;
  Ok(())
}

/// 按 `年/月/日/时-分-秒-序号.png` 保存画面
///
/// `record=json` 时保存未绘制的原始画面并附带 JSON 检测记录，否则保存绘制后的副本
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counter: Mutex<u16>,
  always: bool,
  record_json: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");
    let record_json = uri.query_pairs().any(|(k, v)| k == "record" && v == "json");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(decode_url_path(uri)),
      frame_counter: Mutex::new(0),
      always,
      record_json,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> Result<u16, DirectoryRecordOutputError> {
    let mut counter = self
      .frame_counter
      .lock()
      .map_err(|_| DirectoryRecordOutputError::CounterPoisoned)?;
    *counter = counter.wrapping_add(1);
    Ok(*counter)
  }

  fn frame_path(&self, now: &DateTime<Local>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()?
    )))
  }
}

impl Render<ProcessedFrame, DetectResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(
    &self,
    frame: &ProcessedFrame,
    result: &DetectResult,
  ) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      return Ok(());
    }

    let now = Local::now();
    let path = self.frame_path(&now)?;
    if self.record_json {
      frame.frame.image.save(&path)?;
      write_record(&path, &now, result)?;
    } else {
      frame.annotated.save(&path)?;
    }
    debug!("保存检测画面: {}", path.display());
    Ok(())
  }
}
