// 该文件是 Qianli （千里眼） 项目的一部分。
// src/input/discovery.rs - V4L2 相机枚举与预览尺寸查询
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use v4l::capability::Flags;
use v4l::framesize::FrameSizeEnum;
use v4l::prelude::*;
use v4l::video::Capture;

use crate::{input::CameraError, view::Size};

#[derive(Debug, Clone)]
pub struct CameraInfo {
  pub index: usize,
  pub path: PathBuf,
  pub name: String,
  /// 首个像素格式的首个可用尺寸
  pub preview_size: Option<Size>,
}

/// 离散尺寸取其本身，步进范围取最小尺寸
pub fn frame_size_of(size: &FrameSizeEnum) -> Size {
  match size {
    FrameSizeEnum::Discrete(discrete) => Size::new(discrete.width, discrete.height),
    FrameSizeEnum::Stepwise(stepwise) => Size::new(stepwise.min_width, stepwise.min_height),
  }
}

/// 查询单个设备；不是视频采集设备时返回 `None`
pub fn describe(index: usize, path: &Path) -> Result<Option<CameraInfo>, CameraError> {
  let device = Device::with_path(path).map_err(|e| CameraError::device(path, e))?;
  let caps = device.query_caps().map_err(|e| CameraError::device(path, e))?;
  if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
    debug!("跳过非采集设备: {} ({})", path.display(), caps.card);
    return Ok(None);
  }

  let preview_size = match device.enum_formats() {
    Ok(formats) => formats.first().and_then(|format| {
      device
        .enum_framesizes(format.fourcc)
        .ok()
        .and_then(|sizes| sizes.first().map(|s| frame_size_of(&s.size)))
    }),
    Err(e) => {
      debug!("无法枚举 {} 的像素格式: {}", path.display(), e);
      None
    }
  };

  Ok(Some(CameraInfo {
    index,
    path: path.to_path_buf(),
    name: caps.card,
    preview_size,
  }))
}

/// 按设备序号列出所有视频采集设备
pub fn list_cameras() -> Result<Vec<CameraInfo>, CameraError> {
  let mut nodes = v4l::context::enum_devices();
  nodes.sort_by_key(|node| node.index());

  let mut cameras = Vec::new();
  for node in nodes {
    match describe(node.index(), node.path()) {
      Ok(Some(info)) => cameras.push(info),
      Ok(None) => {}
      Err(e) => debug!("忽略无法访问的设备 {}: {}", node.path().display(), e),
    }
  }
  Ok(cameras)
}

/// 按序号依次检查设备，打开前先经过 `gate`（例如权限请求）；第一个通过的相机即默认相机
pub fn default_camera_with<F>(mut gate: F) -> Result<CameraInfo, CameraError>
where
  F: FnMut(&Path) -> Result<(), CameraError>,
{
  let mut nodes = v4l::context::enum_devices();
  nodes.sort_by_key(|node| node.index());

  let mut found = None;
  for node in nodes {
    gate(node.path())?;
    if let Some(info) = describe(node.index(), node.path())? {
      found = Some(info);
      break;
    }
  }

  let camera = found.ok_or(CameraError::NoCamera)?;
  info!(
    "默认相机: {} ({}), 预览尺寸: {}",
    camera.path.display(),
    camera.name,
    camera
      .preview_size
      .map(|s| s.to_string())
      .unwrap_or_else(|| "未知".to_string())
  );
  Ok(camera)
}

#[cfg(test)]
mod tests {
  use super::*;
  use v4l::framesize::{Discrete, Stepwise};

  #[test]
  fn discrete_and_stepwise_sizes() {
    let discrete = FrameSizeEnum::Discrete(Discrete {
      width: 1280,
      height: 720,
    });
    assert_eq!(frame_size_of(&discrete), Size::new(1280, 720));

    let stepwise = FrameSizeEnum::Stepwise(Stepwise {
      min_width: 160,
      max_width: 1920,
      step_width: 16,
      min_height: 120,
      max_height: 1080,
      step_height: 8,
    });
    assert_eq!(frame_size_of(&stepwise), Size::new(160, 120));
  }
}
