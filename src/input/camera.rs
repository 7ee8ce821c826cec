// 该文件是 Qianli （千里眼） 项目的一部分。
// src/input/camera.rs - GStreamer 相机采集
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! # 相机输入
//!
//! 通过 V4L2 找到相机及其预览尺寸，用 GStreamer `v4l2src` 管道采集 RGB 帧。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! ## URL Scheme
//!
//! - `camera://auto` 第一个相机，使用其第一个可用尺寸
//! - `camera:///dev/video2?width=640&height=480&fps=30&rotate=90`
//!
//! 其他参数：`retry_ms` 权限被拒绝后重新请求的间隔，`max_attempts` 最多请求次数。
//!
//! ## 基本用法
//!
//! ```no_run
//! use qianli::{FromUrl, input::CameraInputBuilder};
//! use url::Url;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let camera = CameraInputBuilder::from_url(&Url::parse("camera://auto")?)?.build()?;
//! for frame in camera {
//!     println!("帧 {}: {}x{}", frame.index, frame.width(), frame.height());
//! }
//! # Ok(())
//! # }
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::{Duration, Instant},
};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::CameraFrame,
  input::{
    discovery,
    lifecycle::{CameraEvent, CameraHandle, CloseCamera},
    permission::{self, PermissionError, PermissionPolicy},
  },
  notify::{CAMERA_OPEN_FAILED, LogNotifier, Notifier},
  utils::{decode_url_path, query_map, query_value},
  view::Size,
};

const FALLBACK_PREVIEW_SIZE: Size = Size::new(640, 480);

#[derive(Error, Debug)]
pub enum CameraError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("未找到可用相机")]
  NoCamera,
  #[error("相机设备 {path} 错误: {source}")]
  Device {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error(transparent)]
  Permission(#[from] PermissionError),
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  #[error("Unsupported video format")]
  UnsupportedFormat,
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

impl CameraError {
  pub fn device(path: &Path, source: std::io::Error) -> Self {
    CameraError::Device {
      path: path.display().to_string(),
      source,
    }
  }
}

fn video_flip(rotate: Option<u32>) -> Option<String> {
  let method = match rotate? {
    90 => 1,
    180 => 2,
    270 => 3,
    _ => return None,
  };
  Some(format!("videoflip method={}", method))
}

pub fn camera_pipeline_description(
  device: &Path,
  size: Size,
  fps: Option<u32>,
  rotate: Option<u32>,
) -> String {
  let mut items = vec![
    format!("v4l2src device={}", device.display()),
    "videoconvert".to_string(),
    "videoscale".to_string(),
  ];
  if let Some(fps) = fps {
    items.push(format!("videorate ! video/x-raw,framerate={}/1", fps));
  }
  if let Some(flip) = video_flip(rotate) {
    items.push(flip);
  }
  items.push(format!(
    "video/x-raw,format=RGB,width={},height={}",
    size.width, size.height
  ));
  items.push("appsink name=sink max-buffers=2 drop=true".to_string());
  items.join(" ! ")
}

pub struct CameraInputBuilder {
  device: Option<PathBuf>,
  size: Option<Size>,
  fps: Option<u32>,
  rotate: Option<u32>,
  policy: PermissionPolicy,
  notifier: Arc<dyn Notifier>,
}

impl Default for CameraInputBuilder {
  fn default() -> Self {
    Self {
      device: None,
      size: None,
      fps: None,
      rotate: None,
      policy: PermissionPolicy::default(),
      notifier: Arc::new(LogNotifier),
    }
  }
}

impl FromUrlWithScheme for CameraInputBuilder {
  const SCHEME: &'static str = "camera";
}

impl FromUrl for CameraInputBuilder {
  type Error = CameraError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(CameraError::SchemeMismatch);
    }

    let query = query_map(url);
    let path = decode_url_path(url);
    let device = match path.as_str() {
      "" | "/" => None,
      _ => Some(PathBuf::from(path)),
    };

    let size = match (
      query_value::<u32>(&query, "width"),
      query_value::<u32>(&query, "height"),
    ) {
      (Some(width), Some(height)) => Some(Size::new(width, height)),
      _ => None,
    };

    let mut policy = PermissionPolicy::default();
    if let Some(ms) = query_value::<u64>(&query, "retry_ms") {
      policy.retry_interval = Duration::from_millis(ms);
    }
    policy.max_attempts = query_value(&query, "max_attempts");

    Ok(CameraInputBuilder {
      device,
      size,
      fps: query_value(&query, "fps"),
      rotate: query_value(&query, "rotate"),
      policy,
      ..Default::default()
    })
  }
}

impl CameraInputBuilder {
  /// 请求权限 -> 选择相机 -> 启动采集管道
  pub fn build(self) -> Result<CameraInput, CameraError> {
    let gate = |path: &Path| -> Result<(), CameraError> {
      permission::acquire(path, &self.policy, self.notifier.as_ref())?;
      Ok(())
    };

    let info = match &self.device {
      Some(path) => {
        gate(path.as_path())?;
        discovery::describe(0, path)?.ok_or(CameraError::NoCamera)?
      }
      None => discovery::default_camera_with(gate)?,
    };

    let size = self
      .size
      .or(info.preview_size)
      .unwrap_or(FALLBACK_PREVIEW_SIZE);
    let description = camera_pipeline_description(&info.path, size, self.fps, self.rotate);
    info!("相机 {}: {}", info.path.display(), size);
    info!("相机管道: {}", description);

    let camera = match Self::launch(&description) {
      Ok(camera) => camera,
      Err(e) => {
        self.notifier.notify(CAMERA_OPEN_FAILED);
        return Err(e);
      }
    };

    let mut handle = CameraHandle::new(camera, info.path.display().to_string(), self.notifier);
    handle.handle_event(CameraEvent::Opened);

    Ok(CameraInput {
      handle,
      frame_index: 0,
      start_time: Instant::now(),
    })
  }

  fn launch(description: &str) -> Result<GstCamera, CameraError> {
    gst::init()?;

    let pipeline = gst::parse::launch(description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| CameraError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(CameraError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| CameraError::AppSinkConversionFailed)?;

    if let Err(e) = pipeline.set_state(gst::State::Playing) {
      let _ = pipeline.set_state(gst::State::Null);
      return Err(e.into());
    }

    Ok(GstCamera { pipeline, appsink })
  }
}

struct GstCamera {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
}

impl GstCamera {
  /// 取样失败后从总线上判断是断开还是出错
  fn pending_event(&self) -> CameraEvent {
    let Some(bus) = self.pipeline.bus() else {
      return CameraEvent::Disconnected;
    };

    match bus.pop_filtered(&[gst::MessageType::Error, gst::MessageType::Eos]) {
      Some(msg) => match msg.view() {
        gst::MessageView::Error(err) => CameraEvent::Error(format!(
          "{} ({})",
          err.error(),
          err.debug().map(|d| d.to_string()).unwrap_or_default()
        )),
        _ => CameraEvent::Disconnected,
      },
      None => CameraEvent::Disconnected,
    }
  }
}

impl CloseCamera for GstCamera {
  fn close(self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop camera pipeline: {}", e);
    }
  }
}

/// 打开的相机；迭代得到 RGB 帧，相机断开或出错后迭代结束
pub struct CameraInput {
  handle: CameraHandle<GstCamera>,
  frame_index: u64,
  start_time: Instant,
}

enum Pulled {
  Frame(RgbImage),
  Failed(CameraEvent),
}

impl Iterator for CameraInput {
  type Item = CameraFrame;

  fn next(&mut self) -> Option<Self::Item> {
    let pulled = {
      let camera = self.handle.camera()?;
      match camera.appsink.pull_sample() {
        Ok(sample) => match sample_to_rgb_image(&sample) {
          Ok(image) => Pulled::Frame(image),
          Err(e) => Pulled::Failed(CameraEvent::Error(e.to_string())),
        },
        Err(_) => Pulled::Failed(camera.pending_event()),
      }
    };

    match pulled {
      Pulled::Frame(image) => {
        let frame = CameraFrame::new(
          image,
          self.frame_index,
          self.start_time.elapsed().as_millis() as u64,
        );
        self.frame_index += 1;
        Some(frame)
      }
      Pulled::Failed(event) => {
        self.handle.handle_event(event);
        None
      }
    }
  }
}

/// 去掉行尾填充，BGR 时交换通道
pub fn pack_rgb_rows(
  data: &[u8],
  width: usize,
  height: usize,
  stride: usize,
  bgr: bool,
) -> Result<Vec<u8>, CameraError> {
  let row_bytes = width * 3;
  let stride = stride.max(row_bytes);
  let expected = if height == 0 {
    0
  } else {
    stride * (height - 1) + row_bytes
  };
  if row_bytes == 0 || data.len() < expected {
    return Err(CameraError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  let mut pixels = Vec::with_capacity(row_bytes * height);
  for row in data.chunks(stride).take(height) {
    let row = &row[..row_bytes];
    if bgr {
      for px in row.chunks_exact(3) {
        pixels.extend_from_slice(&[px[2], px[1], px[0]]);
      }
    } else {
      pixels.extend_from_slice(row);
    }
  }
  Ok(pixels)
}

fn sample_to_rgb_image(sample: &gst::Sample) -> Result<RgbImage, CameraError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| CameraError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| CameraError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| CameraError::VideoInfoError)?;
  let width = video_info.width();
  let height = video_info.height();
  let stride = video_info.stride().first().copied().unwrap_or(0).max(0) as usize;

  let bgr = match video_info.format() {
    gst_video::VideoFormat::Rgb => false,
    gst_video::VideoFormat::Bgr => true,
    _ => return Err(CameraError::UnsupportedFormat),
  };

  let map = buffer
    .map_readable()
    .map_err(|e| CameraError::PipelineError(format!("Failed to map buffer for reading: {}", e)))?;
  let pixels = pack_rgb_rows(map.as_slice(), width as usize, height as usize, stride, bgr)?;
  debug!("采集到 {}x{} 帧", width, height);

  let actual = pixels.len();
  RgbImage::from_raw(width, height, pixels).ok_or(CameraError::BufferSizeMismatch {
    expected: (width * height * 3) as usize,
    actual,
  })
}
