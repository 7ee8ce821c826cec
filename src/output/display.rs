// 该文件是 Qianli （千里眼） 项目的一部分。
// src/output/display.rs - GStreamer 窗口显示输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! # 显示输出
//!
//! 把绘制好的画面按预览宽高比居中放入窗口，再推送到 `autovideosink`。
//!
//! ## URL Scheme
//!
//! `display://?width=1280&height=720&fps=30&sink=autovideosink`
//!
//! - `width` / `height`: 窗口（视图）尺寸，默认 1280x720
//! - `fps`: 时间戳使用的帧率，默认 30
//! - `sink`: GStreamer 显示元素，默认 `autovideosink`

use std::sync::Mutex;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::ProcessedFrame,
  model::DetectResult,
  output::Render,
  utils::{query_map, query_value},
  view::{Size, ViewTransform},
};

const DEFAULT_VIEW: Size = Size::new(1280, 720);
const DEFAULT_FPS: i32 = 30;
const DEFAULT_SINK: &str = "autovideosink";

#[derive(Error, Debug)]
pub enum DisplayOutputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("Failed to get appsrc element")]
  AppSrcNotFound,
  #[error("Failed to convert element to appsrc")]
  AppSrcConversionFailed,
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("显示状态锁已损坏")]
  StatePoisoned,
}

pub fn display_pipeline_description(sink: &str) -> String {
  format!(
    "appsrc name=src is-live=true format=time ! videoconvert ! {} sync=false",
    sink
  )
}

struct ViewState {
  preview: Option<Size>,
  transform: ViewTransform,
  frame_count: u64,
}

impl ViewState {
  fn new() -> Self {
    Self {
      preview: None,
      transform: ViewTransform::IDENTITY,
      frame_count: 0,
    }
  }

  /// 预览尺寸变化时重新计算变换；返回本帧使用的变换与帧序号
  fn advance(&mut self, preview: Size, view: Size) -> (ViewTransform, u64) {
    if self.preview != Some(preview) {
      self.preview = Some(preview);
      self.transform = ViewTransform::fit(self.preview, view);
      info!(
        "预览尺寸 {} -> 视图 {}, 变换: {:?}",
        preview, view, self.transform
      );
    }

    let frame_count = self.frame_count;
    self.frame_count += 1;
    (self.transform, frame_count)
  }
}

pub struct DisplayOutput {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  view: Size,
  fps: i32,
  state: Mutex<ViewState>,
}

impl FromUrlWithScheme for DisplayOutput {
  const SCHEME: &'static str = "display";
}

impl FromUrl for DisplayOutput {
  type Error = DisplayOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(DisplayOutputError::SchemeMismatch);
    }

    let query = query_map(url);
    let view = Size::new(
      query_value(&query, "width").unwrap_or(DEFAULT_VIEW.width),
      query_value(&query, "height").unwrap_or(DEFAULT_VIEW.height),
    );
    let fps: i32 = query_value(&query, "fps").unwrap_or(DEFAULT_FPS).max(1);
    let sink = query
      .get("sink")
      .cloned()
      .unwrap_or_else(|| DEFAULT_SINK.to_string());

    Self::open(view, fps, &sink)
  }
}

impl DisplayOutput {
  pub fn open(view: Size, fps: i32, sink: &str) -> Result<Self, DisplayOutputError> {
    gst::init()?;

    let pipeline_desc = display_pipeline_description(sink);
    info!("创建显示管道: {}", pipeline_desc);

    let pipeline = gst::parse::launch(&pipeline_desc)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| DisplayOutputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(DisplayOutputError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| DisplayOutputError::AppSrcConversionFailed)?;

    let caps = gst::Caps::builder("video/x-raw")
      .field("format", "RGB")
      .field("width", view.width as i32)
      .field("height", view.height as i32)
      .field("framerate", gst::Fraction::new(fps, 1))
      .build();
    appsrc.set_caps(Some(&caps));
    appsrc.set_format(gst::Format::Time);

    pipeline.set_state(gst::State::Playing)?;
    info!("显示窗口已打开: {} @ {} fps", view, fps);

    Ok(DisplayOutput {
      pipeline,
      appsrc,
      view,
      fps,
      state: Mutex::new(ViewState::new()),
    })
  }

  fn push_frame(&self, data: Vec<u8>, frame_count: u64) -> Result<(), DisplayOutputError> {
    let frame_ns = 1_000_000_000 / self.fps as u64;
    let mut buffer = gst::Buffer::from_mut_slice(data);
    {
      let buffer_ref = buffer
        .get_mut()
        .ok_or_else(|| DisplayOutputError::PipelineError("Buffer is not writable".to_string()))?;
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(frame_count * frame_ns));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(frame_ns));
    }

    self.appsrc.push_buffer(buffer).map_err(|e| {
      DisplayOutputError::PipelineError(format!("Failed to push buffer: {:?}", e))
    })?;
    Ok(())
  }
}

impl Drop for DisplayOutput {
  fn drop(&mut self) {
    let _ = self.appsrc.end_of_stream();

    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop display pipeline: {}", e);
    }

    if let Ok(state) = self.state.lock() {
      info!("显示窗口关闭, 共显示 {} 帧", state.frame_count);
    }
  }
}

impl Render<ProcessedFrame, DetectResult> for DisplayOutput {
  type Error = DisplayOutputError;

  fn render_result(
    &self,
    frame: &ProcessedFrame,
    _result: &DetectResult,
  ) -> Result<(), Self::Error> {
    let (transform, frame_count) = self
      .state
      .lock()
      .map_err(|_| DisplayOutputError::StatePoisoned)?
      .advance(Size::of(&frame.annotated), self.view);

    let shown = transform.letterbox(&frame.annotated, self.view);
    self.push_frame(shown.into_raw(), frame_count)
  }
}
