// 该文件是 Qianli （千里眼） 项目的一部分。
// src/task.rs - 单帧任务与实时预览任务
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

use std::{
  fmt::Display,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Receiver, RecvTimeoutError},
  },
  thread,
  time::Duration,
};

use tracing::{info, warn};

use crate::{
  frame::{CameraFrame, ProcessedFrame},
  model::{DetectResult, Model},
  output::{Render, draw::Annotator},
  worker::{FrameProcessor, VideoWorker},
};

const DISPLAY_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 取一帧，推理并输出
pub struct OneShotTask {
  annotator: Annotator,
}

impl OneShotTask {
  pub fn new(annotator: Annotator) -> Self {
    Self { annotator }
  }
}

impl<I, M, O> Task<I, M, O> for OneShotTask
where
  I: Iterator<Item = CameraFrame>,
  M: Model<Input = CameraFrame, Output = DetectResult>,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render<ProcessedFrame, DetectResult>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let processor = FrameProcessor::new(model, self.annotator);
    let processed = processor.process(frame)?;
    info!(
      "推理完成，检测到 {} 个目标，耗时: {:.2?}",
      processed.result.len(),
      processed.elapsed
    );
    output.render_result(&processed, &processed.result)?;
    info!("渲染完成");

    Ok(())
  }
}

/// 相机线程采集 -> 视频线程推理绘制 -> 当前线程显示
pub struct LiveTask {
  annotator: Annotator,
  frame_number: Option<usize>,
  interrupt: bool,
}

impl LiveTask {
  pub fn new(annotator: Annotator) -> Self {
    Self {
      annotator,
      frame_number: None,
      interrupt: false,
    }
  }

  /// 显示指定帧数后退出
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 是否响应 Ctrl-C
  pub fn with_interrupt(mut self, interrupt: bool) -> Self {
    self.interrupt = interrupt;
    self
  }

  fn install_interrupt(stop: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      stop.store(true, Ordering::SeqCst);
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
    .map_err(|e| anyhow::anyhow!("无法设置 Ctrl-C 处理函数: {}", e))
  }

  fn display_loop<O>(
    &self,
    results: &Receiver<ProcessedFrame>,
    output: &O,
    stop: &AtomicBool,
  ) -> anyhow::Result<usize>
  where
    O: Render<ProcessedFrame, DetectResult>,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    let mut shown = 0usize;
    while !stop.load(Ordering::SeqCst) {
      match results.recv_timeout(DISPLAY_POLL_INTERVAL) {
        Ok(processed) => {
          output.render_result(&processed, &processed.result)?;
          shown += 1;
          info!(
            "显示第 {} 帧, {} 个目标, 处理耗时 {:.2?}",
            processed.frame.index,
            processed.result.len(),
            processed.elapsed
          );
          if self.frame_number.is_some_and(|n| shown >= n) {
            info!("达到指定帧数 {}, 退出显示循环", shown);
            break;
          }
        }
        Err(RecvTimeoutError::Timeout) => continue,
        Err(RecvTimeoutError::Disconnected) => {
          info!("视频线程已结束");
          break;
        }
      }
    }
    Ok(shown)
  }
}

impl<I, F, M, E, O> Task<I, F, O> for LiveTask
where
  I: Iterator<Item = CameraFrame> + Send + 'static,
  F: FnOnce() -> Result<M, E> + Send + 'static,
  E: Display,
  M: Model<Input = CameraFrame, Output = DetectResult>,
  M::Error: Display,
  O: Render<ProcessedFrame, DetectResult>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, factory: F, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let stop = Arc::new(AtomicBool::new(false));
    if self.interrupt {
      Self::install_interrupt(stop.clone())?;
    }

    let (results_tx, results_rx) = mpsc::channel();
    let mut worker = VideoWorker::spawn(factory, self.annotator.clone(), results_tx)?;
    let poster = worker.poster()?;
    worker.close_queue();

    let camera_stop = stop.clone();
    let limit = self.frame_number.unwrap_or(usize::MAX);
    let camera = thread::Builder::new()
      .name("camera-thread".to_string())
      .spawn(move || {
        for frame in input.take(limit) {
          if camera_stop.load(Ordering::SeqCst) {
            break;
          }
          if poster.post(frame).is_err() {
            warn!("视频线程已停止, 不再投递帧");
            break;
          }
        }
        info!("相机采集结束, 待处理 {} 帧", poster.pending());
      })?;

    let outcome = self.display_loop(&results_rx, &output, &stop);

    stop.store(true, Ordering::SeqCst);
    drop(results_rx);
    if camera.join().is_err() {
      warn!("相机线程异常退出");
    }
    worker.join()?;

    let shown = outcome?;
    info!("任务完成，共显示 {} 帧，退出", shown);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{labels::LabelMap, model::DetectItem};
  use image::{Rgb, RgbImage};
  use std::sync::Mutex;

  struct CountingModel;

  impl Model for CountingModel {
    type Input = CameraFrame;
    type Output = DetectResult;
    type Error = std::io::Error;

    fn infer(&self, input: &CameraFrame) -> Result<DetectResult, Self::Error> {
      Ok(
        [DetectItem {
          slot: input.index as usize,
          class_id: 0,
          score: 0.75,
          bbox: [0.1, 0.1, 0.5, 0.5],
        }]
        .into_iter()
        .collect(),
      )
    }
  }

  #[derive(Default)]
  struct RecordingOutput {
    slots: Mutex<Vec<usize>>,
  }

  impl Render<ProcessedFrame, DetectResult> for &RecordingOutput {
    type Error = std::io::Error;

    fn render_result(
      &self,
      _frame: &ProcessedFrame,
      result: &DetectResult,
    ) -> Result<(), Self::Error> {
      let mut slots = self.slots.lock().map_err(|_| std::io::Error::other("poisoned"))?;
      slots.extend(result.iter().map(|item| item.slot));
      Ok(())
    }
  }

  fn annotator() -> Annotator {
    Annotator::new(["person"].into_iter().collect::<LabelMap>(), None)
  }

  fn frames(count: u64) -> impl Iterator<Item = CameraFrame> + Send + 'static {
    (0..count).map(|index| {
      CameraFrame::new(RgbImage::from_pixel(40, 30, Rgb([0, 0, 0])), index, index * 33)
    })
  }

  #[test]
  fn live_task_shows_every_frame_in_order() {
    let output = RecordingOutput::default();
    LiveTask::new(annotator())
      .run_task(frames(12), || Ok::<_, String>(CountingModel), &output)
      .unwrap();
    assert_eq!(*output.slots.lock().unwrap(), (0..12).collect::<Vec<_>>());
  }

  #[test]
  fn live_task_stops_at_frame_number() {
    let output = RecordingOutput::default();
    LiveTask::new(annotator())
      .with_frame_number(Some(5))
      .run_task(frames(50), || Ok::<_, String>(CountingModel), &output)
      .unwrap();
    assert_eq!(*output.slots.lock().unwrap(), vec![0, 1, 2, 3, 4]);
  }

  #[test]
  fn live_task_reports_model_failure() {
    let output = RecordingOutput::default();
    let err = LiveTask::new(annotator())
      .run_task(
        frames(3),
        || Err::<CountingModel, _>("no model".to_string()),
        &output,
      )
      .unwrap_err();
    assert!(err.to_string().contains("no model"));
  }

  #[test]
  fn one_shot_renders_first_frame() {
    let output = RecordingOutput::default();
    OneShotTask::new(annotator())
      .run_task(frames(3), CountingModel, &output)
      .unwrap();
    assert_eq!(*output.slots.lock().unwrap(), vec![0]);
  }

  #[test]
  fn one_shot_without_frames_fails() {
    let output = RecordingOutput::default();
    let err = OneShotTask::new(annotator())
      .run_task(std::iter::empty(), CountingModel, &output)
      .unwrap_err();
    assert!(err.to_string().contains("没有输入帧"));
  }

  #[cfg(feature = "directory_record")]
  #[test]
  fn one_shot_json_record_saves_raw_frame() {
    use crate::{FromUrl, output::OutputWrapper};

    let tmp = tempfile::tempdir().unwrap();
    let url = url::Url::parse(&format!("folder://{}?record=json", tmp.path().display())).unwrap();
    let output = OutputWrapper::from_url(&url).unwrap();
    let raw = RgbImage::from_pixel(40, 40, Rgb([30, 60, 90]));
    let input = std::iter::once(CameraFrame::new(raw.clone(), 0, 0));

    OneShotTask::new(annotator())
      .run_task(input, CountingModel, output)
      .unwrap();

    let mut stack = vec![tmp.path().to_path_buf()];
    let mut png = None;
    while let Some(dir) = stack.pop() {
      for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else if path.extension().is_some_and(|ext| ext == "png") {
          png = Some(path);
        }
      }
    }
    let saved = image::open(png.unwrap()).unwrap().to_rgb8();
    assert_eq!(saved, raw);
  }
}
