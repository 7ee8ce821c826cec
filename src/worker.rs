// 该文件是 Qianli （千里眼） 项目的一部分。
// src/worker.rs - 视频线程：缩放、推理、绘制
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! 每个相机帧对应一个处理任务，全部交给唯一的 `video-thread` 按到达顺序执行。
//! 队列无上限，不去重、不丢帧、不取消；处理好的画面通过通道送回显示端。

use std::{
  fmt::Display,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
    mpsc::{self, Sender},
  },
  thread::{self, JoinHandle},
  time::Instant,
};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  frame::{CameraFrame, ProcessedFrame},
  model::{DetectResult, Model},
  output::draw::Annotator,
};

pub const VIDEO_THREAD_NAME: &str = "video-thread";

#[derive(Error, Debug)]
pub enum WorkerError {
  #[error("无法创建视频线程: {0}")]
  Spawn(#[from] std::io::Error),
  #[error("模型加载失败: {0}")]
  ModelBuild(String),
  #[error("视频线程已停止")]
  Stopped,
  #[error("视频线程异常退出")]
  Panicked,
}

pub struct FrameProcessor<M> {
  model: M,
  annotator: Annotator,
}

impl<M> FrameProcessor<M>
where
  M: Model<Input = CameraFrame, Output = DetectResult>,
{
  pub fn new(model: M, annotator: Annotator) -> Self {
    Self { model, annotator }
  }

  pub fn process(&self, frame: CameraFrame) -> Result<ProcessedFrame, M::Error> {
    let now = Instant::now();
    let result = self.model.infer(&frame)?;
    let annotated = self.annotator.annotate(&frame.image, &result);
    let elapsed = now.elapsed();
    debug!(
      "第 {} 帧 ({}x{}): {} 个目标, 耗时 {:.2?}",
      frame.index,
      frame.width(),
      frame.height(),
      result.len(),
      elapsed
    );

    Ok(ProcessedFrame {
      frame,
      annotated,
      result,
      elapsed,
    })
  }
}

/// 向视频线程投递帧；可克隆后交给采集线程
#[derive(Clone)]
pub struct FramePoster {
  jobs: Sender<CameraFrame>,
  pending: Arc<AtomicUsize>,
}

impl FramePoster {
  pub fn post(&self, frame: CameraFrame) -> Result<(), WorkerError> {
    self.pending.fetch_add(1, Ordering::SeqCst);
    self.jobs.send(frame).map_err(|_| {
      self.pending.fetch_sub(1, Ordering::SeqCst);
      WorkerError::Stopped
    })
  }

  /// 已投递但尚未处理完的帧数
  pub fn pending(&self) -> usize {
    self.pending.load(Ordering::SeqCst)
  }
}

pub struct VideoWorker {
  poster: Option<FramePoster>,
  handle: Option<JoinHandle<()>>,
}

impl VideoWorker {
  /// 在视频线程上用 `factory` 创建模型，模型就绪后才返回
  pub fn spawn<F, M, E>(
    factory: F,
    annotator: Annotator,
    results: Sender<ProcessedFrame>,
  ) -> Result<Self, WorkerError>
  where
    F: FnOnce() -> Result<M, E> + Send + 'static,
    E: Display,
    M: Model<Input = CameraFrame, Output = DetectResult>,
    M::Error: Display,
  {
    let (jobs, job_rx) = mpsc::channel::<CameraFrame>();
    let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
    let pending = Arc::new(AtomicUsize::new(0));
    let worker_pending = pending.clone();

    let handle = thread::Builder::new()
      .name(VIDEO_THREAD_NAME.to_string())
      .spawn(move || {
        let model = match factory() {
          Ok(model) => model,
          Err(e) => {
            let _ = ready_tx.send(Err(e.to_string()));
            return;
          }
        };
        let _ = ready_tx.send(Ok(()));
        info!("模型已在 {} 上就绪", VIDEO_THREAD_NAME);

        let processor = FrameProcessor::new(model, annotator);
        for frame in job_rx {
          let index = frame.index;
          let outcome = processor.process(frame);
          worker_pending.fetch_sub(1, Ordering::SeqCst);
          match outcome {
            Ok(processed) => {
              if results.send(processed).is_err() {
                warn!("显示端已关闭, 视频线程停止");
                break;
              }
            }
            Err(e) => error!("第 {} 帧处理失败, 跳过: {}", index, e),
          }
        }

        info!("视频线程退出, 释放模型");
      })?;

    match ready_rx.recv() {
      Ok(Ok(())) => {}
      Ok(Err(msg)) => {
        let _ = handle.join();
        return Err(WorkerError::ModelBuild(msg));
      }
      Err(_) => {
        let _ = handle.join();
        return Err(WorkerError::Panicked);
      }
    }

    Ok(Self {
      poster: Some(FramePoster { jobs, pending }),
      handle: Some(handle),
    })
  }

  pub fn poster(&self) -> Result<FramePoster, WorkerError> {
    self.poster.clone().ok_or(WorkerError::Stopped)
  }

  /// 不再接收新帧；已排队的帧仍会处理完
  pub fn close_queue(&mut self) {
    self.poster = None;
  }

  /// 等待视频线程处理完队列并退出；其他 `FramePoster` 需先释放
  pub fn join(mut self) -> Result<(), WorkerError> {
    self.close_queue();
    match self.handle.take() {
      Some(handle) => handle.join().map_err(|_| WorkerError::Panicked),
      None => Ok(()),
    }
  }
}

impl Drop for VideoWorker {
  fn drop(&mut self) {
    self.close_queue();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{labels::LabelMap, model::DetectItem};
  use image::{Rgb, RgbImage};
  use std::{sync::Mutex, time::Duration};

  #[derive(Default)]
  struct FakeModel {
    threads: Arc<Mutex<Vec<String>>>,
    delay: Duration,
    fail_on: Option<u64>,
  }

  impl Model for FakeModel {
    type Input = CameraFrame;
    type Output = DetectResult;
    type Error = String;

    fn infer(&self, input: &CameraFrame) -> Result<DetectResult, String> {
      thread::sleep(self.delay);
      if let Ok(mut threads) = self.threads.lock() {
        threads.push(thread::current().name().unwrap_or_default().to_string());
      }
      if self.fail_on == Some(input.index) {
        return Err(format!("bad frame {}", input.index));
      }
      Ok(
        [DetectItem {
          slot: 0,
          class_id: input.index as u32,
          score: 0.9,
          bbox: [0.25, 0.25, 0.75, 0.75],
        }]
        .into_iter()
        .collect(),
      )
    }
  }

  fn annotator() -> Annotator {
    Annotator::new(["person"].into_iter().collect::<LabelMap>(), None)
  }

  fn frame(index: u64) -> CameraFrame {
    CameraFrame::new(RgbImage::from_pixel(32, 24, Rgb([200, 200, 200])), index, index)
  }

  #[test]
  fn processes_every_frame_in_order_on_video_thread() {
    let threads = Arc::new(Mutex::new(Vec::new()));
    let model = FakeModel {
      threads: threads.clone(),
      delay: Duration::from_millis(2),
      fail_on: None,
    };
    let (tx, rx) = mpsc::channel();
    let worker = VideoWorker::spawn(move || Ok::<_, String>(model), annotator(), tx).unwrap();

    let poster = worker.poster().unwrap();
    for index in 0..20 {
      poster.post(frame(index)).unwrap();
    }
    drop(poster);
    worker.join().unwrap();

    let indices: Vec<u64> = rx.iter().map(|p| p.frame.index).collect();
    assert_eq!(indices, (0..20).collect::<Vec<_>>());

    let threads = threads.lock().unwrap();
    assert_eq!(threads.len(), 20);
    assert!(threads.iter().all(|name| name == VIDEO_THREAD_NAME));
  }

  #[test]
  fn annotated_copy_leaves_frame_untouched() {
    let (tx, rx) = mpsc::channel();
    let worker =
      VideoWorker::spawn(|| Ok::<_, String>(FakeModel::default()), annotator(), tx).unwrap();
    worker.poster().unwrap().post(frame(0)).unwrap();
    worker.join().unwrap();

    let processed = rx.recv().unwrap();
    assert_eq!(processed.result.len(), 1);
    assert!(processed.frame.image.pixels().all(|p| *p == Rgb([200, 200, 200])));
    assert_ne!(processed.annotated, processed.frame.image);
  }

  #[test]
  fn failed_frame_is_skipped() {
    let model = FakeModel {
      fail_on: Some(1),
      ..Default::default()
    };
    let (tx, rx) = mpsc::channel();
    let worker = VideoWorker::spawn(move || Ok::<_, String>(model), annotator(), tx).unwrap();
    let poster = worker.poster().unwrap();
    for index in 0..3 {
      poster.post(frame(index)).unwrap();
    }
    drop(poster);
    worker.join().unwrap();

    let indices: Vec<u64> = rx.iter().map(|p| p.frame.index).collect();
    assert_eq!(indices, vec![0, 2]);
  }

  #[test]
  fn model_build_failure_is_reported() {
    let (tx, _rx) = mpsc::channel();
    let err = match VideoWorker::spawn(
      || Err::<FakeModel, _>("missing model".to_string()),
      annotator(),
      tx,
    ) {
      Err(e) => e,
      Ok(_) => panic!("worker should not start"),
    };
    assert!(matches!(err, WorkerError::ModelBuild(msg) if msg == "missing model"));
  }

  #[test]
  fn closed_queue_drains_outstanding_posters() {
    let (tx, rx) = mpsc::channel();
    let mut worker =
      VideoWorker::spawn(|| Ok::<_, String>(FakeModel::default()), annotator(), tx).unwrap();
    let poster = worker.poster().unwrap();
    worker.close_queue();
    assert!(matches!(worker.poster(), Err(WorkerError::Stopped)));

    poster.post(frame(7)).unwrap();
    drop(poster);
    worker.join().unwrap();

    let indices: Vec<u64> = rx.iter().map(|p| p.frame.index).collect();
    assert_eq!(indices, vec![7]);
  }
}
