// 该文件是 Qianli （千里眼） 项目的一部分。
// src/input/lifecycle.rs - 相机句柄的打开、断开与出错处理
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::notify::{CAMERA_DISCONNECTED, CAMERA_OPEN_FAILED, Notifier};

pub trait CloseCamera {
  fn close(self);
}

/// 相机状态回调
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraEvent {
  Opened,
  Disconnected,
  Error(String),
}

/// 持有打开的相机；断开或出错时提示用户并关闭相机
pub struct CameraHandle<C: CloseCamera> {
  camera: Option<C>,
  name: String,
  notifier: Arc<dyn Notifier>,
}

impl<C: CloseCamera> CameraHandle<C> {
  pub fn new(camera: C, name: impl Into<String>, notifier: Arc<dyn Notifier>) -> Self {
    Self {
      camera: Some(camera),
      name: name.into(),
      notifier,
    }
  }

  pub fn camera(&self) -> Option<&C> {
    self.camera.as_ref()
  }

  pub fn is_open(&self) -> bool {
    self.camera.is_some()
  }

  pub fn handle_event(&mut self, event: CameraEvent) {
    if !self.is_open() {
      debug!("相机 {} 已关闭, 忽略事件 {:?}", self.name, event);
      return;
    }

    match event {
      CameraEvent::Opened => info!("相机已打开: {}", self.name),
      CameraEvent::Disconnected => {
        warn!("相机断开: {}", self.name);
        self.notifier.notify(CAMERA_DISCONNECTED);
        self.close();
      }
      CameraEvent::Error(detail) => {
        error!("相机错误 {}: {}", self.name, detail);
        self.notifier.notify(CAMERA_OPEN_FAILED);
        self.close();
      }
    }
  }

  /// 重复关闭无副作用
  pub fn close(&mut self) {
    if let Some(camera) = self.camera.take() {
      info!("关闭相机: {}", self.name);
      camera.close();
    }
  }
}

impl<C: CloseCamera> Drop for CameraHandle<C> {
  fn drop(&mut self) {
    self.close();
  }
}
