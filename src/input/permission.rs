// 该文件是 Qianli （千里眼） 项目的一部分。
// src/input/permission.rs - 相机访问权限
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  fs::OpenOptions,
  io::ErrorKind,
  path::Path,
  thread,
  time::Duration,
};

use thiserror::Error;
use tracing::{info, warn};

use crate::notify::{CAMERA_PERMISSION_REQUIRED, Notifier};

#[derive(Error, Debug)]
pub enum PermissionError {
  #[error("相机权限被拒绝（已尝试 {0} 次）")]
  Denied(u32),
  #[error("无法访问相机设备 {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

/// 被拒绝后多久再次请求；`max_attempts` 为 `None` 时无限重试
#[derive(Debug, Clone)]
pub struct PermissionPolicy {
  pub retry_interval: Duration,
  pub max_attempts: Option<u32>,
}

impl Default for PermissionPolicy {
  fn default() -> Self {
    Self {
      retry_interval: Duration::from_millis(1000),
      max_attempts: None,
    }
  }
}

/// 以读写方式打开设备节点来检查权限
pub fn check_device_access(path: &Path) -> std::io::Result<()> {
  OpenOptions::new()
    .read(true)
    .write(true)
    .open(path)
    .map(|_| ())
}

/// 请求相机权限直到获得为止，返回尝试次数
pub fn acquire(
  path: &Path,
  policy: &PermissionPolicy,
  notifier: &dyn Notifier,
) -> Result<u32, PermissionError> {
  acquire_with(path, policy, notifier, || check_device_access(path))
}

pub fn acquire_with<F>(
  path: &Path,
  policy: &PermissionPolicy,
  notifier: &dyn Notifier,
  mut check: F,
) -> Result<u32, PermissionError>
where
  F: FnMut() -> std::io::Result<()>,
{
  let mut attempts = 0u32;
  loop {
    attempts += 1;
    match check() {
      Ok(()) => {
        info!("已获得相机权限: {} (第 {} 次尝试)", path.display(), attempts);
        return Ok(attempts);
      }
      Err(e) if e.kind() == ErrorKind::PermissionDenied => {
        warn!("相机权限被拒绝: {} (第 {} 次尝试)", path.display(), attempts);
        notifier.notify(CAMERA_PERMISSION_REQUIRED);
        if policy.max_attempts.is_some_and(|max| attempts >= max) {
          return Err(PermissionError::Denied(attempts));
        }
        thread::sleep(policy.retry_interval);
      }
      Err(source) => {
        return Err(PermissionError::Io {
          path: path.display().to_string(),
          source,
        });
      }
    }
  }
}
