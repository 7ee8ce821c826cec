// 该文件是 Qianli （千里眼） 项目的一部分。
// src/notify.rs - 面向用户的简短提示
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use tracing::warn;

pub const CAMERA_DISCONNECTED: &str = "相机已断开！";
pub const CAMERA_OPEN_FAILED: &str = "打开相机时出错！";
pub const CAMERA_PERMISSION_REQUIRED: &str = "需要相机权限才能继续，请授予对相机设备的读写权限";

/// 弹出一条简短提示（类似移动端的 toast）
pub trait Notifier: Send + Sync {
  fn notify(&self, message: &str);
}

/// 写入日志并打印到标准错误
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
  fn notify(&self, message: &str) {
    warn!("{}", message);
    eprintln!("[提示] {}", message);
  }
}

#[cfg(test)]
pub(crate) use memory::MemoryNotifier;
