// 该文件是 Qianli （千里眼） 项目的一部分。
// src/labels.rs - 类别标签表
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{borrow::Cow, path::Path};

use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("无法读取标签文件 {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("标签文件为空: {0}")]
  Empty(String),
}

/// 按行存放的类别名称，第 `i` 行即类别 `i`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMap {
  labels: Box<[String]>,
}

impl LabelMap {
  pub fn load(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| LabelError::Io {
      path: path.display().to_string(),
      source,
    })?;

    let labels = Self::parse(&text);
    if labels.is_empty() {
      return Err(LabelError::Empty(path.display().to_string()));
    }

    info!("加载标签文件: {} ({} 个类别)", path.display(), labels.len());
    Ok(labels)
  }

  /// 逐行原样保留，只去掉行尾的 `\n` / `\r\n`
  pub fn parse(text: &str) -> Self {
    let labels: Vec<String> = text.lines().map(String::from).collect();
    debug!("解析到 {} 个标签", labels.len());
    Self {
      labels: labels.into_boxed_slice(),
    }
  }

  pub fn name(&self, class_id: u32) -> Option<&str> {
    self.labels.get(class_id as usize).map(String::as_str)
  }

  /// 找不到对应名称时显示为 `#<id>`
  pub fn display_name(&self, class_id: u32) -> Cow<'_, str> {
    match self.name(class_id) {
      Some(name) => Cow::Borrowed(name),
      None => Cow::Owned(format!("#{}", class_id)),
    }
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }
}

impl<S: Into<String>> FromIterator<S> for LabelMap {
  fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
    Self {
      labels: iter.into_iter().map(Into::into).collect(),
    }
  }
}
