// 该文件是 Qianli （千里眼） 项目的一部分。
// src/utils.rs - URL 解析辅助函数
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{collections::HashMap, str::FromStr};

use tracing::warn;
use url::Url;

/// 取出 URL 中的路径并做百分号解码（`%20` -> 空格）
pub fn decode_url_path(url: &Url) -> String {
  match urlencoding::decode(url.path()) {
    Ok(path) => path.into_owned(),
    Err(e) => {
      warn!("URL 路径解码失败, 使用原始路径 '{}': {}", url.path(), e);
      url.path().to_string()
    }
  }
}

pub fn query_map(url: &Url) -> HashMap<String, String> {
  url
    .query_pairs()
    .map(|(k, v)| (String::from(k), String::from(v)))
    .collect()
}

/// 读取并解析查询参数，缺失或无法解析时返回 `None`
pub fn query_value<T: FromStr>(query: &HashMap<String, String>, key: &str) -> Option<T> {
  let raw = query.get(key)?;
  match raw.parse::<T>() {
    Ok(value) => Some(value),
    Err(_) => {
      warn!("无法解析查询参数 {}={}, 使用默认值", key, raw);
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decodes_percent_encoded_path() {
    let url = Url::parse("image:///tmp/my%20photos/cat.png").unwrap();
    assert_eq!(decode_url_path(&url), "/tmp/my photos/cat.png");
  }

  #[test]
  fn query_value_falls_back_on_garbage() {
    let url = Url::parse("display://?width=800&height=abc").unwrap();
    let query = query_map(&url);
    assert_eq!(query_value::<u32>(&query, "width"), Some(800));
    assert_eq!(query_value::<u32>(&query, "height"), None);
    assert_eq!(query_value::<u32>(&query, "fps"), None);
  }
}
