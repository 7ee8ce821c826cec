// 该文件是 Qianli （千里眼） 项目的一部分。
// src/bin/live.rs - 相机实时检测预览
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use qianli::{
  FromUrl,
  input::{InputWrapper, discovery},
  labels::LabelMap,
  model::SsdBuilder,
  output::{
    OutputWrapper,
    draw::{Annotator, find_font},
  },
  task::{LiveTask, Task},
};
use tracing::info;

/// Qianli 实时检测参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// SSD 模型，例如 ssd:///opt/qianli/detect.rknn
  #[arg(long, value_name = "MODEL", required_unless_present = "list_cameras")]
  pub model: Option<Url>,
  /// 输入来源
  #[arg(long, value_name = "SOURCE", default_value = "camera://auto")]
  pub input: Url,
  /// 输出
  #[arg(long, value_name = "OUTPUT", default_value = "display://")]
  pub output: Url,
  /// 标签文件，每行一个类别
  #[arg(long, value_name = "FILE", default_value = "labels.txt")]
  pub labels: PathBuf,
  /// 置信度阈值
  #[arg(long, value_name = "THRESHOLD")]
  pub threshold: Option<f32>,
  /// 标签字体（TTF/OTF）
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
  /// 相机权限被拒绝后再次请求的间隔（毫秒）
  #[arg(long, value_name = "MS", default_value_t = 1000)]
  pub permission_retry_ms: u64,
  /// 列出可用相机后退出
  #[arg(long)]
  pub list_cameras: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  if args.list_cameras {
    for camera in discovery::list_cameras()? {
      println!(
        "{}\t{}\t{}",
        camera.path.display(),
        camera.name,
        camera
          .preview_size
          .map(|s| s.to_string())
          .unwrap_or_else(|| "-".to_string())
      );
    }
    return Ok(());
  }

  let model_url = args
    .model
    .ok_or_else(|| anyhow::anyhow!("缺少 --model 参数"))?;
  let mut input_url = args.input;
  if input_url.scheme() == "camera" && !input_url.query_pairs().any(|(k, _)| k == "retry_ms") {
    input_url
      .query_pairs_mut()
      .append_pair("retry_ms", &args.permission_retry_ms.to_string());
  }

  info!("模型文件路径: {}", model_url);
  info!("输入来源: {}", input_url);
  info!("输出路径: {}", args.output);

  let labels = LabelMap::load(&args.labels)?;
  info!("加载了 {} 个标签: {}", labels.len(), args.labels.display());
  let annotator = Annotator::new(labels, find_font(args.font.as_deref()));

  let output = OutputWrapper::from_url(&args.output)?;
  let input = InputWrapper::from_url(&input_url)?;

  let threshold = args.threshold;
  let factory = move || {
    let builder = SsdBuilder::from_url(&model_url)?;
    match threshold {
      Some(threshold) => builder.threshold(threshold).build(),
      None => builder.build(),
    }
  };

  LiveTask::new(annotator)
    .with_frame_number(args.frame_number)
    .with_interrupt(true)
    .run_task(input, factory, output)?;

  Ok(())
}
