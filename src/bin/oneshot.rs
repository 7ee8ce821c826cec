// 该文件是 Qianli （千里眼） 项目的一部分。
// src/bin/oneshot.rs - 单张图像检测
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
  input::InputWrapper,
  labels::LabelMap,
  model::SsdBuilder,
  output::{
    OutputWrapper,
    draw::{Annotator, find_font},
  },
  task::{OneShotTask, Task},
};
use tracing::info;

/// Qianli 单帧检测参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// SSD 模型，例如 ssd:///opt/qianli/detect.rknn
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  #[arg(long, value_name = "FILE", default_value = "labels.txt")]
  pub labels: PathBuf,
  #[arg(long, value_name = "THRESHOLD")]
  pub threshold: Option<f32>,
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let labels = LabelMap::load(&args.labels)?;
  let annotator = Annotator::new(labels, find_font(args.font.as_deref()));

  let input = InputWrapper::from_url(&args.input)?;
  let mut builder = SsdBuilder::from_url(&args.model)?;
  if let Some(threshold) = args.threshold {
    builder = builder.threshold(threshold);
  }
  let model = builder.build()?;
  let output = OutputWrapper::from_url(&args.output)?;

  OneShotTask::new(annotator).run_task(input, model, output)?;

  Ok(())
}
