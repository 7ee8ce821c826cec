// 该文件是 Qianli （千里眼） 项目的一部分。
// src/model/ssd_rknn.rs - 基于 RKNN 运行时的 SSD 检测模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{AsNhwcFrame, CameraFrame},
  model::{DetectResult, Model, SSD_DEFAULT_THRESHOLD, SsdInput, SsdOutput},
  utils::{decode_url_path, query_map, query_value},
};

const SSD_NUM_INPUTS: u32 = 1;
const SSD_NUM_OUTPUTS: u32 = 4;

const SSD_OUTPUT_LOCATIONS: usize = 0;
const SSD_OUTPUT_CLASSES: usize = 1;
const SSD_OUTPUT_SCORES: usize = 2;
const SSD_OUTPUT_NUM_DETECTIONS: usize = 3;

/// 加载到 NPU 上的 SSD 模型；drop 时释放推理上下文
pub struct Ssd {
  context: Context,
  threshold: f32,
}

#[derive(Error, Debug)]
pub enum SsdError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(rknpu::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("读取第 {0} 个输出失败: {1}")]
  OutputError(usize, String),
  #[error("输出形状不匹配: 位置数组 {locations} 个值, 置信度数组 {scores} 个值")]
  OutputShapeMismatch { locations: usize, scores: usize },
}

impl From<std::io::Error> for SsdError {
  fn from(err: std::io::Error) -> Self {
    SsdError::ModelLoadError(err)
  }
}

impl From<rknpu::Error> for SsdError {
  fn from(err: rknpu::Error) -> Self {
    SsdError::RknnError(err)
  }
}

impl SsdError {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    SsdError::ModelInvalid(msg.to_string(), e)
  }
}

pub struct SsdBuilder {
  model_path: String,
  threshold: f32,
}

impl FromUrlWithScheme for SsdBuilder {
  const SCHEME: &'static str = "ssd";
}

impl FromUrl for SsdBuilder {
  type Error = SsdError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(SsdError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let query = query_map(url);
    Ok(SsdBuilder {
      model_path: decode_url_path(url),
      threshold: query_value(&query, "threshold").unwrap_or(SSD_DEFAULT_THRESHOLD),
    })
  }
}

impl SsdBuilder {
  pub fn threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn build(self) -> Result<Ssd, SsdError> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, InitFlags::default())?;

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          debug!("模型 API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          debug!("模型驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!("查询 SDK 版本失败: {}", e);
        return Err(SsdError::invalid("无法查询 SDK 版本", e));
      }
    }

    let num_inputs = context
      .num_inputs()
      .map_err(|e| SsdError::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| SsdError::invalid("无法获取输出数量", e))?;

    if num_inputs != SSD_NUM_INPUTS || num_outputs != SSD_NUM_OUTPUTS {
      let msg = format!(
        "预期模型为 {} 个输入 / {} 个输出, 实际为 {} / {}",
        SSD_NUM_INPUTS, SSD_NUM_OUTPUTS, num_inputs, num_outputs
      );
      error!("{}", msg);
      return Err(SsdError::invalid(&msg, rknpu::Error::InvalidModel));
    }

    info!("模型加载完成, 置信度阈值: {}", self.threshold);
    Ok(Ssd {
      context,
      threshold: self.threshold,
    })
  }
}

impl Ssd {
  fn postprocess(output: &rknpu::Output) -> Result<SsdOutput, SsdError> {
    let read = |index: usize| -> Result<Vec<f32>, SsdError> {
      output
        .get_f32(index)
        .map(|data| data.to_vec())
        .map_err(|e| SsdError::OutputError(index, e.to_string()))
    };

    let locations = read(SSD_OUTPUT_LOCATIONS)?;
    let classes = read(SSD_OUTPUT_CLASSES)?;
    let scores = read(SSD_OUTPUT_SCORES)?;
    let num_detections = read(SSD_OUTPUT_NUM_DETECTIONS)?
      .first()
      .copied()
      .unwrap_or(0.0);

    if locations.len() != scores.len() * 4 {
      return Err(SsdError::OutputShapeMismatch {
        locations: locations.len(),
        scores: scores.len(),
      });
    }

    Ok(SsdOutput {
      locations,
      classes,
      scores,
      num_detections,
    })
  }
}

impl Model for Ssd {
  type Input = CameraFrame;
  type Output = DetectResult;
  type Error = SsdError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let tensor = SsdInput::resized_from(&input.image);

    debug!("设置模型输入");
    self.context.set_input(
      0,
      tensor.as_nhwc(),
      TensorFormat::NHWC,
      TensorType::UInt8,
    )?;

    debug!("执行模型推理");
    self.context.run()?;

    let output = self.context.get_outputs()?;
    let raw = Self::postprocess(&output)?;
    debug!("模型原始输出: {:?}", raw);

    Ok(raw.decode(self.threshold))
  }
}
