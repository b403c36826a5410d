// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/onnx.rs - ONNX 二分类模型
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

use std::fs::File;
use std::path::PathBuf;
use std::str::FromStr;

use memmap2::Mmap;
use tracing::{debug, info};
use tract_onnx::prelude::*;
use url::Url;

use crate::model::{Classifier, EngineError, EngineSlot, NormalizedTensor, OpenClassifier};
use crate::{FromUrl, FromUrlWithScheme, url_path};

/// MobileNetV2 标准尺寸
pub const DEFAULT_INPUT_EDGE: u32 = 224;

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorLayout {
  /// Keras 导出的模型
  #[default]
  Nhwc,
  Nchw,
}

impl FromStr for TensorLayout {
  type Err = EngineError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "nhwc" => Ok(TensorLayout::Nhwc),
      "nchw" => Ok(TensorLayout::Nchw),
      other => Err(EngineError::InvalidParameter(format!(
        "未知的张量布局: {}",
        other
      ))),
    }
  }
}

impl TensorLayout {
  fn input_shape(self, edge: usize) -> [usize; 4] {
    match self {
      TensorLayout::Nhwc => [1, edge, edge, 3],
      TensorLayout::Nchw => [1, 3, edge, edge],
    }
  }
}

/// `onnx:///path/to/model.onnx[?edge=224][&layout=nhwc]`
#[derive(Debug, Clone)]
pub struct OnnxClassifierBuilder {
  model_path: PathBuf,
  edge: u32,
  layout: TensorLayout,
}

impl FromUrlWithScheme for OnnxClassifierBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxClassifierBuilder {
  type Error = EngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(EngineError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }

    let mut builder = OnnxClassifierBuilder::new(url_path(url));
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "edge" => {
          let edge: u32 = v.parse().map_err(|_| {
            EngineError::InvalidParameter(format!("输入边长必须是正整数: {}", v))
          })?;
          if edge == 0 {
            return Err(EngineError::InvalidParameter("输入边长不能为 0".to_string()));
          }
          builder.edge = edge;
        }
        "layout" => builder.layout = v.parse()?,
        _ => {}
      }
    }

    Ok(builder)
  }
}

impl OnnxClassifierBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      edge: DEFAULT_INPUT_EDGE,
      layout: TensorLayout::default(),
    }
  }

  pub fn edge(mut self, edge: u32) -> Self {
    self.edge = edge.max(1);
    self
  }

  pub fn layout(mut self, layout: TensorLayout) -> Self {
    self.layout = layout;
    self
  }

  fn load_error(&self, reason: impl ToString) -> EngineError {
    EngineError::ModelLoad {
      path: self.model_path.clone(),
      reason: reason.to_string(),
    }
  }
}

impl OpenClassifier for OnnxClassifierBuilder {
  type Classifier = OnnxClassifier;

  fn open(self) -> Result<Self::Classifier, EngineError> {
    info!("加载模型文件: {}", self.model_path.display());
    let file = File::open(&self.model_path).map_err(|e| self.load_error(e))?;
    // SAFETY: 映射期间模型文件不得被截断或改写，否则读取映射内容是未定义行为；
    // 映射只读，本进程不会修改文件。
    let blob = unsafe { Mmap::map(&file) }.map_err(|e| self.load_error(e))?;
    debug!(
      "模型文件大小: {:.2} MB",
      blob.len() as f64 / (1024.0 * 1024.0)
    );

    let shape = self.layout.input_shape(self.edge as usize);
    let mut reader: &[u8] = &blob[..];
    let plan = tract_onnx::onnx()
      .model_for_read(&mut reader)
      .and_then(|model| model.with_input_fact(0, f32::fact(shape).into()))
      .and_then(|model| model.into_optimized())
      .and_then(|model| model.into_runnable())
      .map_err(|e| self.load_error(format!("{:#}", e)))?;
    info!("模型加载完成, 输入形状 {:?}", shape);

    Ok(OnnxClassifier {
      slot: EngineSlot::loaded(OnnxSession { plan, _blob: blob }),
      edge: self.edge,
      layout: self.layout,
    })
  }
}

struct OnnxSession {
  plan: OnnxPlan,
  // 引擎存活期间保持映射
  _blob: Mmap,
}

/// 基于 tract 的单 logit 二分类器。
pub struct OnnxClassifier {
  slot: EngineSlot<OnnxSession>,
  edge: u32,
  layout: TensorLayout,
}

impl OnnxClassifier {
  /// 按模型的张量布局组装 `[1, ...]` 输入。
  fn input_tensor(&self, tensor: &NormalizedTensor) -> Result<Tensor, EngineError> {
    if tensor.edge() != self.edge {
      return Err(EngineError::Inference(format!(
        "输入边长不匹配: 期望 {}, 实际 {}",
        self.edge,
        tensor.edge()
      )));
    }

    let shape = self.layout.input_shape(self.edge as usize);
    let data = match self.layout {
      TensorLayout::Nhwc => tensor.as_hwc().to_vec(),
      TensorLayout::Nchw => tensor.to_chw(),
    };
    let input = tract_ndarray::Array4::from_shape_vec(
      (shape[0], shape[1], shape[2], shape[3]),
      data,
    )
    .map_err(|e| EngineError::Inference(e.to_string()))?;
    Ok(input.into_tensor())
  }
}

impl Classifier for OnnxClassifier {
  fn input_edge(&self) -> u32 {
    self.edge
  }

  fn classify(&mut self, tensor: &NormalizedTensor) -> Result<f32, EngineError> {
    self.slot.get()?;
    let input = self.input_tensor(tensor)?;
    let session = self.slot.get_mut()?;

    debug!("执行模型推理");
    let outputs = session
      .plan
      .run(tvec!(input.into_tvalue()))
      .map_err(|e| EngineError::Inference(format!("{:#}", e)))?;

    // Dense(1) 输出形状为 [1, 1]，这是一个 logit
    let output = outputs
      .first()
      .ok_or_else(|| EngineError::Inference("模型没有输出".to_string()))?;
    let view = output
      .to_array_view::<f32>()
      .map_err(|e| EngineError::Inference(format!("{:#}", e)))?;
    view
      .iter()
      .next()
      .copied()
      .ok_or_else(|| EngineError::Inference("模型输出为空".to_string()))
  }

  fn close(&mut self) {
    if self.slot.close() {
      info!("模型已关闭");
    }
  }

  fn is_closed(&self) -> bool {
    self.slot.is_closed()
  }
}

impl Drop for OnnxClassifier {
  fn drop(&mut self) {
    self.close();
  }
}
