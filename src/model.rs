// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 二分类模型
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

use std::path::PathBuf;

use thiserror::Error;

pub mod decision;
pub mod preprocess;

pub use self::preprocess::{NormalizedTensor, Preprocessor};

#[cfg(feature = "model_onnx")]
mod onnx;
#[cfg(feature = "model_onnx")]
pub use self::onnx::{OnnxClassifier, OnnxClassifierBuilder, TensorLayout};

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("模型加载错误 {path}: {reason}")]
  ModelLoad { path: PathBuf, reason: String },
  #[error("模型已关闭")]
  Closed,
  #[error("模型尚未加载")]
  NotLoaded,
  #[error("推理错误: {0}")]
  Inference(String),
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
  #[error("模型参数错误: {0}")]
  InvalidParameter(String),
}

impl EngineError {
  /// 引擎本身已不可用，后续推理注定失败。
  pub fn is_fatal(&self) -> bool {
    matches!(self, EngineError::Closed | EngineError::NotLoaded)
  }
}

/// 输出单个 logit 的二分类模型。
///
/// `classify` 需要 `&mut self`，同一个引擎上的推理只能串行进行。
pub trait Classifier {
  /// 模型输入的边长（正方形输入）。
  fn input_edge(&self) -> u32;

  fn classify(&mut self, tensor: &NormalizedTensor) -> Result<f32, EngineError>;

  /// 释放模型资源，可重复调用。
  fn close(&mut self);

  fn is_closed(&self) -> bool;
}

/// 打开一个模型，得到处于已加载状态的引擎。
pub trait OpenClassifier {
  type Classifier: Classifier;

  fn open(self) -> Result<Self::Classifier, EngineError>;
}

/// 引擎资源的生命周期：未初始化 → 已加载 → 已关闭。
#[derive(Debug, Default)]
pub enum EngineSlot<T> {
  #[default]
  Uninitialized,
  Loaded(T),
  Closed,
}

impl<T> EngineSlot<T> {
  pub fn loaded(inner: T) -> Self {
    EngineSlot::Loaded(inner)
  }

  pub fn get_mut(&mut self) -> Result<&mut T, EngineError> {
    match self {
      EngineSlot::Loaded(inner) => Ok(inner),
      EngineSlot::Closed => Err(EngineError::Closed),
      EngineSlot::Uninitialized => Err(EngineError::NotLoaded),
    }
  }

  pub fn get(&self) -> Result<&T, EngineError> {
    match self {
      EngineSlot::Loaded(inner) => Ok(inner),
      EngineSlot::Closed => Err(EngineError::Closed),
      EngineSlot::Uninitialized => Err(EngineError::NotLoaded),
    }
  }

  /// 关闭并释放资源；只有真正发生状态转换时返回 `true`。
  pub fn close(&mut self) -> bool {
    match std::mem::replace(self, EngineSlot::Closed) {
      EngineSlot::Loaded(inner) => {
        drop(inner);
        true
      }
      EngineSlot::Uninitialized | EngineSlot::Closed => false,
    }
  }

  pub fn is_closed(&self) -> bool {
    matches!(self, EngineSlot::Closed)
  }
}
