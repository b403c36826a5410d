// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/preprocess.rs - 模型输入预处理
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

use std::borrow::Cow;

use image::{RgbImage, imageops::FilterType};

use crate::frame::{RGB_CHANNELS, RgbFrame};

/// MobileNetV2 要求输入范围是 [-1, 1]：(pixel - 127.5) / 127.5
pub const NORMALIZE_MEAN: f32 = 127.5;
pub const NORMALIZE_STD: f32 = 127.5;

/// HWC 排列、取值在 [-1, 1] 的模型输入。
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
  edge: u32,
  data: Vec<f32>,
}

impl NormalizedTensor {
  pub fn edge(&self) -> u32 {
    self.edge
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn as_hwc(&self) -> &[f32] {
    &self.data
  }

  pub fn into_hwc(self) -> Vec<f32> {
    self.data
  }

  /// 转为 CHW 排列。
  pub fn to_chw(&self) -> Vec<f32> {
    let plane = (self.edge * self.edge) as usize;
    let mut chw = vec![0f32; plane * RGB_CHANNELS];
    for (i, pixel) in self.data.chunks_exact(RGB_CHANNELS).enumerate() {
      for (c, value) in pixel.iter().enumerate() {
        chw[c * plane + i] = *value;
      }
    }
    chw
  }
}

/// 缩放到模型输入边长（双线性），再逐通道归一化。
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
  edge: u32,
}

impl Preprocessor {
  pub fn new(edge: u32) -> Self {
    Self { edge: edge.max(1) }
  }

  pub fn edge(&self) -> u32 {
    self.edge
  }

  pub fn normalize<const W: u32, const H: u32>(&self, frame: &RgbFrame<W, H>) -> NormalizedTensor {
    let pixels: Cow<'_, [u8]> = if (W, H) == (self.edge, self.edge) {
      Cow::Borrowed(frame.as_hwc())
    } else {
      let resized = image::imageops::resize(
        &frame.to_rgb_image(),
        self.edge,
        self.edge,
        FilterType::Triangle,
      );
      Cow::Owned(RgbImage::into_raw(resized))
    };

    let data = pixels
      .iter()
      .map(|&v| (v as f32 - NORMALIZE_MEAN) / NORMALIZE_STD)
      .collect();

    NormalizedTensor {
      edge: self.edge,
      data,
    }
  }
}
