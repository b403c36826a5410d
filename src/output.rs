// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output.rs - 输出定义
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

use thiserror::Error;
use url::Url;

use crate::FromUrl;
use crate::FromUrlWithScheme;
use crate::model::decision::ScanResult;
use crate::task::{ScanError, ScanReport};

/// 扫描结果的去向。`render_result` 按枚举顺序逐条调用。
pub trait Render {
  type Error;

  fn render_start(&mut self) -> Result<(), Self::Error> {
    Ok(())
  }

  fn render_result(&mut self, result: &ScanResult) -> Result<(), Self::Error>;

  fn render_finish(&mut self, outcome: Result<&ScanReport, &ScanError>) -> Result<(), Self::Error>;
}

mod console_output;
pub use self::console_output::ConsoleOutput;

#[cfg(feature = "jsonl_output")]
mod jsonl_output;
#[cfg(feature = "jsonl_output")]
pub use self::jsonl_output::JsonLinesOutput;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  Json(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  Console(ConsoleOutput),
  #[cfg(feature = "jsonl_output")]
  JsonLines(JsonLinesOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ConsoleOutput::SCHEME => Ok(OutputWrapper::Console(ConsoleOutput::from_url(url)?)),
      #[cfg(feature = "jsonl_output")]
      JsonLinesOutput::SCHEME => Ok(OutputWrapper::JsonLines(JsonLinesOutput::from_url(url)?)),
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Render for OutputWrapper {
  type Error = OutputError;

  fn render_start(&mut self) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Console(output) => output.render_start(),
      #[cfg(feature = "jsonl_output")]
      OutputWrapper::JsonLines(output) => output.render_start(),
    }
  }

  fn render_result(&mut self, result: &ScanResult) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Console(output) => output.render_result(result),
      #[cfg(feature = "jsonl_output")]
      OutputWrapper::JsonLines(output) => output.render_result(result),
    }
  }

  fn render_finish(&mut self, outcome: Result<&ScanReport, &ScanError>) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Console(output) => output.render_finish(outcome),
      #[cfg(feature = "jsonl_output")]
      OutputWrapper::JsonLines(output) => output.render_finish(outcome),
    }
  }
}
