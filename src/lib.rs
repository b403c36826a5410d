// 该文件是 Shanan （山南西风） 项目的一部分。
// src/lib.rs - 库主文件
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

//! 相册流式扫描：枚举 → 缩略图 → 预处理 → 单模型推理 → 阈值判定 → 逐条输出。

pub mod frame;
pub mod input;
pub mod model;
pub mod output;
pub mod stream;
pub mod task;

pub use crate::model::decision::{Decision, DecisionPolicy, Label, ScanResult, Threshold};
pub use crate::stream::{ScanEvent, ScanStream};
pub use crate::task::{CancelToken, ScanConfig, ScanError, ScanReport, ScanState, ScanTask};

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// 取出 URL 中的本地路径（百分号解码）。
pub fn url_path(url: &url::Url) -> std::path::PathBuf {
  match urlencoding::decode(url.path()) {
    Ok(path) => std::path::PathBuf::from(path.into_owned()),
    Err(_) => std::path::PathBuf::from(url.path()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn url_path_is_percent_decoded() {
    let url = url::Url::parse("gallery:///home/me/My%20Photos").unwrap();
    assert_eq!(url_path(&url), std::path::PathBuf::from("/home/me/My Photos"));
  }
}
