// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 相册条目输入
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

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

use crate::FromUrl;

pub mod thumbnail;
pub use self::thumbnail::{DecodeError, ImageThumbnailLoader, ThumbnailCache, ThumbnailLoader};

#[cfg(feature = "directory_source")]
mod directory_source;
#[cfg(feature = "directory_source")]
pub use self::directory_source::{DirectoryItems, DirectorySource};

#[cfg(feature = "list_source")]
mod list_source;
#[cfg(feature = "list_source")]
pub use self::list_source::{ListItems, ListSource};

/// 能够被当作相册条目的文件扩展名（小写）。
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "gif", "tif", "tiff"];

/// 相册中的一个条目：只有标识与位置，不携带图像数据。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemHandle {
  id: u64,
  path: PathBuf,
  added: SystemTime,
}

impl ItemHandle {
  pub fn new(path: PathBuf, added: SystemTime) -> Self {
    Self {
      id: fingerprint(&path),
      path,
      added,
    }
  }

  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn added(&self) -> SystemTime {
    self.added
  }

  /// 条目的字符串标识，绝对路径时为 `file://` URL。
  pub fn source_ref(&self) -> String {
    match Url::from_file_path(&self.path) {
      Ok(url) => url.into(),
      Err(()) => self.path.display().to_string(),
    }
  }
}

fn fingerprint(path: &Path) -> u64 {
  let digest = Sha256::digest(path.as_os_str().as_encoded_bytes());
  let mut id = [0u8; 8];
  id.copy_from_slice(&digest[..8]);
  u64::from_be_bytes(id)
}

pub(crate) fn has_image_extension(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| {
      let ext = ext.to_ascii_lowercase();
      IMAGE_EXTENSIONS.contains(&ext.as_str())
    })
    .unwrap_or(false)
}

#[derive(Error, Debug)]
pub enum SourceError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
  #[error("无法查询输入源 {path}: {source}")]
  Query {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("输入源不是目录: {0}")]
  NotADirectory(PathBuf),
  #[error("读取输入源 {path} 第 {line} 行时出错: {source}")]
  Read {
    path: PathBuf,
    line: usize,
    #[source]
    source: std::io::Error,
  },
}

/// 按添加时间倒序枚举条目的输入源。
///
/// 每次调用 `enumerate` 都重新发起一次完整的有序查询；
/// 返回的迭代器每前进一步只做产出下一个条目所需的最少工作。
pub trait ItemSource {
  type Items: Iterator<Item = Result<ItemHandle, SourceError>>;

  fn enumerate(&self) -> Result<Self::Items, SourceError>;
}

#[derive(Error, Debug)]
pub enum InputError {
  #[error("输入源错误: {0}")]
  Source(#[from] SourceError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper {
  #[cfg(feature = "directory_source")]
  Directory(DirectorySource),
  #[cfg(feature = "list_source")]
  List(ListSource),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "directory_source")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == DirectorySource::SCHEME {
        return Ok(InputWrapper::Directory(DirectorySource::from_url(url)?));
      }
    }
    #[cfg(feature = "list_source")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ListSource::SCHEME {
        return Ok(InputWrapper::List(ListSource::from_url(url)?));
      }
    }
    Err(InputError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl ItemSource for InputWrapper {
  type Items = InputWrapperItems;

  fn enumerate(&self) -> Result<Self::Items, SourceError> {
    match self {
      #[cfg(feature = "directory_source")]
      InputWrapper::Directory(source) => source.enumerate().map(InputWrapperItems::Directory),
      #[cfg(feature = "list_source")]
      InputWrapper::List(source) => source.enumerate().map(InputWrapperItems::List),
    }
  }
}

pub enum InputWrapperItems {
  #[cfg(feature = "directory_source")]
  Directory(DirectoryItems),
  #[cfg(feature = "list_source")]
  List(ListItems),
}

impl Iterator for InputWrapperItems {
  type Item = Result<ItemHandle, SourceError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "directory_source")]
      InputWrapperItems::Directory(items) => items.next(),
      #[cfg(feature = "list_source")]
      InputWrapperItems::List(items) => items.next(),
    }
  }
}
