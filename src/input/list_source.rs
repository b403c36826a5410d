// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/list_source.rs - 清单文件输入源
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

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::info;
use url::Url;

use crate::input::{ItemHandle, ItemSource, SourceError};
use crate::{FromUrl, FromUrlWithScheme, url_path};

/// 以清单文件描述的相册，`list:///path/to/items.txt`。
///
/// 每行一个条目路径，空行与 `#` 开头的行被忽略。
/// 清单本身已按添加时间倒序排列，逐行读取即为枚举顺序；
/// 相对路径相对于清单所在目录解析。
#[derive(Debug, Clone)]
pub struct ListSource {
  list: PathBuf,
}

impl FromUrlWithScheme for ListSource {
  const SCHEME: &'static str = "list";
}

impl FromUrl for ListSource {
  type Error = SourceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(SourceError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }

    Ok(ListSource {
      list: url_path(url),
    })
  }
}

impl ListSource {
  pub fn new(list: impl Into<PathBuf>) -> Self {
    Self { list: list.into() }
  }
}

impl ItemSource for ListSource {
  type Items = ListItems;

  fn enumerate(&self) -> Result<Self::Items, SourceError> {
    info!("读取相册清单: {}", self.list.display());
    let file = File::open(&self.list).map_err(|source| SourceError::Query {
      path: self.list.clone(),
      source,
    })?;
    let base = self
      .list
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_default();

    Ok(ListItems {
      list: self.list.clone(),
      base,
      lines: BufReader::new(file).lines(),
      line: 0,
      done: false,
    })
  }
}

pub struct ListItems {
  list: PathBuf,
  base: PathBuf,
  lines: Lines<BufReader<File>>,
  line: usize,
  done: bool,
}

impl Iterator for ListItems {
  type Item = Result<ItemHandle, SourceError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.done {
      return None;
    }

    loop {
      let line = match self.lines.next() {
        Some(line) => line,
        None => {
          self.done = true;
          return None;
        }
      };
      self.line += 1;

      let line = match line {
        Ok(line) => line,
        Err(source) => {
          self.done = true;
          return Some(Err(SourceError::Read {
            path: self.list.clone(),
            line: self.line,
            source,
          }));
        }
      };

      let entry = line.trim();
      if entry.is_empty() || entry.starts_with('#') {
        continue;
      }

      let path = self.base.join(entry);
      let added = fs::metadata(&path)
        .and_then(|metadata| metadata.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH);
      return Some(Ok(ItemHandle::new(path, added)));
    }
  }
}
