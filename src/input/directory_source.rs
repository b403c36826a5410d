// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/directory_source.rs - 目录相册输入源
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

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;

use tracing::{debug, info, warn};
use url::Url;

use crate::input::{ItemHandle, ItemSource, SourceError, has_image_extension};
use crate::{FromUrl, FromUrlWithScheme, url_path};

/// 本地目录形式的相册，`gallery:///path/to/photos[?recursive]`。
#[derive(Debug, Clone)]
pub struct DirectorySource {
  root: PathBuf,
  recursive: bool,
}

impl FromUrlWithScheme for DirectorySource {
  const SCHEME: &'static str = "gallery";
}

impl FromUrl for DirectorySource {
  type Error = SourceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(SourceError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }

    let recursive = url.query_pairs().any(|(k, _)| k == "recursive");

    Ok(DirectorySource {
      root: url_path(url),
      recursive,
    })
  }
}

impl DirectorySource {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      recursive: false,
    }
  }

  pub fn with_recursive(mut self, recursive: bool) -> Self {
    self.recursive = recursive;
    self
  }

  pub fn root(&self) -> &std::path::Path {
    &self.root
  }
}

impl ItemSource for DirectorySource {
  type Items = DirectoryItems;

  fn enumerate(&self) -> Result<Self::Items, SourceError> {
    info!("查询相册目录: {}", self.root.display());
    let root = fs::canonicalize(&self.root).map_err(|source| SourceError::Query {
      path: self.root.clone(),
      source,
    })?;
    if !root.is_dir() {
      return Err(SourceError::NotADirectory(root));
    }

    // 只记录 (修改时间, 路径)，不读取任何图像内容
    let mut heap = BinaryHeap::new();
    let mut pending = vec![root.clone()];
    while let Some(dir) = pending.pop() {
      let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(source) if dir == root => {
          return Err(SourceError::Query { path: dir, source });
        }
        Err(e) => {
          warn!("跳过无法读取的子目录 {}: {}", dir.display(), e);
          continue;
        }
      };

      for entry in entries {
        let entry = match entry {
          Ok(entry) => entry,
          Err(e) => {
            warn!("跳过无法读取的目录项 ({}): {}", dir.display(), e);
            continue;
          }
        };
        let path = entry.path();
        let is_link = entry
          .file_type()
          .map(|file_type| file_type.is_symlink())
          .unwrap_or(false);
        let metadata = match fs::metadata(&path) {
          Ok(metadata) => metadata,
          Err(e) => {
            warn!("跳过无法读取元数据的条目 {}: {}", path.display(), e);
            continue;
          }
        };
        if metadata.is_dir() {
          // 不进入符号链接目录，指回上层的链接会造成重复枚举
          if is_link {
            debug!("跳过符号链接目录: {}", path.display());
          } else if self.recursive {
            pending.push(path);
          }
          continue;
        }
        if !metadata.is_file() || !has_image_extension(&path) {
          continue;
        }
        match metadata.modified() {
          Ok(added) => heap.push(RecencyKey { added, path }),
          Err(e) => warn!("跳过无修改时间的条目 {}: {}", path.display(), e),
        }
      }
    }

    debug!("相册目录中共 {} 个候选条目", heap.len());
    Ok(DirectoryItems { heap })
  }
}

/// 最新的条目排在堆顶；时间相同时按路径升序。
#[derive(Debug, PartialEq, Eq)]
struct RecencyKey {
  added: SystemTime,
  path: PathBuf,
}

impl Ord for RecencyKey {
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .added
      .cmp(&other.added)
      .then_with(|| other.path.cmp(&self.path))
  }
}

impl PartialOrd for RecencyKey {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

pub struct DirectoryItems {
  heap: BinaryHeap<RecencyKey>,
}

impl DirectoryItems {
  pub fn remaining(&self) -> usize {
    self.heap.len()
  }
}

impl Iterator for DirectoryItems {
  type Item = Result<ItemHandle, SourceError>;

  fn next(&mut self) -> Option<Self::Item> {
    self
      .heap
      .pop()
      .map(|RecencyKey { added, path }| Ok(ItemHandle::new(path, added)))
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    (self.heap.len(), Some(self.heap.len()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs::File;
  use std::time::Duration;
  use tempfile::tempdir;

  fn touch(path: &std::path::Path, secs: u64) {
    let file = File::create(path).unwrap();
    file
      .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
      .unwrap();
  }

  fn names(source: &DirectorySource) -> Vec<String> {
    source
      .enumerate()
      .unwrap()
      .map(|item| {
        item
          .unwrap()
          .path()
          .file_name()
          .unwrap()
          .to_string_lossy()
          .into_owned()
      })
      .collect()
  }

  #[test]
  fn enumerates_most_recent_first() {
    let dir = tempdir().unwrap();
    touch(&dir.path().join("old.jpg"), 1_000);
    touch(&dir.path().join("new.png"), 3_000);
    touch(&dir.path().join("mid.webp"), 2_000);
    touch(&dir.path().join("readme.txt"), 4_000);

    let source = DirectorySource::new(dir.path());
    assert_eq!(names(&source), vec!["new.png", "mid.webp", "old.jpg"]);
  }

  #[test]
  fn ties_are_ordered_by_path() {
    let dir = tempdir().unwrap();
    touch(&dir.path().join("b.jpg"), 5_000);
    touch(&dir.path().join("a.jpg"), 5_000);

    let source = DirectorySource::new(dir.path());
    assert_eq!(names(&source), vec!["a.jpg", "b.jpg"]);
  }

  #[test]
  fn subdirectories_only_when_recursive() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("album")).unwrap();
    touch(&dir.path().join("album").join("inner.jpg"), 9_000);
    touch(&dir.path().join("top.jpg"), 1_000);

    let flat = DirectorySource::new(dir.path());
    assert_eq!(names(&flat), vec!["top.jpg"]);

    let deep = DirectorySource::new(dir.path()).with_recursive(true);
    assert_eq!(names(&deep), vec!["inner.jpg", "top.jpg"]);
  }

  #[test]
  fn empty_directory_is_empty_sequence() {
    let dir = tempdir().unwrap();
    let source = DirectorySource::new(dir.path());
    assert_eq!(source.enumerate().unwrap().count(), 0);
  }

  #[test]
  fn missing_directory_is_query_error() {
    let dir = tempdir().unwrap();
    let source = DirectorySource::new(dir.path().join("gone"));
    assert!(matches!(
      source.enumerate(),
      Err(SourceError::Query { .. })
    ));
  }

  #[test]
  fn file_root_is_rejected() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("a.jpg");
    touch(&file, 1);
    let source = DirectorySource::new(&file);
    assert!(matches!(
      source.enumerate(),
      Err(SourceError::NotADirectory(_))
    ));
  }

  #[test]
  fn from_url_reads_recursive_flag() {
    let url = Url::parse("gallery:///srv/photos?recursive").unwrap();
    let source = DirectorySource::from_url(&url).unwrap();
    assert_eq!(source.root(), std::path::Path::new("/srv/photos"));
    assert!(source.recursive);

    let url = Url::parse("list:///srv/photos").unwrap();
    assert!(matches!(
      DirectorySource::from_url(&url),
      Err(SourceError::SchemeMismatch { .. })
    ));
  }

  #[cfg(unix)]
  #[test]
  fn symlinked_directories_are_not_followed() {
    let dir = tempdir().unwrap();
    touch(&dir.path().join("a.jpg"), 1_000);
    fs::create_dir(dir.path().join("album")).unwrap();
    touch(&dir.path().join("album").join("b.jpg"), 2_000);
    std::os::unix::fs::symlink(dir.path(), dir.path().join("album").join("loop")).unwrap();
    std::os::unix::fs::symlink(
      dir.path().join("album").join("b.jpg"),
      dir.path().join("linked.jpg"),
    )
    .unwrap();

    let source = DirectorySource::new(dir.path()).with_recursive(true);
    let mut found = names(&source);
    found.sort();
    // 指向文件的链接仍然是条目
    assert_eq!(found, vec!["a.jpg", "b.jpg", "linked.jpg"]);
  }
}
