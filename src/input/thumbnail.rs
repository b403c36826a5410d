// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/thumbnail.rs - 缩略图加载
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

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use image::{ImageFormat, ImageReader, RgbImage, imageops::FilterType};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::frame::{FrameError, RgbFrame};
use crate::input::ItemHandle;

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("无法读取图像 {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("无法解码图像 {path}: {source}")]
  Image {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },
  #[error("缩略图尺寸不符 {path}: {source}")]
  Frame {
    path: PathBuf,
    #[source]
    source: FrameError,
  },
}

/// 把条目加载为 `W x H` 的缩略图。
pub trait ThumbnailLoader<const W: u32, const H: u32> {
  fn load(&self, handle: &ItemHandle) -> Result<RgbFrame<W, H>, DecodeError>;
}

#[derive(Error, Debug)]
pub enum ThumbnailCacheError {
  #[error("无法创建缩略图缓存目录 {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// 预先缩小好的缩略图目录。命中时只需解码一张小图。
#[derive(Debug, Clone)]
pub struct ThumbnailCache {
  root: PathBuf,
}

impl ThumbnailCache {
  pub fn new(root: impl Into<PathBuf>) -> Result<Self, ThumbnailCacheError> {
    let root = root.into();
    fs::create_dir_all(&root).map_err(|source| ThumbnailCacheError::Io {
      source,
      path: root.clone(),
    })?;
    Ok(Self { root })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// 缓存文件名由路径、添加时间与目标尺寸共同决定，原图变化后自然失效。
  pub fn entry_path(&self, handle: &ItemHandle, width: u32, height: u32) -> PathBuf {
    let added = handle
      .added()
      .duration_since(UNIX_EPOCH)
      .map(|d| d.as_nanos())
      .unwrap_or(0);
    let mut hasher = Sha256::new();
    hasher.update(handle.path().as_os_str().as_encoded_bytes());
    hasher.update(added.to_le_bytes());
    hasher.update(width.to_le_bytes());
    hasher.update(height.to_le_bytes());
    self
      .root
      .join(format!("{:x}-{}x{}.png", hasher.finalize(), width, height))
  }

  fn lookup<const W: u32, const H: u32>(&self, path: &Path) -> Option<RgbFrame<W, H>> {
    if !path.exists() {
      return None;
    }
    let image = ImageReader::open(path)
      .and_then(|reader| reader.with_guessed_format())
      .ok()?
      .decode();
    match image {
      Ok(image) => match RgbFrame::try_from(image.to_rgb8()) {
        Ok(frame) => Some(frame),
        Err(e) => {
          debug!("缓存缩略图尺寸不符，重新生成 {}: {}", path.display(), e);
          None
        }
      },
      Err(e) => {
        debug!("缓存缩略图无法解码，重新生成 {}: {}", path.display(), e);
        None
      }
    }
  }

  fn store(&self, path: &Path, thumbnail: &RgbImage) -> Result<(), image::ImageError> {
    // 先写临时文件再改名，避免并发读到半张图
    let staging = path.with_extension("png.partial");
    thumbnail.save_with_format(&staging, ImageFormat::Png)?;
    fs::rename(&staging, path).map_err(image::ImageError::IoError)
  }
}

/// 基于 `image` 的缩略图加载器。
///
/// 配置了缓存时优先读取缓存缩略图；否则解码原图并双线性缩放到目标尺寸，
/// 缩放结果写回缓存（失败只记录警告）。
#[derive(Debug, Clone, Default)]
pub struct ImageThumbnailLoader {
  cache: Option<ThumbnailCache>,
}

impl ImageThumbnailLoader {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_cache(mut self, cache: Option<ThumbnailCache>) -> Self {
    self.cache = cache;
    self
  }
}

impl<const W: u32, const H: u32> ThumbnailLoader<W, H> for ImageThumbnailLoader {
  fn load(&self, handle: &ItemHandle) -> Result<RgbFrame<W, H>, DecodeError> {
    let cached = self
      .cache
      .as_ref()
      .map(|cache| (cache, cache.entry_path(handle, W, H)));

    if let Some((cache, entry)) = &cached
      && let Some(frame) = cache.lookup::<W, H>(entry)
    {
      debug!("命中缩略图缓存: {}", handle.path().display());
      return Ok(frame);
    }

    let path = handle.path();
    let image = ImageReader::open(path)
      .and_then(|reader| reader.with_guessed_format())
      .map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
      })?
      .decode()
      .map_err(|source| DecodeError::Image {
        path: path.to_path_buf(),
        source,
      })?;

    let thumbnail = image.resize_exact(W, H, FilterType::Triangle).to_rgb8();
    drop(image);

    if let Some((cache, entry)) = &cached
      && let Err(e) = cache.store(entry, &thumbnail)
    {
      warn!("写入缩略图缓存失败 {}: {}", entry.display(), e);
    }

    RgbFrame::try_from(thumbnail).map_err(|source| DecodeError::Frame {
      path: path.to_path_buf(),
      source,
    })
  }
}
