// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task/testing.rs - 测试用的输入源、加载器与模型
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

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use crate::frame::RgbFrame;
use crate::input::{DecodeError, ItemHandle, ItemSource, SourceError, ThumbnailLoader};
use crate::model::decision::ScanResult;
use crate::model::{Classifier, EngineError, EngineSlot, NormalizedTensor, OpenClassifier};
use crate::output::Render;
use crate::task::{CancelToken, ScanError, ScanReport};

fn io_error(msg: &str) -> std::io::Error {
  std::io::Error::other(msg.to_string())
}

/// `/gallery/<name>.jpg`，按给定顺序（即最新在前）产出。
pub struct FakeSource {
  names: Vec<String>,
  unavailable: bool,
  fail_at_end: bool,
}

impl FakeSource {
  pub fn named(names: &[&str]) -> Self {
    Self {
      names: names.iter().map(|n| n.to_string()).collect(),
      unavailable: false,
      fail_at_end: false,
    }
  }

  pub fn unavailable() -> Self {
    Self {
      unavailable: true,
      ..Self::named(&[])
    }
  }

  pub fn then_fail(mut self) -> Self {
    self.fail_at_end = true;
    self
  }
}

impl ItemSource for FakeSource {
  type Items = std::vec::IntoIter<Result<ItemHandle, SourceError>>;

  fn enumerate(&self) -> Result<Self::Items, SourceError> {
    if self.unavailable {
      return Err(SourceError::Query {
        path: PathBuf::from("/gallery"),
        source: io_error("permission denied"),
      });
    }
    let count = self.names.len() as u64;
    let mut items: Vec<_> = self
      .names
      .iter()
      .enumerate()
      .map(|(i, name)| {
        let added = SystemTime::UNIX_EPOCH + Duration::from_secs(count - i as u64);
        Ok(ItemHandle::new(
          PathBuf::from(format!("/gallery/{}.jpg", name)),
          added,
        ))
      })
      .collect();
    if self.fail_at_end {
      items.push(Err(SourceError::Read {
        path: PathBuf::from("/gallery"),
        line: count as usize + 1,
        source: io_error("device removed"),
      }));
    }
    Ok(items.into_iter())
  }
}

/// 产出全黑缩略图；`broken` 中的条目模拟解码失败。
pub struct FakeLoader {
  broken: HashSet<String>,
  pub loads: Arc<AtomicUsize>,
}

impl FakeLoader {
  pub fn new() -> Self {
    Self {
      broken: HashSet::new(),
      loads: Arc::new(AtomicUsize::new(0)),
    }
  }

  pub fn broken(mut self, names: &[&str]) -> Self {
    self.broken = names.iter().map(|n| format!("/gallery/{}.jpg", n)).collect();
    self
  }
}

impl<const W: u32, const H: u32> ThumbnailLoader<W, H> for FakeLoader {
  fn load(&self, handle: &ItemHandle) -> Result<RgbFrame<W, H>, DecodeError> {
    self.loads.fetch_add(1, Ordering::SeqCst);
    let path = handle.path().to_path_buf();
    if self.broken.contains(&path.display().to_string()) {
      return Err(DecodeError::Io {
        path,
        source: io_error("truncated file"),
      });
    }
    Ok(RgbFrame::default())
  }
}

#[derive(Clone, Default)]
pub struct EngineStats {
  classify_calls: Arc<AtomicUsize>,
  closes: Arc<AtomicUsize>,
}

impl EngineStats {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn classify_calls(&self) -> usize {
    self.classify_calls.load(Ordering::SeqCst)
  }

  /// 真正释放资源的次数
  pub fn closes(&self) -> usize {
    self.closes.load(Ordering::SeqCst)
  }
}

type Script = VecDeque<Result<f32, EngineError>>;

pub fn scores(values: &[f32]) -> Vec<Result<f32, EngineError>> {
  values.iter().copied().map(Ok).collect()
}

/// 按脚本依次返回 logit 的模型；脚本耗尽后返回强烈的非匹配 logit。
pub struct ScriptedClassifier {
  slot: EngineSlot<Script>,
  stats: EngineStats,
}

impl Classifier for ScriptedClassifier {
  fn input_edge(&self) -> u32 {
    2
  }

  fn classify(&mut self, _tensor: &NormalizedTensor) -> Result<f32, EngineError> {
    let script = self.slot.get_mut()?;
    self.stats.classify_calls.fetch_add(1, Ordering::SeqCst);
    script.pop_front().unwrap_or(Ok(10.0))
  }

  fn close(&mut self) {
    if self.slot.close() {
      self.stats.closes.fetch_add(1, Ordering::SeqCst);
    }
  }

  fn is_closed(&self) -> bool {
    self.slot.is_closed()
  }
}

pub struct ScriptedBuilder {
  script: Option<Script>,
  stats: EngineStats,
}

impl ScriptedBuilder {
  pub fn new(stats: &EngineStats, script: Vec<Result<f32, EngineError>>) -> Self {
    Self {
      script: Some(script.into()),
      stats: stats.clone(),
    }
  }

  pub fn failing(stats: &EngineStats) -> Self {
    Self {
      script: None,
      stats: stats.clone(),
    }
  }
}

impl OpenClassifier for ScriptedBuilder {
  type Classifier = ScriptedClassifier;

  fn open(self) -> Result<Self::Classifier, EngineError> {
    match self.script {
      Some(script) => Ok(ScriptedClassifier {
        slot: EngineSlot::loaded(script),
        stats: self.stats,
      }),
      None => Err(EngineError::ModelLoad {
        path: PathBuf::from("/models/missing.onnx"),
        reason: "no such file".to_string(),
      }),
    }
  }
}

#[derive(Default)]
pub struct RecordingRender {
  pub events: Vec<String>,
  pub results: Vec<ScanResult>,
  cancel_after: Option<(usize, CancelToken)>,
  fail_results: bool,
}

impl RecordingRender {
  pub fn cancelling_after(count: usize, token: CancelToken) -> Self {
    Self {
      cancel_after: Some((count, token)),
      ..Self::default()
    }
  }

  pub fn failing_results() -> Self {
    Self {
      fail_results: true,
      ..Self::default()
    }
  }
}

impl Render for RecordingRender {
  type Error = std::io::Error;

  fn render_start(&mut self) -> Result<(), Self::Error> {
    self.events.push("start".to_string());
    Ok(())
  }

  fn render_result(&mut self, result: &ScanResult) -> Result<(), Self::Error> {
    if self.fail_results {
      return Err(io_error("disk full"));
    }
    self.events.push("result".to_string());
    self.results.push(result.clone());
    if let Some((count, token)) = &self.cancel_after
      && self.results.len() >= *count
    {
      token.cancel();
    }
    Ok(())
  }

  fn render_finish(&mut self, outcome: Result<&ScanReport, &ScanError>) -> Result<(), Self::Error> {
    match outcome {
      Ok(report) => self.events.push(format!("finish:{:?}", report.state)),
      Err(_) => self.events.push("finish:error".to_string()),
    }
    Ok(())
  }
}
