// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/jsonl_output.rs - JSON Lines 结果记录
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

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use crate::model::decision::ScanResult;
use crate::output::{OutputError, Render};
use crate::task::{ScanError, ScanReport};
use crate::{FromUrl, FromUrlWithScheme, url_path};

#[derive(Serialize)]
struct Record<'a> {
  #[serde(flatten)]
  result: &'a ScanResult,
  scanned_at: String,
}

/// `jsonl:///path/to/matches.jsonl[?append]`，每个匹配项一行 JSON。
///
/// 每行写入后立即刷新，扫描中途被取消时已写入的行完整可读。
pub struct JsonLinesOutput {
  path: PathBuf,
  append: bool,
  writer: Option<BufWriter<File>>,
}

impl FromUrlWithScheme for JsonLinesOutput {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for JsonLinesOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(url.scheme().to_string()));
    }
    let append = url.query_pairs().any(|(k, _)| k == "append");
    Ok(JsonLinesOutput::new(url_path(url)).with_append(append))
  }
}

impl JsonLinesOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      append: false,
      writer: None,
    }
  }

  pub fn with_append(mut self, append: bool) -> Self {
    self.append = append;
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn open(&self) -> Result<BufWriter<File>, OutputError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
      .create(true)
      .write(true)
      .append(self.append)
      .truncate(!self.append)
      .open(&self.path)?;
    Ok(BufWriter::new(file))
  }

  fn writer(&mut self) -> Result<&mut BufWriter<File>, OutputError> {
    let writer = match self.writer.take() {
      Some(writer) => writer,
      None => self.open()?,
    };
    Ok(self.writer.insert(writer))
  }
}

impl Render for JsonLinesOutput {
  type Error = OutputError;

  fn render_start(&mut self) -> Result<(), Self::Error> {
    self.writer()?;
    info!("匹配结果将写入 {}", self.path.display());
    Ok(())
  }

  fn render_result(&mut self, result: &ScanResult) -> Result<(), Self::Error> {
    let record = Record {
      result,
      scanned_at: Utc::now().to_rfc3339(),
    };
    let writer = self.writer()?;
    serde_json::to_writer(&mut *writer, &record)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
  }

  fn render_finish(&mut self, outcome: Result<&ScanReport, &ScanError>) -> Result<(), Self::Error> {
    if let Some(mut writer) = self.writer.take() {
      writer.flush()?;
    }
    match outcome {
      Ok(report) => info!(
        "已写入 {} 条匹配记录到 {}",
        report.matched,
        self.path.display()
      ),
      Err(err) => warn!("扫描中止, {} 中只包含中止前的记录: {}", self.path.display(), err),
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::task::ScanState;
  use tempfile::tempdir;

  fn result(name: &str, confidence: f32) -> ScanResult {
    ScanResult {
      source_ref: format!("file:///gallery/{}", name),
      is_match: true,
      confidence,
    }
  }

  fn read_lines(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
      .unwrap()
      .lines()
      .map(|line| serde_json::from_str(line).unwrap())
      .collect()
  }

  #[test]
  fn writes_one_line_per_match() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested/out/matches.jsonl");
    let mut output = JsonLinesOutput::new(&path);

    output.render_start().unwrap();
    output.render_result(&result("a.jpg", 0.9)).unwrap();
    // 未结束时已写入的行即可读取
    assert_eq!(read_lines(&path).len(), 1);
    output.render_result(&result("b.jpg", 0.95)).unwrap();
    output
      .render_finish(Ok(&ScanReport {
        state: ScanState::Completed,
        matched: 2,
        ..Default::default()
      }))
      .unwrap();

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["source_ref"], "file:///gallery/a.jpg");
    assert_eq!(lines[0]["is_match"], true);
    assert!((lines[1]["confidence"].as_f64().unwrap() - 0.95).abs() < 1e-6);
    let scanned_at = lines[0]["scanned_at"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(scanned_at).is_ok());
  }

  #[test]
  fn truncates_unless_appending() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("matches.jsonl");

    for append in [false, true] {
      let mut output = JsonLinesOutput::new(&path).with_append(append);
      output.render_start().unwrap();
      output.render_result(&result("a.jpg", 0.9)).unwrap();
      output.render_finish(Err(&ScanError::WorkerPanicked)).unwrap();
    }
    assert_eq!(read_lines(&path).len(), 2);

    let mut output = JsonLinesOutput::new(&path);
    output.render_start().unwrap();
    output
      .render_finish(Ok(&ScanReport::default()))
      .unwrap();
    assert!(read_lines(&path).is_empty());
  }

  #[test]
  fn from_url_reads_path_and_append() {
    let url = Url::parse("jsonl:///var/scan/out.jsonl?append").unwrap();
    let output = JsonLinesOutput::from_url(&url).unwrap();
    assert_eq!(output.path(), Path::new("/var/scan/out.jsonl"));
    assert!(output.append);

    let url = Url::parse("stdout:").unwrap();
    assert!(JsonLinesOutput::from_url(&url).is_err());
  }
}
