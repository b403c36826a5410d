// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/console_output.rs - 终端输出
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

use std::io::{self, Write};

use url::Url;

use crate::model::decision::ScanResult;
use crate::output::{OutputError, Render};
use crate::task::{ScanError, ScanReport, ScanState};
use crate::{FromUrl, FromUrlWithScheme};

/// `stdout:`，逐条打印匹配项，结束时打印汇总。
pub struct ConsoleOutput {
  out: Box<dyn Write + Send>,
}

impl FromUrlWithScheme for ConsoleOutput {
  const SCHEME: &'static str = "stdout";
}

impl FromUrl for ConsoleOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(ConsoleOutput::stdout())
  }
}

impl ConsoleOutput {
  pub fn stdout() -> Self {
    Self::new(io::stdout())
  }

  pub fn new(out: impl Write + Send + 'static) -> Self {
    Self { out: Box::new(out) }
  }
}

impl Render for ConsoleOutput {
  type Error = OutputError;

  fn render_start(&mut self) -> Result<(), Self::Error> {
    writeln!(self.out, "开始扫描相册...")?;
    Ok(())
  }

  fn render_result(&mut self, result: &ScanResult) -> Result<(), Self::Error> {
    writeln!(
      self.out,
      "[匹配] 置信度: {:6.2}%  {}",
      result.confidence * 100.0,
      result.source_ref
    )?;
    self.out.flush()?;
    Ok(())
  }

  fn render_finish(&mut self, outcome: Result<&ScanReport, &ScanError>) -> Result<(), Self::Error> {
    match outcome {
      Ok(report) => {
        let title = match report.state {
          ScanState::Cancelled => "扫描已取消",
          _ => "扫描完成",
        };
        writeln!(
          self.out,
          "{}: 共 {} 个条目, 推理 {} 个, 匹配 {} 个, 跳过 {} 个, 耗时 {:.2?}",
          title,
          report.enumerated,
          report.attempted,
          report.matched,
          report.skipped_decode + report.skipped_inference,
          report.elapsed
        )?;
        if report.matched == 0 {
          writeln!(self.out, "未发现匹配的条目")?;
        }
      }
      Err(err) => writeln!(self.out, "扫描出错: {}", err)?,
    }
    self.out.flush()?;
    Ok(())
  }
}
