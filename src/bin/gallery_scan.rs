// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/gallery_scan.rs - 相册扫描命令行
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

use std::path::PathBuf;
use std::{thread, time::Duration};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use shanan_scan::{
  FromUrl, ScanConfig, ScanState, ScanTask, Threshold,
  input::{ImageThumbnailLoader, InputWrapper, ThumbnailCache},
  model::OnnxClassifierBuilder,
  output::OutputWrapper,
  task::DEFAULT_MAX_CONSECUTIVE_FAILURES,
};

/// 缩略图边长，与 MobileNetV2 输入一致时可省去一次缩放
const THUMBNAIL_EDGE: u32 = 224;

/// 相册扫描参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，例如 onnx:///models/card.onnx?edge=224&layout=nhwc
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 相册来源，例如 gallery:///home/me/Pictures?recursive 或 list:///tmp/photos.txt
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 结果去向，stdout: 或 jsonl:///path/to/matches.jsonl[?append]
  #[arg(long, value_name = "OUTPUT", default_value = "stdout:")]
  pub output: Url,
  /// 置信度阈值 [0, 1)，严格大于该值的匹配才会输出
  #[arg(long, value_name = "THRESHOLD")]
  pub threshold: Threshold,
  /// 缩略图缓存目录
  #[arg(long, value_name = "DIR")]
  pub thumbnail_cache: Option<PathBuf>,
  /// 连续推理失败多少次后终止扫描
  #[arg(long, value_name = "COUNT", default_value_t = DEFAULT_MAX_CONSECUTIVE_FAILURES)]
  pub max_consecutive_failures: usize,
  /// 最多扫描的条目数
  #[arg(long, value_name = "COUNT")]
  pub max_items: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("相册来源: {}", args.input);
  info!("输出地址: {}", args.output);

  let source = InputWrapper::from_url(&args.input)?;
  let builder = OnnxClassifierBuilder::from_url(&args.model)?;
  let mut output = OutputWrapper::from_url(&args.output)?;
  let cache = args.thumbnail_cache.map(ThumbnailCache::new).transpose()?;
  let loader = ImageThumbnailLoader::new().with_cache(cache);

  let config = ScanConfig::new(args.threshold)
    .with_max_consecutive_failures(args.max_consecutive_failures)
    .with_max_items(args.max_items);
  let task =
    ScanTask::<_, _, _, THUMBNAIL_EDGE, THUMBNAIL_EDGE>::new(source, loader, builder, config);

  let cancel = task.cancel_token();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    cancel.cancel();
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  let report = task.run(&mut output)?;
  if report.state == ScanState::Cancelled {
    warn!("扫描被中断, 已输出 {} 条匹配结果", report.matched);
  }

  Ok(())
}
