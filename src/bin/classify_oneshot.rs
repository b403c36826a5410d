// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/classify_oneshot.rs - 单张图像分类
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

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use shanan_scan::{
  Decision, FromUrl, Threshold,
  frame::RgbFrame,
  input::{ImageThumbnailLoader, ItemHandle, ThumbnailLoader},
  model::{Classifier, OnnxClassifierBuilder, OpenClassifier, Preprocessor},
};

const THUMBNAIL_EDGE: u32 = 224;

/// 对单张图像执行一次分类并打印判定细节
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，例如 onnx:///models/card.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 图像文件
  #[arg(long, value_name = "FILE")]
  pub image: PathBuf,
  /// 置信度阈值，给出时同时打印是否会被输出
  #[arg(long, value_name = "THRESHOLD")]
  pub threshold: Option<Threshold>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  let added = std::fs::metadata(&args.image)?.modified()?;
  let handle = ItemHandle::new(args.image.canonicalize()?, added);

  let mut engine = OnnxClassifierBuilder::from_url(&args.model)?.open()?;
  let frame: RgbFrame<THUMBNAIL_EDGE, THUMBNAIL_EDGE> = ImageThumbnailLoader::new().load(&handle)?;
  let tensor = Preprocessor::new(engine.input_edge()).normalize(&frame);

  let now = std::time::Instant::now();
  let score = engine.classify(&tensor)?;
  info!("推理完成，耗时: {:.2?}", now.elapsed());
  engine.close();

  let decision = Decision::from_score(score);
  println!("{}", handle.source_ref());
  println!(
    "logit: {:.4}, 概率: {:.4}, 判定: {:?}, 置信度: {:.2}%",
    decision.score,
    decision.probability,
    decision.label,
    decision.confidence * 100.0
  );
  if let Some(threshold) = args.threshold {
    let verdict = if decision.passes(threshold) { "输出" } else { "不输出" };
    println!("阈值 {}: {}", threshold.value(), verdict);
  }

  Ok(())
}
