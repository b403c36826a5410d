// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 相册扫描任务
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

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::input::{DecodeError, ItemHandle, ItemSource, SourceError, ThumbnailLoader};
use crate::model::decision::{Decision, DecisionPolicy, ScanResult, Threshold};
use crate::model::{Classifier, EngineError, OpenClassifier, Preprocessor};
use crate::output::Render;

#[cfg(test)]
pub(crate) mod testing;

pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
  #[default]
  Idle,
  Running,
  Completed,
  Failed,
  Cancelled,
}

impl ScanState {
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      ScanState::Completed | ScanState::Failed | ScanState::Cancelled
    )
  }
}

#[derive(Error, Debug)]
pub enum ScanError {
  #[error("模型加载失败: {0}")]
  ModelLoad(#[source] EngineError),
  #[error("输入源查询失败: {0}")]
  SourceQuery(#[source] SourceError),
  #[error("推理引擎不可用: {0}")]
  EngineUnusable(#[source] EngineError),
  #[error("连续 {count} 次推理失败, 最后一次: {last}")]
  RepeatedInferenceFailure {
    count: usize,
    #[source]
    last: EngineError,
  },
  #[error("结果输出失败: {0}")]
  Output(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("扫描线程异常退出")]
  WorkerPanicked,
}

impl ScanError {
  fn output<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
    ScanError::Output(Box::new(err))
  }
}

/// 扫描配置。阈值没有默认值，必须由调用方给出。
#[derive(Debug, Clone, Copy)]
pub struct ScanConfig {
  pub threshold: Threshold,
  pub max_consecutive_failures: usize,
  pub max_items: Option<usize>,
}

impl ScanConfig {
  pub fn new(threshold: Threshold) -> Self {
    Self {
      threshold,
      max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
      max_items: None,
    }
  }

  pub fn with_max_consecutive_failures(mut self, count: usize) -> Self {
    self.max_consecutive_failures = count.max(1);
    self
  }

  pub fn with_max_items(mut self, max_items: Option<usize>) -> Self {
    self.max_items = max_items;
    self
  }
}

/// 协作式取消标记，在条目之间检查。
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
  pub state: ScanState,
  pub enumerated: usize,
  /// 进入推理的条目数
  pub attempted: usize,
  pub matched: usize,
  pub skipped_decode: usize,
  pub skipped_inference: usize,
  pub elapsed: Duration,
}

enum ItemOutcome {
  Matched(ScanResult),
  Rejected(Decision),
}

enum ItemError {
  Decode(DecodeError),
  Inference(EngineError),
}

/// 持有打开的引擎，离开作用域时保证关闭。
struct EngineGuard<C: Classifier> {
  engine: C,
}

impl<C: Classifier> EngineGuard<C> {
  fn close(&mut self) {
    if !self.engine.is_closed() {
      self.engine.close();
    }
  }
}

impl<C: Classifier> Drop for EngineGuard<C> {
  fn drop(&mut self) {
    self.close();
  }
}

/// 一次相册扫描：`Idle → Running → {Completed, Failed, Cancelled}`。
///
/// `run` 消耗任务本身，结束后无法再次使用；再次扫描需要新的任务与新的引擎。
pub struct ScanTask<S, L, B, const W: u32, const H: u32> {
  source: S,
  loader: L,
  builder: B,
  config: ScanConfig,
  cancel: CancelToken,
}

impl<S, L, B, const W: u32, const H: u32> ScanTask<S, L, B, W, H>
where
  S: ItemSource,
  L: ThumbnailLoader<W, H>,
  B: OpenClassifier,
{
  pub fn new(source: S, loader: L, builder: B, config: ScanConfig) -> Self {
    Self {
      source,
      loader,
      builder,
      config,
      cancel: CancelToken::new(),
    }
  }

  pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
    self.cancel = cancel;
    self
  }

  pub fn cancel_token(&self) -> CancelToken {
    self.cancel.clone()
  }

  pub fn config(&self) -> &ScanConfig {
    &self.config
  }

  pub fn run<R>(self, render: &mut R) -> Result<ScanReport, ScanError>
  where
    R: Render,
    R::Error: std::error::Error + Send + Sync + 'static,
  {
    let now = Instant::now();
    let mut report = ScanReport::default();
    let mut state = ScanState::Idle;
    transition(&mut state, ScanState::Running);

    let result = self.drive(render, &mut report);
    report.elapsed = now.elapsed();

    match result {
      Ok(terminal) => {
        transition(&mut state, terminal);
        report.state = state;
        info!(
          "扫描结束: 共 {} 个条目, 推理 {} 个, 匹配 {} 个, 耗时 {:.2?}",
          report.enumerated, report.attempted, report.matched, report.elapsed
        );
        render
          .render_finish(Ok(&report))
          .map_err(ScanError::output)?;
        Ok(report)
      }
      Err(err) => {
        transition(&mut state, ScanState::Failed);
        warn!(
          "扫描失败 (已处理 {} 个条目, 匹配 {} 个): {}",
          report.enumerated, report.matched, err
        );
        if let Err(e) = render.render_finish(Err(&err)) {
          warn!("输出扫描失败信息时出错: {}", e);
        }
        Err(err)
      }
    }
  }

  fn drive<R>(self, render: &mut R, report: &mut ScanReport) -> Result<ScanState, ScanError>
  where
    R: Render,
    R::Error: std::error::Error + Send + Sync + 'static,
  {
    let ScanTask {
      source,
      loader,
      builder,
      config,
      cancel,
    } = self;

    render.render_start().map_err(ScanError::output)?;

    info!("正在加载模型...");
    let mut engine = EngineGuard {
      engine: builder.open().map_err(ScanError::ModelLoad)?,
    };
    let preprocessor = Preprocessor::new(engine.engine.input_edge());
    let policy = DecisionPolicy::new(config.threshold);
    info!(
      "模型就绪, 输入边长 {}, 置信度阈值 {}",
      preprocessor.edge(),
      config.threshold.value()
    );

    let mut items = source.enumerate().map_err(ScanError::SourceQuery)?;
    let mut consecutive_failures = 0usize;

    loop {
      if cancel.is_cancelled() {
        warn!("收到取消请求，停止扫描");
        engine.close();
        return Ok(ScanState::Cancelled);
      }
      if config.max_items.is_some_and(|max| report.enumerated >= max) {
        info!("达到条目数上限 {}, 结束扫描", report.enumerated);
        break;
      }

      let handle = match items.next() {
        Some(item) => item.map_err(ScanError::SourceQuery)?,
        None => break,
      };
      report.enumerated += 1;

      let outcome = process_item(&handle, &loader, &preprocessor, &mut engine.engine, &policy);
      match outcome {
        Ok(outcome) => {
          consecutive_failures = 0;
          report.attempted += 1;
          match outcome {
            ItemOutcome::Matched(result) => {
              report.matched += 1;
              info!(
                "发现匹配: {}, 置信度: {:.4}",
                result.source_ref, result.confidence
              );
              render.render_result(&result).map_err(ScanError::output)?;
            }
            ItemOutcome::Rejected(decision) => {
              debug!(
                "未通过判定: {} (logit {:.4}, 置信度 {:.4})",
                handle.path().display(),
                decision.score,
                decision.confidence
              );
            }
          }
        }
        Err(ItemError::Decode(e)) => {
          report.skipped_decode += 1;
          warn!("跳过无法加载的条目: {}", e);
        }
        Err(ItemError::Inference(e)) if e.is_fatal() => {
          return Err(ScanError::EngineUnusable(e));
        }
        Err(ItemError::Inference(e)) => {
          report.attempted += 1;
          report.skipped_inference += 1;
          consecutive_failures += 1;
          warn!(
            "推理失败，跳过条目 {} ({}/{}): {}",
            handle.path().display(),
            consecutive_failures,
            config.max_consecutive_failures,
            e
          );
          if consecutive_failures >= config.max_consecutive_failures {
            return Err(ScanError::RepeatedInferenceFailure {
              count: consecutive_failures,
              last: e,
            });
          }
        }
      }
    }

    engine.close();
    Ok(ScanState::Completed)
  }
}

fn transition(state: &mut ScanState, next: ScanState) {
  debug!("扫描状态: {:?} -> {:?}", state, next);
  *state = next;
}

/// 单个条目的完整处理；缩略图与张量在返回前释放。
fn process_item<L, C, const W: u32, const H: u32>(
  handle: &ItemHandle,
  loader: &L,
  preprocessor: &Preprocessor,
  engine: &mut C,
  policy: &DecisionPolicy,
) -> Result<ItemOutcome, ItemError>
where
  L: ThumbnailLoader<W, H>,
  C: Classifier,
{
  let frame = loader.load(handle).map_err(ItemError::Decode)?;
  let tensor = preprocessor.normalize(&frame);
  drop(frame);
  let score = engine.classify(&tensor).map_err(ItemError::Inference)?;
  drop(tensor);

  let source_ref = handle.source_ref();
  match policy.decide(&source_ref, score) {
    Some(result) => Ok(ItemOutcome::Matched(result)),
    None => Ok(ItemOutcome::Rejected(Decision::from_score(score))),
  }
}
