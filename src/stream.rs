// 该文件是 Shanan （山南西风） 项目的一部分。
// src/stream.rs - 后台扫描与结果流
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

use std::convert::Infallible;
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::input::{ItemSource, ThumbnailLoader};
use crate::model::OpenClassifier;
use crate::model::decision::ScanResult;
use crate::output::Render;
use crate::task::{CancelToken, ScanError, ScanReport, ScanTask};

#[derive(Debug)]
pub enum ScanEvent {
  Started,
  Matched(ScanResult),
  Finished(Result<ScanReport, ScanError>),
}

/// 扫描线程一侧的输出端。接收方离开后请求取消扫描。
struct ChannelRender {
  tx: SyncSender<ScanEvent>,
  cancel: CancelToken,
}

impl ChannelRender {
  fn send(&self, event: ScanEvent) {
    if self.tx.send(event).is_err() && !self.cancel.is_cancelled() {
      debug!("结果接收方已离开，取消扫描");
      self.cancel.cancel();
    }
  }
}

impl Render for ChannelRender {
  type Error = Infallible;

  fn render_start(&mut self) -> Result<(), Self::Error> {
    self.send(ScanEvent::Started);
    Ok(())
  }

  fn render_result(&mut self, result: &ScanResult) -> Result<(), Self::Error> {
    self.send(ScanEvent::Matched(result.clone()));
    Ok(())
  }

  fn render_finish(&mut self, _: Result<&ScanReport, &ScanError>) -> Result<(), Self::Error> {
    Ok(())
  }
}

/// 在后台线程执行的扫描，按顺序产出事件。
///
/// 通道容量为零：扫描线程在消费者取走上一条结果之前不会继续处理下一个条目。
/// 最后一个事件总是 `Finished`。丢弃本对象会取消扫描并等待线程退出。
pub struct ScanStream {
  rx: Option<Receiver<ScanEvent>>,
  cancel: CancelToken,
  worker: Option<JoinHandle<()>>,
  finished: bool,
}

impl<S, L, B, const W: u32, const H: u32> ScanTask<S, L, B, W, H>
where
  S: ItemSource + Send + 'static,
  L: ThumbnailLoader<W, H> + Send + 'static,
  B: OpenClassifier + Send + 'static,
{
  pub fn spawn(self) -> std::io::Result<ScanStream> {
    let (tx, rx) = sync_channel(0);
    let cancel = self.cancel_token();
    let mut render = ChannelRender {
      tx,
      cancel: cancel.clone(),
    };

    let worker = thread::Builder::new()
      .name("gallery-scan".to_string())
      .spawn(move || {
        let outcome = self.run(&mut render);
        // 接收方已离开时无人关心结果
        let _ = render.tx.send(ScanEvent::Finished(outcome));
      })?;

    Ok(ScanStream {
      rx: Some(rx),
      cancel,
      worker: Some(worker),
      finished: false,
    })
  }
}

impl ScanStream {
  pub fn cancel_token(&self) -> CancelToken {
    self.cancel.clone()
  }

  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  fn join(&mut self) -> bool {
    match self.worker.take() {
      Some(worker) => worker.join().is_ok(),
      None => true,
    }
  }
}

impl Iterator for ScanStream {
  type Item = ScanEvent;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }
    let rx = self.rx.as_ref()?;
    match rx.recv() {
      Ok(event) => {
        if matches!(event, ScanEvent::Finished(_)) {
          self.finished = true;
          self.join();
        }
        Some(event)
      }
      Err(_) => {
        // 没有发出 Finished 就断开，只能是线程异常退出
        self.finished = true;
        self.join();
        warn!("扫描线程异常退出");
        Some(ScanEvent::Finished(Err(ScanError::WorkerPanicked)))
      }
    }
  }
}

impl Drop for ScanStream {
  fn drop(&mut self) {
    self.cancel.cancel();
    // 先关闭接收端，阻塞在发送上的扫描线程随即返回
    drop(self.rx.take());
    if !self.join() {
      warn!("扫描线程异常退出");
    }
  }
}
