// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/decision.rs - logit 判定规则
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

use serde::Serialize;
use thiserror::Error;

pub fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThresholdError {
  #[error("置信度阈值必须位于 [0, 1) 区间, 实际为 {0}")]
  OutOfRange(f32),
}

/// 输出阈值：置信度严格大于它的匹配结果才会输出。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold(f32);

impl Threshold {
  pub fn new(value: f32) -> Result<Self, ThresholdError> {
    if value.is_finite() && (0.0..1.0).contains(&value) {
      Ok(Self(value))
    } else {
      Err(ThresholdError::OutOfRange(value))
    }
  }

  pub fn value(&self) -> f32 {
    self.0
  }
}

impl std::str::FromStr for Threshold {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let value: f32 = s.parse().map_err(|e| format!("{}", e))?;
    Threshold::new(value).map_err(|e| e.to_string())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
  /// 目标类别（训练时的 0 号类别）
  Match,
  Other,
}

/// 单个 logit 的判定结果。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
  pub score: f32,
  pub probability: f32,
  pub label: Label,
  pub confidence: f32,
}

impl Decision {
  /// 训练数据中 0 号类别为目标类别：logit < 0 偏向 0 号类别。
  /// 置信度取所判类别的概率。NaN 不小于 0，归为 `Other`。
  pub fn from_score(score: f32) -> Self {
    let probability = sigmoid(score);
    let (label, confidence) = if score < 0.0 {
      (Label::Match, 1.0 - probability)
    } else {
      (Label::Other, probability)
    };

    Self {
      score,
      probability,
      label,
      confidence,
    }
  }

  pub fn is_match(&self) -> bool {
    self.label == Label::Match
  }

  pub fn passes(&self, threshold: Threshold) -> bool {
    self.is_match() && self.confidence > threshold.value()
  }
}

/// 一条被接受的扫描结果。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
  pub source_ref: String,
  pub is_match: bool,
  pub confidence: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct DecisionPolicy {
  threshold: Threshold,
}

impl DecisionPolicy {
  pub fn new(threshold: Threshold) -> Self {
    Self { threshold }
  }

  pub fn threshold(&self) -> Threshold {
    self.threshold
  }

  pub fn decide(&self, source_ref: &str, score: f32) -> Option<ScanResult> {
    let decision = Decision::from_score(score);
    decision.passes(self.threshold).then(|| ScanResult {
      source_ref: source_ref.to_string(),
      is_match: true,
      confidence: decision.confidence,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn close(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-4
  }

  #[test]
  fn sigmoid_midpoint_and_monotonic() {
    assert_eq!(sigmoid(0.0), 0.5);
    let scores = [-20.0, -3.0, -0.5, 0.0, 0.5, 3.0, 20.0];
    for pair in scores.windows(2) {
      assert!(sigmoid(pair[0]) <= sigmoid(pair[1]));
    }
    // 对 -s 单调递减
    for pair in scores.windows(2) {
      assert!(sigmoid(-pair[0]) >= sigmoid(-pair[1]));
    }
  }

  #[test]
  fn label_flips_at_zero() {
    assert_eq!(Decision::from_score(-0.0001).label, Label::Match);
    assert_eq!(Decision::from_score(0.0001).label, Label::Other);
    assert_eq!(Decision::from_score(0.0).label, Label::Other);
  }

  #[test]
  fn confidence_stays_in_unit_interval() {
    for s in [-1000.0f32, -100.0, -10.0, -1.0, 0.0, 1.0, 10.0, 100.0, 1000.0] {
      let c = Decision::from_score(s).confidence;
      assert!((0.0..=1.0).contains(&c), "score {} gave {}", s, c);
    }
  }

  #[test]
  fn negative_two_passes_point_eight_only() {
    let d = Decision::from_score(-2.0);
    assert!(close(d.probability, 0.1192));
    assert_eq!(d.label, Label::Match);
    assert!(close(d.confidence, 0.8808));
    assert!(d.passes(Threshold::new(0.8).unwrap()));
    assert!(!d.passes(Threshold::new(0.9).unwrap()));
  }

  #[test]
  fn positive_score_never_emitted() {
    let d = Decision::from_score(1.0);
    assert!(close(d.probability, 0.7311));
    assert_eq!(d.label, Label::Other);
    for t in [0.0, 0.1, 0.5, 0.99] {
      assert!(!d.passes(Threshold::new(t).unwrap()));
    }
  }

  #[test]
  fn threshold_is_strict() {
    let d = Decision::from_score(-2.0);
    let exact = Threshold::new(d.confidence).unwrap();
    assert!(!d.passes(exact));
  }

  #[test]
  fn nan_is_never_emitted() {
    let policy = DecisionPolicy::new(Threshold::new(0.0).unwrap());
    assert!(policy.decide("x", f32::NAN).is_none());
  }

  #[test]
  fn policy_builds_result() {
    let policy = DecisionPolicy::new(Threshold::new(0.5).unwrap());
    let result = policy.decide("file:///a.jpg", -3.0).unwrap();
    assert_eq!(result.source_ref, "file:///a.jpg");
    assert!(result.is_match);
    assert!(close(result.confidence, 1.0 - sigmoid(-3.0)));
    assert!(policy.decide("file:///a.jpg", 3.0).is_none());
  }

  #[test]
  fn threshold_validation() {
    assert!(Threshold::new(0.0).is_ok());
    assert!(Threshold::new(0.8).is_ok());
    assert!(Threshold::new(1.0).is_err());
    assert!(Threshold::new(-0.1).is_err());
    assert!(Threshold::new(f32::NAN).is_err());
    assert_eq!("0.5".parse::<Threshold>().unwrap().value(), 0.5);
    assert!("abc".parse::<Threshold>().is_err());
  }
}
