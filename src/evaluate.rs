//! The per-batch evaluation loop around the AP calculators.

use std::collections::BTreeMap;

use log::{debug, info};
use ndarray::Axis;
use rayon::prelude::*;
use serde::Serialize;

use crate::{
    ap_calculator::ApCalculator,
    config::{ApMethod, DatasetConfig, EvalConfig},
    data::{input::Batch, output::Metrics},
    decoder::softmax,
    error::{Error, Result},
    parser::{parse_groundtruths, parse_predictions},
};

/// Batch stats whose key contains one of these are averaged into the report.
const STAT_KEY_PATTERNS: [&str; 3] = ["loss", "acc", "ratio"];

/// Probability cut-offs for the objectness confusion statistics.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObjectnessThresholds {
    pub pos_prob: f32,
    pub neg_prob: f32,
}

#[derive(Clone, Debug, Serialize)]
pub struct EvalReport {
    pub batches: usize,
    pub mean_stats: BTreeMap<String, f64>,
    pub metrics: Vec<Metrics>,
}

impl EvalReport {
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .mean_stats
            .iter()
            .map(|(key, value)| format!("eval mean {}: {:.6}", key, value))
            .collect();
        for metrics in &self.metrics {
            lines.push(format!(
                "---------- iou_thresh: {:.6} ----------",
                metrics.iou_threshold
            ));
            lines.extend(
                metrics
                    .entries()
                    .into_iter()
                    .map(|(key, value)| format!("eval {}: {:.6}", key, value)),
            );
        }
        lines
    }

    pub fn log(&self) {
        for line in self.lines() {
            info!("{}", line);
        }
    }
}

pub struct Evaluator {
    config: EvalConfig,
    dataset: DatasetConfig,
    calculators: Vec<ApCalculator>,
    objectness: Option<ObjectnessThresholds>,
    stat_sums: BTreeMap<String, f64>,
    batches: usize,
}

impl Evaluator {
    /// Rejects invalid configs before any batch is seen.
    pub fn new(config: EvalConfig, dataset: DatasetConfig, iou_thresholds: &[f32]) -> Result<Self> {
        config.validate()?;
        dataset.validate()?;
        if iou_thresholds.is_empty() {
            return Err(Error::InvalidConfig("no AP IoU thresholds".to_string()));
        }
        if let Some(bad) = iou_thresholds
            .iter()
            .find(|x| !(x.is_finite() && **x >= 0f32 && **x <= 1f32))
        {
            return Err(Error::InvalidConfig(format!(
                "AP IoU threshold {} is outside [0, 1]",
                bad
            )));
        }

        let calculators = iou_thresholds
            .iter()
            .map(|iou| ApCalculator::new(*iou).with_class_names(dataset.class_names.clone()))
            .collect();
        Ok(Self {
            config,
            dataset,
            calculators,
            objectness: None,
            stat_sums: BTreeMap::new(),
            batches: 0,
        })
    }

    pub fn with_ap_method(mut self, method: ApMethod) -> Self {
        self.calculators = self
            .calculators
            .into_iter()
            .map(|x| x.with_method(method))
            .collect();
        self
    }

    /// Also accumulate objectness TP/TN/FP/FN statistics.
    pub fn with_objectness_stats(mut self, thresholds: ObjectnessThresholds) -> Self {
        self.objectness = Some(thresholds);
        self
    }

    pub fn calculators(&self) -> &[ApCalculator] {
        &self.calculators
    }

    pub fn process_batch(&mut self, batch: &Batch) -> Result<()> {
        batch.validate_against(&self.dataset)?;

        for (key, value) in &batch.stats {
            if STAT_KEY_PATTERNS.iter().any(|x| key.contains(x)) {
                *self.stat_sums.entry(key.clone()).or_insert(0f64) += *value as f64;
            }
        }
        if let Some(thresholds) = self.objectness {
            for (key, value) in objectness_stats(batch, thresholds)? {
                *self.stat_sums.entry(key.to_string()).or_insert(0f64) += value;
            }
        }

        let batch_predictions = parse_predictions(batch, &self.config, &self.dataset)?;
        let batch_groundtruths = parse_groundtruths(batch, &self.dataset)?;
        debug!(
            "batch {}: {} detections, {} ground truths",
            self.batches,
            batch_predictions.iter().map(Vec::len).sum::<usize>(),
            batch_groundtruths.iter().map(Vec::len).sum::<usize>()
        );

        self.calculators
            .par_iter_mut()
            .try_for_each(|calculator| calculator.step(&batch_predictions, &batch_groundtruths))?;
        self.batches += 1;
        Ok(())
    }

    pub fn finish(&mut self) -> EvalReport {
        let batches = self.batches.max(1) as f64;
        EvalReport {
            batches: self.batches,
            mean_stats: self
                .stat_sums
                .iter()
                .map(|(key, value)| (key.clone(), value / batches))
                .collect(),
            metrics: self
                .calculators
                .iter_mut()
                .map(ApCalculator::compute_metrics)
                .collect(),
        }
    }
}

fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0f64 {
        numerator / denominator
    } else {
        0f64
    }
}

/// Objectness confusion counts of one batch, totals averaged per sample.
pub fn objectness_stats(
    batch: &Batch,
    thresholds: ObjectnessThresholds,
) -> Result<Vec<(&'static str, f64)>> {
    let label = batch
        .objectness_label
        .as_ref()
        .ok_or(Error::MissingField("objectness_label"))?;
    let mask = batch
        .objectness_mask
        .as_ref()
        .ok_or(Error::MissingField("objectness_mask"))?;
    let obj_prob = batch
        .proposals
        .objectness_scores
        .lanes(Axis(2))
        .into_iter()
        .map(|x| softmax(x)[1]);

    let (mut gt_pos, mut gt_neg, mut det_pos, mut det_neg) = (0f64, 0f64, 0f64, 0f64);
    let (mut tp, mut tn, mut fp, mut fn_) = (0f64, 0f64, 0f64, 0f64);
    for ((prob, label), mask) in obj_prob.zip(label.iter()).zip(mask.iter()) {
        let is_det_pos = prob > thresholds.pos_prob;
        let is_det_neg = prob < thresholds.neg_prob;
        let is_gt_pos = *label == 1;
        let is_gt_neg = *mask > 0.5 && *label == 0;
        gt_pos += is_gt_pos as u8 as f64;
        gt_neg += is_gt_neg as u8 as f64;
        det_pos += is_det_pos as u8 as f64;
        det_neg += is_det_neg as u8 as f64;
        tp += (is_det_pos && is_gt_pos) as u8 as f64;
        tn += (is_det_neg && is_gt_neg) as u8 as f64;
        fp += (is_det_pos && is_gt_neg) as u8 as f64;
        fn_ += (is_det_neg && is_gt_pos) as u8 as f64;
    }

    let batch_size = batch.batch_size() as f64;
    Ok(vec![
        ("objectness_total_gt_pos", safe_div(gt_pos, batch_size)),
        ("objectness_total_gt_neg", safe_div(gt_neg, batch_size)),
        ("objectness_total_det_pos", safe_div(det_pos, batch_size)),
        ("objectness_total_det_neg", safe_div(det_neg, batch_size)),
        ("objectness_total_tp", safe_div(tp, batch_size)),
        ("objectness_total_tn", safe_div(tn, batch_size)),
        ("objectness_total_fp", safe_div(fp, batch_size)),
        ("objectness_total_fn", safe_div(fn_, batch_size)),
        ("objectness_pos_prec", safe_div(tp, det_pos)),
        ("objectness_pos_rec", safe_div(tp, gt_pos)),
        ("objectness_neg_prec", safe_div(tn, det_neg)),
        ("objectness_neg_rec", safe_div(tn, gt_neg)),
        ("objectness_pos_err_rate", safe_div(fp, det_pos)),
        ("objectness_fp_rate", safe_div(fp, gt_neg)),
        ("objectness_neg_err_rate", safe_div(fn_, det_neg)),
        ("objectness_fn_rate", safe_div(fn_, gt_pos)),
    ])
}
