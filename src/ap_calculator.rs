//! Average precision accumulated over a whole evaluation pass.

use std::collections::BTreeMap;

use itertools::Itertools;
use log::{debug, warn};
use ordered_float::OrderedFloat;

use crate::{
    config::ApMethod,
    data::{
        output::{ClassMetrics, DetectionList, GroundTruthList, Metrics},
        ClassId,
    },
    error::{Error, Result},
    overlap::box3d_iou,
};

/// One ranked detection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionRecord {
    pub score: f32,
    pub is_true_positive: bool,
    pub sample_id: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClassAccumulator {
    pub records: Vec<DetectionRecord>,
    pub num_groundtruth: usize,
}

impl ClassAccumulator {
    pub fn num_true_positive(&self) -> usize {
        self.records.iter().filter(|x| x.is_true_positive).count()
    }

    /// `(precision, recall)` at every rank of the score-sorted records.
    pub fn precision_recall(&self) -> Vec<(f32, f32)> {
        let num_groundtruth = self.num_groundtruth as f32;
        self.records
            .iter()
            .sorted_by_key(|x| std::cmp::Reverse(OrderedFloat(x.score)))
            .scan((0usize, 0usize), |(tp, fp), record| {
                if record.is_true_positive {
                    *tp += 1;
                } else {
                    *fp += 1;
                }
                let precision = *tp as f32 / (*tp + *fp) as f32;
                let recall = if num_groundtruth > 0f32 {
                    *tp as f32 / num_groundtruth
                } else {
                    0f32
                };
                Some((precision, recall))
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Fresh,
    Accumulating,
    Finalized,
}

/// Accumulates matches for one IoU threshold.
#[derive(Clone, Debug)]
pub struct ApCalculator {
    iou_threshold: f32,
    method: ApMethod,
    class_names: Vec<String>,
    accumulators: BTreeMap<ClassId, ClassAccumulator>,
    next_sample_id: usize,
    finalized: Option<Metrics>,
}

impl ApCalculator {
    pub fn new(iou_threshold: f32) -> Self {
        Self {
            iou_threshold,
            method: ApMethod::default(),
            class_names: Vec::new(),
            accumulators: BTreeMap::new(),
            next_sample_id: 0,
            finalized: None,
        }
    }

    pub fn with_method(mut self, method: ApMethod) -> Self {
        self.method = method;
        self
    }

    /// Names used in the report; missing names fall back to the class id.
    pub fn with_class_names(mut self, class_names: Vec<String>) -> Self {
        self.class_names = class_names;
        self
    }

    pub fn iou_threshold(&self) -> f32 {
        self.iou_threshold
    }

    pub fn phase(&self) -> Phase {
        if self.finalized.is_some() {
            Phase::Finalized
        } else if self.next_sample_id == 0 {
            Phase::Fresh
        } else {
            Phase::Accumulating
        }
    }

    pub fn accumulator(&self, class: ClassId) -> Option<&ClassAccumulator> {
        self.accumulators.get(&class)
    }

    pub fn num_samples(&self) -> usize {
        self.next_sample_id
    }

    pub fn reset(&mut self) {
        self.accumulators.clear();
        self.next_sample_id = 0;
        self.finalized = None;
    }

    /// Matches one batch. Both slices hold one list per sample.
    pub fn step(
        &mut self,
        batch_predictions: &[DetectionList],
        batch_groundtruths: &[GroundTruthList],
    ) -> Result<()> {
        if self.finalized.is_some() {
            return Err(Error::Finalized);
        }
        if batch_predictions.len() != batch_groundtruths.len() {
            return Err(Error::ShapeMismatch(format!(
                "{} prediction lists for {} ground-truth lists",
                batch_predictions.len(),
                batch_groundtruths.len()
            )));
        }

        for (predictions, groundtruths) in batch_predictions.iter().zip(batch_groundtruths) {
            let sample_id = self.next_sample_id;
            self.next_sample_id += 1;

            let classes = predictions
                .iter()
                .map(|x| x.class)
                .chain(groundtruths.iter().map(|x| x.class))
                .unique();
            for class in classes {
                let class_groundtruths: Vec<_> =
                    groundtruths.iter().filter(|x| x.class == class).collect();
                let mut matched = vec![false; class_groundtruths.len()];
                let accumulator = self.accumulators.entry(class).or_default();
                accumulator.num_groundtruth += class_groundtruths.len();

                for detection in predictions
                    .iter()
                    .filter(|x| x.class == class)
                    .sorted_by_key(|x| std::cmp::Reverse(OrderedFloat(x.score)))
                {
                    let best = class_groundtruths
                        .iter()
                        .enumerate()
                        .filter(|(idx, _)| !matched[*idx])
                        .map(|(idx, groundtruth)| {
                            (idx, box3d_iou(&detection.bbox, &groundtruth.bbox).0)
                        })
                        .fold(None, |best: Option<(usize, f32)>, (idx, iou)| match best {
                            Some((_, best_iou)) if best_iou >= iou => best,
                            _ => Some((idx, iou)),
                        });
                    let is_true_positive = match best {
                        Some((idx, iou)) if iou >= self.iou_threshold => {
                            matched[idx] = true;
                            true
                        }
                        _ => false,
                    };
                    accumulator.records.push(DetectionRecord {
                        score: detection.score,
                        is_true_positive,
                        sample_id,
                    });
                }
            }
        }
        Ok(())
    }

    /// Finalizes on the first call, later calls return the same metrics.
    pub fn compute_metrics(&mut self) -> Metrics {
        if let Some(metrics) = &self.finalized {
            return metrics.clone();
        }

        let classes: Vec<ClassMetrics> = self
            .accumulators
            .iter()
            .filter(|(_, accumulator)| accumulator.num_groundtruth > 0)
            .map(|(class, accumulator)| {
                let curve = accumulator.precision_recall();
                let (precision, recall): (Vec<f32>, Vec<f32>) = curve.into_iter().unzip();
                let average_precision = average_precision(&precision, &recall, self.method);
                debug!(
                    "iou {}: class {} has {} detections for {} ground truths, ap {}",
                    self.iou_threshold,
                    class,
                    accumulator.records.len(),
                    accumulator.num_groundtruth,
                    average_precision
                );
                ClassMetrics {
                    class: *class,
                    name: self
                        .class_names
                        .get(*class)
                        .cloned()
                        .unwrap_or_else(|| class.to_string()),
                    average_precision,
                    recall: recall.last().copied().unwrap_or(0f32),
                    num_groundtruth: accumulator.num_groundtruth,
                    num_detections: accumulator.records.len(),
                }
            })
            .collect();

        let skipped = self
            .accumulators
            .values()
            .filter(|x| x.num_groundtruth == 0)
            .count();
        if skipped > 0 {
            debug!(
                "{} detected classes without ground truth excluded from the mean",
                skipped
            );
        }
        if classes.is_empty() {
            warn!(
                "no ground truth seen at iou {}, reporting zero mAP",
                self.iou_threshold
            );
        }

        let metrics = Metrics {
            iou_threshold: self.iou_threshold,
            mean_average_precision: mean(classes.iter().map(|x| x.average_precision)),
            average_recall: mean(classes.iter().map(|x| x.recall)),
            classes,
        };
        self.finalized = Some(metrics.clone());
        metrics
    }
}

fn mean(values: impl Iterator<Item = f32>) -> f32 {
    let (sum, count) = values.fold((0f32, 0usize), |(sum, count), x| (sum + x, count + 1));
    if count == 0 {
        0f32
    } else {
        sum / count as f32
    }
}

/// Area under the precision/recall curve. Inputs are in rank order.
pub fn average_precision(precision: &[f32], recall: &[f32], method: ApMethod) -> f32 {
    match method {
        ApMethod::FullCurve => {
            let mrec: Vec<f32> = std::iter::once(0f32)
                .chain(recall.iter().copied())
                .chain(std::iter::once(1f32))
                .collect();
            let mut mpre: Vec<f32> = std::iter::once(0f32)
                .chain(precision.iter().copied())
                .chain(std::iter::once(0f32))
                .collect();
            // precision envelope
            for idx in (0..mpre.len() - 1).rev() {
                mpre[idx] = mpre[idx].max(mpre[idx + 1]);
            }
            (0..mrec.len() - 1)
                .filter(|idx| mrec[idx + 1] != mrec[*idx])
                .map(|idx| (mrec[idx + 1] - mrec[idx]) * mpre[idx + 1])
                .sum()
        }
        ApMethod::ElevenPoint => {
            (0..=10)
                .map(|step| {
                    let t = step as f32 / 10f32;
                    precision
                        .iter()
                        .zip(recall)
                        .filter(|(_, r)| **r >= t)
                        .map(|(p, _)| *p)
                        .fold(0f32, f32::max)
                })
                .sum::<f32>()
                / 11f32
        }
    }
}
