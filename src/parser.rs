//! Batch tensors to per-sample detection and ground-truth lists.

use log::trace;
use ndarray::{s, ArrayView2};

use crate::{
    config::{DatasetConfig, EvalConfig},
    data::{
        bbox3d::OrientedBox,
        input::Batch,
        output::{Detection, DetectionList, GroundTruth, GroundTruthList},
    },
    decoder::{decode_box, decode_sample},
    error::Result,
    nms::{nms, NmsCandidate, NmsParams},
};

/// Boxes holding fewer points than this count as empty.
pub const MIN_POINTS_IN_BOX: usize = 5;

/// Number of points (xyz in the first three channels) inside `bbox`.
pub fn count_points_in_box(bbox: &OrientedBox, points: ArrayView2<f32>) -> usize {
    points
        .outer_iter()
        .filter(|point| bbox.contains_point([point[0], point[1], point[2]]))
        .count()
}

/// Decode, drop empty boxes, NMS, confidence filter, one list per sample.
pub fn parse_predictions(
    batch: &Batch,
    config: &EvalConfig,
    dataset: &DatasetConfig,
) -> Result<Vec<DetectionList>> {
    config.validate()?;
    batch.validate_against(dataset)?;
    let params = NmsParams::from(config);

    (0..batch.batch_size())
        .map(|sample| {
            let proposals = decode_sample(&batch.proposals, sample, dataset)?;
            let points = batch
                .point_clouds
                .as_ref()
                .map(|x| x.slice(s![sample, .., 0..3]));

            let nonempty: Vec<usize> = (0..proposals.len())
                .filter(|idx| {
                    if !config.remove_empty_box {
                        return true;
                    }
                    let bbox = &proposals[*idx].bbox;
                    !bbox.is_degenerate()
                        && points.map_or(true, |points| {
                            count_points_in_box(bbox, points) >= MIN_POINTS_IN_BOX
                        })
                })
                .collect();

            let candidates: Vec<NmsCandidate> = nonempty
                .iter()
                .map(|idx| NmsCandidate {
                    extent: proposals[*idx].bbox.aligned_extent(),
                    score: proposals[*idx].obj_prob,
                    class: proposals[*idx].sem_cls,
                })
                .collect();
            let mut kept: Vec<usize> = nms(&candidates, &params)
                .into_iter()
                .map(|x| nonempty[x])
                .collect();
            kept.sort_unstable();
            trace!(
                "sample {}: {} proposals, {} non-empty, {} after nms",
                sample,
                proposals.len(),
                nonempty.len(),
                kept.len()
            );

            let mut detections = DetectionList::new();
            for idx in kept {
                let proposal = &proposals[idx];
                if !(proposal.obj_prob > config.conf_thresh) {
                    continue;
                }
                if config.per_class_proposal {
                    for (class, cls_prob) in proposal.sem_cls_probs.iter().enumerate() {
                        detections.push(Detection {
                            class,
                            bbox: proposal.bbox,
                            score: cls_prob * proposal.obj_prob,
                        });
                    }
                } else {
                    detections.push(Detection {
                        class: proposal.sem_cls,
                        bbox: proposal.bbox,
                        score: proposal.obj_prob,
                    });
                }
            }
            Ok(detections)
        })
        .collect()
}

/// Decodes the valid ground-truth slots of every sample.
pub fn parse_groundtruths(batch: &Batch, dataset: &DatasetConfig) -> Result<Vec<GroundTruthList>> {
    batch.validate()?;
    let labels = &batch.labels;
    let (batch_size, num_slot) = labels.box_label_mask.dim();

    (0..batch_size)
        .map(|sample| {
            let mut groundtruths = GroundTruthList::new();
            for slot in 0..num_slot {
                if !(labels.box_label_mask[[sample, slot]] > 0.5) {
                    continue;
                }
                let center = labels.center_label.slice(s![sample, slot, ..]);
                let size_residual = labels.size_residual_label.slice(s![sample, slot, ..]);
                let bbox = decode_box(
                    [center[0], center[1], center[2]],
                    labels.heading_class_label[[sample, slot]],
                    labels.heading_residual_label[[sample, slot]],
                    labels.size_class_label[[sample, slot]],
                    [size_residual[0], size_residual[1], size_residual[2]],
                    dataset,
                )?;
                let class = dataset.checked_class(labels.sem_cls_label[[sample, slot]])?;
                groundtruths.push(GroundTruth { class, bbox });
            }
            Ok(groundtruths)
        })
        .collect()
}
