//! Raw proposal tensors to oriented boxes.

use ndarray::{s, Array1, ArrayView1};

use crate::{
    config::DatasetConfig,
    data::{bbox3d::OrientedBox, input::ProposalOutputs, ClassId},
    error::Result,
};

/// One proposal after decoding, before any filtering.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedProposal {
    pub bbox: OrientedBox,
    /// Argmax of the class logits.
    pub sem_cls: ClassId,
    pub sem_cls_probs: Vec<f32>,
    /// Probability of the object channel.
    pub obj_prob: f32,
}

pub fn softmax(logits: ArrayView1<f32>) -> Array1<f32> {
    let max = logits.fold(f32::NEG_INFINITY, |acc, x| acc.max(*x));
    let exp = logits.mapv(|x| (x - max).exp());
    let sum = exp.sum();
    exp / sum
}

/// Index of the first maximum.
pub fn argmax(values: ArrayView1<f32>) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best_idx, best), (idx, value)| {
            if *value > best {
                (idx, *value)
            } else {
                (best_idx, best)
            }
        })
        .0
}

/// Builds a box from discrete heading/size classes and their residuals.
pub fn decode_box(
    center: [f32; 3],
    heading_bin: i64,
    heading_residual: f32,
    size_cluster: i64,
    size_residual: [f32; 3],
    dataset: &DatasetConfig,
) -> Result<OrientedBox> {
    let heading = dataset.class2angle(heading_bin, heading_residual)?;
    let size = dataset.class2size(size_cluster, size_residual)?;
    Ok(OrientedBox::new(center, size, heading))
}

pub fn decode_proposal(
    outputs: &ProposalOutputs,
    sample: usize,
    proposal: usize,
    dataset: &DatasetConfig,
) -> Result<DecodedProposal> {
    let anchor = outputs.aggregated_vote_xyz.slice(s![sample, proposal, ..]);
    let offset = outputs.center_offset.slice(s![sample, proposal, ..]);
    let center = [
        anchor[0] + offset[0],
        anchor[1] + offset[1],
        anchor[2] + offset[2],
    ];

    let heading_bin = argmax(outputs.heading_scores.slice(s![sample, proposal, ..]));
    let heading_residual = outputs.heading_residuals[[sample, proposal, heading_bin]];

    let size_cluster = argmax(outputs.size_scores.slice(s![sample, proposal, ..]));
    let size_residual = outputs
        .size_residuals
        .slice(s![sample, proposal, size_cluster, ..]);

    let bbox = decode_box(
        center,
        heading_bin as i64,
        heading_residual,
        size_cluster as i64,
        [size_residual[0], size_residual[1], size_residual[2]],
        dataset,
    )?;

    let sem_cls_logits = outputs.sem_cls_scores.slice(s![sample, proposal, ..]);
    let sem_cls = dataset.checked_class(argmax(sem_cls_logits) as i64)?;
    let sem_cls_probs = softmax(sem_cls_logits).to_vec();

    let obj_prob = softmax(outputs.objectness_scores.slice(s![sample, proposal, ..]))[1];

    Ok(DecodedProposal {
        bbox,
        sem_cls,
        sem_cls_probs,
        obj_prob,
    })
}

/// Decodes every proposal of one sample, in proposal order.
pub fn decode_sample(
    outputs: &ProposalOutputs,
    sample: usize,
    dataset: &DatasetConfig,
) -> Result<Vec<DecodedProposal>> {
    let num_proposal = outputs.objectness_scores.shape()[1];
    (0..num_proposal)
        .map(|proposal| decode_proposal(outputs, sample, proposal, dataset))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn softmax_is_normalized_and_stable() {
        let probs = softmax(arr1(&[1000f32, 1000f32]).view());
        assert!((probs[0] - 0.5).abs() < 1e-6);
        assert!((probs.sum() - 1f32).abs() < 1e-6);
    }

    #[test]
    fn argmax_takes_first_of_ties() {
        assert_eq!(argmax(arr1(&[0.1f32, 0.7, 0.7, 0.2]).view()), 1);
        assert_eq!(argmax(arr1(&[-3f32]).view()), 0);
    }
}
