#![allow(dead_code)]

use ndarray::{Array2, Array3, Array4};
use votenet_eval::{
    data::input::{Batch, BoxLabels, ProposalOutputs},
    DatasetConfig,
};

/// Two classes, four heading bins, one unit-cube and one 2m size cluster.
pub fn toy_dataset() -> DatasetConfig {
    DatasetConfig {
        name: "toy".to_string(),
        class_names: vec!["box".to_string(), "crate".to_string()],
        num_heading_bin: 4,
        mean_size_arr: vec![[1f32, 1f32, 1f32], [2f32, 2f32, 2f32]],
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ProposalSpec {
    pub center: [f32; 3],
    pub heading_bin: usize,
    pub size_cluster: usize,
    pub size_residual: [f32; 3],
    pub obj_prob: f32,
    pub class: usize,
}

impl ProposalSpec {
    pub fn new(center: [f32; 3], obj_prob: f32, class: usize) -> Self {
        Self {
            center,
            heading_bin: 0,
            size_cluster: 0,
            size_residual: [0f32; 3],
            obj_prob,
            class,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct GtSpec {
    pub center: [f32; 3],
    pub heading_bin: i64,
    pub size_cluster: i64,
    pub class: i64,
}

impl GtSpec {
    pub fn new(center: [f32; 3], class: i64) -> Self {
        Self {
            center,
            heading_bin: 0,
            size_cluster: 0,
            class,
        }
    }
}

pub struct Sample {
    pub proposals: Vec<ProposalSpec>,
    pub groundtruths: Vec<GtSpec>,
}

/// Builds a padded batch. Padding proposals have zero objectness and
/// padding ground-truth slots are masked out.
pub fn make_batch(samples: &[Sample], dataset: &DatasetConfig) -> Batch {
    let b = samples.len();
    let k = samples.iter().map(|x| x.proposals.len()).max().unwrap_or(0).max(1);
    let m = samples.iter().map(|x| x.groundtruths.len()).max().unwrap_or(0).max(1);
    let (nh, ns, nc) = (
        dataset.num_heading_bin,
        dataset.num_size_cluster(),
        dataset.num_class(),
    );

    let mut aggregated_vote_xyz = Array3::<f32>::zeros((b, k, 3));
    let center_offset = Array3::<f32>::zeros((b, k, 3));
    let mut heading_scores = Array3::<f32>::zeros((b, k, nh));
    let heading_residuals = Array3::<f32>::zeros((b, k, nh));
    let mut size_scores = Array3::<f32>::zeros((b, k, ns));
    let mut size_residuals = Array4::<f32>::zeros((b, k, ns, 3));
    let mut objectness_scores = Array3::<f32>::zeros((b, k, 2));
    let mut sem_cls_scores = Array3::<f32>::zeros((b, k, nc));

    let mut center_label = Array3::<f32>::zeros((b, m, 3));
    let mut heading_class_label = Array2::<i64>::zeros((b, m));
    let heading_residual_label = Array2::<f32>::zeros((b, m));
    let mut size_class_label = Array2::<i64>::zeros((b, m));
    let size_residual_label = Array3::<f32>::zeros((b, m, 3));
    let mut sem_cls_label = Array2::<i64>::zeros((b, m));
    let mut box_label_mask = Array2::<f32>::zeros((b, m));

    for (i, sample) in samples.iter().enumerate() {
        for j in 0..k {
            match sample.proposals.get(j) {
                Some(spec) => {
                    for axis in 0..3 {
                        aggregated_vote_xyz[[i, j, axis]] = spec.center[axis];
                        size_residuals[[i, j, spec.size_cluster, axis]] = spec.size_residual[axis];
                    }
                    heading_scores[[i, j, spec.heading_bin]] = 10f32;
                    size_scores[[i, j, spec.size_cluster]] = 10f32;
                    objectness_scores[[i, j, 1]] = (spec.obj_prob / (1f32 - spec.obj_prob)).ln();
                    sem_cls_scores[[i, j, spec.class]] = 10f32;
                }
                None => {
                    objectness_scores[[i, j, 1]] = -1000f32;
                }
            }
        }
        for (j, spec) in sample.groundtruths.iter().enumerate() {
            for axis in 0..3 {
                center_label[[i, j, axis]] = spec.center[axis];
            }
            heading_class_label[[i, j]] = spec.heading_bin;
            size_class_label[[i, j]] = spec.size_cluster;
            sem_cls_label[[i, j]] = spec.class;
            box_label_mask[[i, j]] = 1f32;
        }
    }

    Batch {
        proposals: ProposalOutputs {
            aggregated_vote_xyz,
            center_offset,
            heading_scores,
            heading_residuals,
            size_scores,
            size_residuals,
            objectness_scores,
            sem_cls_scores,
        },
        labels: BoxLabels {
            center_label,
            heading_class_label,
            heading_residual_label,
            size_class_label,
            size_residual_label,
            sem_cls_label,
            box_label_mask,
        },
        point_clouds: None,
        objectness_label: None,
        objectness_mask: None,
        stats: Default::default(),
    }
}

/// Small deterministic generator for property-style tests.
pub struct Lcg(pub u64);

impl Lcg {
    /// Uniform in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 40) as f32 / (1u64 << 24) as f32
    }

    pub fn range(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.next_f32()
    }
}
