//! # Batch input
//!
//! A batch is what the external model and dataset hand over for one
//! forward pass: the per-proposal output tensors and the padded
//! ground-truth tensors. Batches are dumped as JSON, one file per batch.

use std::{
    collections::BTreeMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use ndarray::{Array2, Array3, Array4};
use serde::{Deserialize, Serialize};

use crate::{
    config::DatasetConfig,
    error::{Error, Result},
};

/// Raw per-proposal network outputs. B = batch, K = proposals.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposalOutputs {
    /// Anchor of every proposal, (B, K, 3).
    pub aggregated_vote_xyz: Array3<f32>,
    /// Center offset relative to the anchor, (B, K, 3).
    pub center_offset: Array3<f32>,
    /// (B, K, num_heading_bin)
    pub heading_scores: Array3<f32>,
    /// Residual angle of every heading bin in radians, (B, K, num_heading_bin).
    pub heading_residuals: Array3<f32>,
    /// (B, K, num_size_cluster)
    pub size_scores: Array3<f32>,
    /// Residual size of every cluster in metres, (B, K, num_size_cluster, 3).
    pub size_residuals: Array4<f32>,
    /// Background / object logits, (B, K, 2).
    pub objectness_scores: Array3<f32>,
    /// (B, K, num_class)
    pub sem_cls_scores: Array3<f32>,
}

/// Padded ground-truth slots. M = slot capacity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BoxLabels {
    /// (B, M, 3)
    pub center_label: Array3<f32>,
    /// (B, M)
    pub heading_class_label: Array2<i64>,
    /// (B, M)
    pub heading_residual_label: Array2<f32>,
    /// (B, M)
    pub size_class_label: Array2<i64>,
    /// (B, M, 3)
    pub size_residual_label: Array3<f32>,
    /// (B, M)
    pub sem_cls_label: Array2<i64>,
    /// 1 marks a valid slot, (B, M).
    pub box_label_mask: Array2<f32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Batch {
    pub proposals: ProposalOutputs,
    pub labels: BoxLabels,
    /// Input points, xyz first, (B, N, C >= 3).
    #[serde(default)]
    pub point_clouds: Option<Array3<f32>>,
    /// Proposal objectness targets from the loss, (B, K).
    #[serde(default)]
    pub objectness_label: Option<Array2<i64>>,
    /// (B, K)
    #[serde(default)]
    pub objectness_mask: Option<Array2<f32>>,
    /// Scalar losses, accuracies and ratios of this batch.
    #[serde(default)]
    pub stats: BTreeMap<String, f32>,
}

impl Batch {
    pub fn batch_size(&self) -> usize {
        self.proposals.objectness_scores.shape()[0]
    }

    pub fn num_proposal(&self) -> usize {
        self.proposals.objectness_scores.shape()[1]
    }

    /// Checks that every tensor agrees on the batch, proposal and slot axes.
    pub fn validate(&self) -> Result<()> {
        let ProposalOutputs {
            aggregated_vote_xyz,
            center_offset,
            heading_scores,
            heading_residuals,
            size_scores,
            size_residuals,
            objectness_scores,
            sem_cls_scores,
        } = &self.proposals;
        let b = self.batch_size();
        let k = self.num_proposal();
        let nh = heading_scores.shape()[2];
        let ns = size_scores.shape()[2];

        check_shape("aggregated_vote_xyz", aggregated_vote_xyz.shape(), &[Some(b), Some(k), Some(3)])?;
        check_shape("center_offset", center_offset.shape(), &[Some(b), Some(k), Some(3)])?;
        check_shape("heading_scores", heading_scores.shape(), &[Some(b), Some(k), None])?;
        check_shape("heading_residuals", heading_residuals.shape(), &[Some(b), Some(k), Some(nh)])?;
        check_shape("size_scores", size_scores.shape(), &[Some(b), Some(k), None])?;
        check_shape("size_residuals", size_residuals.shape(), &[Some(b), Some(k), Some(ns), Some(3)])?;
        check_shape("objectness_scores", objectness_scores.shape(), &[Some(b), Some(k), Some(2)])?;
        check_shape("sem_cls_scores", sem_cls_scores.shape(), &[Some(b), Some(k), None])?;

        let BoxLabels {
            center_label,
            heading_class_label,
            heading_residual_label,
            size_class_label,
            size_residual_label,
            sem_cls_label,
            box_label_mask,
        } = &self.labels;
        let m = box_label_mask.shape()[1];
        check_shape("box_label_mask", box_label_mask.shape(), &[Some(b), Some(m)])?;
        check_shape("center_label", center_label.shape(), &[Some(b), Some(m), Some(3)])?;
        check_shape("heading_class_label", heading_class_label.shape(), &[Some(b), Some(m)])?;
        check_shape("heading_residual_label", heading_residual_label.shape(), &[Some(b), Some(m)])?;
        check_shape("size_class_label", size_class_label.shape(), &[Some(b), Some(m)])?;
        check_shape("size_residual_label", size_residual_label.shape(), &[Some(b), Some(m), Some(3)])?;
        check_shape("sem_cls_label", sem_cls_label.shape(), &[Some(b), Some(m)])?;

        if let Some(point_clouds) = &self.point_clouds {
            check_shape("point_clouds", point_clouds.shape(), &[Some(b), None, None])?;
            if point_clouds.shape()[2] < 3 {
                return Err(Error::ShapeMismatch(format!(
                    "point_clouds needs at least 3 channels, got {}",
                    point_clouds.shape()[2]
                )));
            }
        }
        if let Some(objectness_label) = &self.objectness_label {
            check_shape("objectness_label", objectness_label.shape(), &[Some(b), Some(k)])?;
        }
        if let Some(objectness_mask) = &self.objectness_mask {
            check_shape("objectness_mask", objectness_mask.shape(), &[Some(b), Some(k)])?;
        }
        Ok(())
    }

    /// [`Batch::validate`], plus the class, heading and size widths of the
    /// model outputs must match the dataset tables.
    pub fn validate_against(&self, dataset: &DatasetConfig) -> Result<()> {
        self.validate()?;
        let (b, k) = (self.batch_size(), self.num_proposal());
        let (nh, ns, nc) = (
            dataset.num_heading_bin,
            dataset.num_size_cluster(),
            dataset.num_class(),
        );
        let proposals = &self.proposals;
        check_shape("heading_scores", proposals.heading_scores.shape(), &[Some(b), Some(k), Some(nh)])?;
        check_shape("heading_residuals", proposals.heading_residuals.shape(), &[Some(b), Some(k), Some(nh)])?;
        check_shape("size_scores", proposals.size_scores.shape(), &[Some(b), Some(k), Some(ns)])?;
        check_shape("size_residuals", proposals.size_residuals.shape(), &[Some(b), Some(k), Some(ns), Some(3)])?;
        check_shape("sem_cls_scores", proposals.sem_cls_scores.shape(), &[Some(b), Some(k), Some(nc)])?;
        Ok(())
    }
}

fn check_shape(name: &str, actual: &[usize], expected: &[Option<usize>]) -> Result<()> {
    let matches = actual.len() == expected.len()
        && actual
            .iter()
            .zip(expected)
            .all(|(dim, want)| want.map_or(true, |want| *dim == want));
    if matches {
        Ok(())
    } else {
        Err(Error::ShapeMismatch(format!(
            "{} has shape {:?}, expected {:?}",
            name, actual, expected
        )))
    }
}

/// Reads and validates one dumped batch.
pub fn load_batch(path: impl AsRef<Path>) -> Result<Batch> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let batch: Batch = serde_json::from_reader(reader)?;
    batch.validate()?;
    Ok(batch)
}

/// The `*.json` files of a dump directory in lexical order.
pub fn list_batch_files(dump_dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dump_dir.as_ref())? {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
