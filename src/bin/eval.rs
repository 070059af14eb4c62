use std::{fs, io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use votenet_eval::{
    data::input::{list_batch_files, load_batch},
    ApMethod, DatasetConfig, EvalConfig, Evaluator, ObjectnessThresholds,
};

/// Evaluate dumped detector outputs: 3D box AP and mAP at several IoU thresholds.
#[derive(Parser, Debug)]
#[command(name = "eval", version, about)]
struct Args {
    /// Directory of dumped batches, one JSON file per batch.
    #[arg(long)]
    dump_dir: PathBuf,
    /// Built-in dataset name (sunrgbd) or path to a dataset config JSON.
    #[arg(long, default_value = "sunrgbd")]
    dataset: String,
    /// AP IoU thresholds.
    #[arg(long, value_delimiter = ',', default_value = "0.25,0.5")]
    ap_iou_thresholds: Vec<f32>,
    /// AP integration: full or 11point.
    #[arg(long, default_value = "full")]
    ap_method: ApMethod,
    /// Use 3D NMS instead of 2D NMS.
    #[arg(long)]
    use_3d_nms: bool,
    /// Use per class NMS.
    #[arg(long)]
    use_cls_nms: bool,
    /// Use old type of NMS, IoBox2Area.
    #[arg(long)]
    use_old_type_nms: bool,
    /// Duplicate each proposal num_class times.
    #[arg(long)]
    per_class_proposal: bool,
    /// NMS IoU threshold.
    #[arg(long, default_value_t = 0.25)]
    nms_iou: f32,
    /// Filter out predictions with obj prob less than it.
    #[arg(long, default_value_t = 0.05)]
    conf_thresh: f32,
    /// Skip empty bounding box removal.
    #[arg(long)]
    faster_eval: bool,
    /// Also report objectness TP/TN/FP/FN statistics.
    #[arg(long)]
    compute_false_stat: bool,
    #[arg(long, default_value_t = 0.5)]
    obj_pos_prob: f32,
    #[arg(long, default_value_t = 0.5)]
    obj_neg_prob: f32,
    /// Write log_eval.txt and metrics.json here.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    pretty_env_logger::formatted_builder()
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();
    let args = Args::parse();
    info!("{:?}", args);

    let config = EvalConfig {
        remove_empty_box: !args.faster_eval,
        use_3d_nms: args.use_3d_nms,
        nms_iou: args.nms_iou,
        use_old_type_nms: args.use_old_type_nms,
        cls_nms: args.use_cls_nms,
        per_class_proposal: args.per_class_proposal,
        conf_thresh: args.conf_thresh,
    };
    let dataset = DatasetConfig::resolve(&args.dataset)
        .with_context(|| format!("failed to load dataset config {}", args.dataset))?;

    let mut evaluator =
        Evaluator::new(config, dataset, &args.ap_iou_thresholds)?.with_ap_method(args.ap_method);
    if args.compute_false_stat {
        evaluator = evaluator.with_objectness_stats(ObjectnessThresholds {
            pos_prob: args.obj_pos_prob,
            neg_prob: args.obj_neg_prob,
        });
    }

    let batch_files = list_batch_files(&args.dump_dir)
        .with_context(|| format!("failed to list {}", args.dump_dir.display()))?;
    if batch_files.is_empty() {
        warn!("no batch files found under {}", args.dump_dir.display());
    }
    for (batch_idx, path) in batch_files.iter().enumerate() {
        if batch_idx % 10 == 0 {
            info!("Eval batch: {}", batch_idx);
        }
        let batch =
            load_batch(path).with_context(|| format!("failed to load {}", path.display()))?;
        evaluator
            .process_batch(&batch)
            .with_context(|| format!("failed to evaluate {}", path.display()))?;
    }

    let report = evaluator.finish();
    report.log();

    if let Some(output_dir) = &args.output_dir {
        fs::create_dir_all(output_dir)?;
        let mut log_file = fs::File::create(output_dir.join("log_eval.txt"))?;
        writeln!(log_file, "{:?}", args)?;
        for line in report.lines() {
            writeln!(log_file, "{}", line)?;
        }
        let metrics_file = fs::File::create(output_dir.join("metrics.json"))?;
        serde_json::to_writer_pretty(metrics_file, &report)?;
        info!("report written to {}", output_dir.display());
    }
    Ok(())
}
