mod common;

use approx::assert_abs_diff_eq;
use ndarray::{array, Array2};
use votenet_eval::{ApMethod, EvalConfig, Error, Evaluator, ObjectnessThresholds};

use common::{make_batch, toy_dataset, GtSpec, ProposalSpec, Sample};

fn two_sample_batch() -> votenet_eval::Batch {
    make_batch(
        &[
            Sample {
                proposals: vec![
                    ProposalSpec::new([0f32, 0f32, 0f32], 0.9, 0),
                    ProposalSpec::new([0.05, 0f32, 0f32], 0.7, 0),
                    ProposalSpec::new([4f32, 0f32, 0f32], 0.8, 1),
                ],
                groundtruths: vec![GtSpec::new([0f32, 0f32, 0f32], 0), GtSpec::new([4.5, 0f32, 0f32], 1)],
            },
            Sample {
                proposals: vec![ProposalSpec::new([2f32, 2f32, 0f32], 0.6, 1)],
                groundtruths: vec![GtSpec::new([2f32, 2f32, 0f32], 1)],
            },
        ],
        &toy_dataset(),
    )
}

fn fast_config() -> EvalConfig {
    EvalConfig {
        remove_empty_box: false,
        ..EvalConfig::default()
    }
}

#[test]
fn invalid_config_is_rejected_before_any_batch() {
    let config = EvalConfig {
        cls_nms: true,
        use_3d_nms: false,
        ..EvalConfig::default()
    };
    assert!(matches!(
        Evaluator::new(config, toy_dataset(), &[0.25]),
        Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(
        Evaluator::new(EvalConfig::default(), toy_dataset(), &[]),
        Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(
        Evaluator::new(EvalConfig::default(), toy_dataset(), &[0.25, 1.5]),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn evaluates_every_threshold() {
    let mut evaluator = Evaluator::new(fast_config(), toy_dataset(), &[0.25, 0.5]).unwrap();
    evaluator.process_batch(&two_sample_batch()).unwrap();
    let report = evaluator.finish();

    assert_eq!(report.batches, 1);
    assert_eq!(report.metrics.len(), 2);
    let (loose, strict) = (&report.metrics[0], &report.metrics[1]);
    assert_eq!(loose.iou_threshold, 0.25);

    // the 0.7 duplicate is suppressed; the crate at x=4 overlaps its box by 0.5/1.5
    assert_abs_diff_eq!(loose.class(0).unwrap().average_precision, 1f32, epsilon = 1e-6);
    assert_eq!(loose.class(0).unwrap().num_detections, 1);
    assert_abs_diff_eq!(loose.class(1).unwrap().average_precision, 1f32, epsilon = 1e-6);
    assert_abs_diff_eq!(loose.mean_average_precision, 1f32, epsilon = 1e-6);

    assert_abs_diff_eq!(strict.class(1).unwrap().recall, 0.5, epsilon = 1e-6);
    assert_abs_diff_eq!(strict.class(1).unwrap().average_precision, 0.25, epsilon = 1e-6);
    assert!(strict.mean_average_precision < loose.mean_average_precision);
    assert_eq!(
        strict.class(0).unwrap().name,
        "box",
        "class names come from the dataset config"
    );

    let lines = report.lines();
    assert!(lines.iter().any(|x| x == "eval mAP: 1.000000"));
    assert!(lines.iter().any(|x| x.starts_with("eval crate Recall")));
}

#[test]
fn averages_loss_accuracy_and_ratio_stats() {
    let mut evaluator = Evaluator::new(fast_config(), toy_dataset(), &[0.25])
        .unwrap()
        .with_ap_method(ApMethod::ElevenPoint);
    for (loss, acc) in [(2f32, 0.5f32), (4f32, 0.7f32)] {
        let mut batch = two_sample_batch();
        batch.stats.insert("loss".to_string(), loss);
        batch.stats.insert("obj_acc".to_string(), acc);
        batch.stats.insert("pos_ratio".to_string(), 0.25);
        batch.stats.insert("epoch".to_string(), 3f32);
        evaluator.process_batch(&batch).unwrap();
    }
    let report = evaluator.finish();
    assert_eq!(report.batches, 2);
    assert_abs_diff_eq!(report.mean_stats["loss"], 3f64, epsilon = 1e-6);
    assert_abs_diff_eq!(report.mean_stats["obj_acc"], 0.6, epsilon = 1e-6);
    assert_abs_diff_eq!(report.mean_stats["pos_ratio"], 0.25, epsilon = 1e-6);
    assert!(!report.mean_stats.contains_key("epoch"));
    assert_eq!(evaluator.calculators()[0].num_samples(), 4);
}

#[test]
fn objectness_stats_need_labels() {
    let mut evaluator = Evaluator::new(fast_config(), toy_dataset(), &[0.25])
        .unwrap()
        .with_objectness_stats(ObjectnessThresholds {
            pos_prob: 0.5,
            neg_prob: 0.5,
        });
    assert!(matches!(
        evaluator.process_batch(&two_sample_batch()),
        Err(Error::MissingField("objectness_label"))
    ));
}

#[test]
fn objectness_stats_count_confusions() {
    let mut evaluator = Evaluator::new(fast_config(), toy_dataset(), &[0.25])
        .unwrap()
        .with_objectness_stats(ObjectnessThresholds {
            pos_prob: 0.65,
            neg_prob: 0.65,
        });
    let mut batch = two_sample_batch();
    // sample 0: probs 0.9, 0.7, 0.8; sample 1: 0.6 and one padding proposal
    batch.objectness_label = Some(array![[1, 0, 1], [1, 0, 0]]);
    batch.objectness_mask = Some(Array2::from_elem((2, 3), 1f32));
    evaluator.process_batch(&batch).unwrap();
    let stats = evaluator.finish().mean_stats;

    // positives: 0.9 tp, 0.7 fp, 0.8 tp; negatives: 0.6 fn, both padding slots tn
    assert_abs_diff_eq!(stats["objectness_total_gt_pos"], 1.5, epsilon = 1e-9);
    assert_abs_diff_eq!(stats["objectness_total_det_pos"], 1.5, epsilon = 1e-9);
    assert_abs_diff_eq!(stats["objectness_total_tp"], 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(stats["objectness_pos_prec"], 2f64 / 3f64, epsilon = 1e-9);
    assert_abs_diff_eq!(stats["objectness_pos_rec"], 2f64 / 3f64, epsilon = 1e-9);
    assert_abs_diff_eq!(stats["objectness_neg_prec"], 2f64 / 3f64, epsilon = 1e-9);
    assert_abs_diff_eq!(stats["objectness_total_tn"], 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(stats["objectness_fn_rate"], 1f64 / 3f64, epsilon = 1e-9);
    assert!(stats.values().all(|x| x.is_finite()));
}

#[test]
fn model_outputs_must_fit_the_dataset() {
    let mut evaluator = Evaluator::new(fast_config(), toy_dataset(), &[0.25]).unwrap();
    let mut batch = two_sample_batch();
    batch.proposals.sem_cls_scores = ndarray::Array3::zeros((2, 3, 3));
    assert!(matches!(
        evaluator.process_batch(&batch),
        Err(Error::ShapeMismatch(_))
    ));
    assert_eq!(evaluator.calculators()[0].num_samples(), 0);
}
