use dms_kernel::pose::{COCO_LEFT_WRIST, COCO_RIGHT_WRIST};
use dms_kernel::{
    AnalysisReport, Analyzer, AnalyzerConfig, BoundingBox, DetectionFrame, ObjectDetection,
    PersonPose, Point, PoseFrame, RuleKind, SegmentParams, TrackingMode, WristPair,
    WristUsageSettings,
};

const LEFT: Point = Point::new(100.0, 100.0);
const RIGHT: Point = Point::new(500.0, 100.0);

fn config(tracking: TrackingMode) -> AnalyzerConfig {
    AnalyzerConfig {
        default_rules: vec![RuleKind::WristPhoneUsage],
        wrist_phone_usage: Some(WristUsageSettings {
            max_wrist_dist: 50.0,
            segment: SegmentParams {
                min_duration: 3000,
                max_short_diff: 3000,
                max_long_diff: 5000,
            },
            detected_classes: vec!["cell phone".to_string()],
            category: "phone usage".to_string(),
            wrists: WristPair::default(),
        }),
        tracking,
        batch_size: 4,
    }
}

/// A person standing at `at`, so both the centroid and the wrists sit there.
fn person(person_id: u32, at: Point) -> PersonPose {
    PersonPose::new(person_id, vec![at; 17])
}

fn phone_at(center: Point) -> ObjectDetection {
    ObjectDetection::new(
        "cell phone",
        BoundingBox::new(center.x - 5.0, center.y - 5.0, center.x + 5.0, center.y + 5.0),
    )
}

/// Frame ids start at 1; `objects(i)` lists detections of the i-th frame.
fn detection_stream(
    stamps: &[f64],
    objects: impl Fn(usize) -> Vec<ObjectDetection>,
) -> Vec<DetectionFrame> {
    stamps
        .iter()
        .enumerate()
        .map(|(i, &ts)| DetectionFrame::new(i as u64 + 1, ts, objects(i)))
        .collect()
}

fn pose_stream(frames: usize, people: impl Fn(usize) -> Vec<PersonPose>) -> Vec<PoseFrame> {
    (0..frames)
        .map(|i| PoseFrame::new(i as u64 + 1, people(i)))
        .collect()
}

/// Person 1 at LEFT holding a phone in every frame.
fn single_holder(stamps: &[f64]) -> (Vec<DetectionFrame>, Vec<PoseFrame>) {
    (
        detection_stream(stamps, |_| vec![phone_at(LEFT)]),
        pose_stream(stamps.len(), |_| vec![person(1, LEFT)]),
    )
}

fn run(stamps: &[f64]) -> AnalysisReport {
    let analyzer = Analyzer::new(&config(TrackingMode::PassThrough)).expect("analyzer");
    let (detections, poses) = single_holder(stamps);
    analyzer.analyze(detections, poses)
}

fn spans(report: &AnalysisReport) -> Vec<(String, String, u32)> {
    report
        .records()
        .into_iter()
        .map(|r| (r.start, r.end, r.person_id))
        .collect()
}

fn span(start: &str, end: &str, person_id: u32) -> (String, String, u32) {
    (start.to_string(), end.to_string(), person_id)
}

#[test]
fn sustained_use_with_late_gap_is_one_interval() {
    let report = run(&[0.0, 1000.0, 2000.0, 3000.0, 6000.0]);
    assert_eq!(spans(&report), vec![span("0:00", "0:06", 1)]);
    assert_eq!(report.records()[0].category, "phone usage");
}

#[test]
fn lone_hit_never_emits() {
    assert!(run(&[4000.0]).violations.is_empty());

    // The final hit breaks the episode, so it is dropped rather than flushed.
    let report = run(&[0.0, 1000.0, 2000.0, 3000.0, 3500.0, 20_000.0]);
    assert_eq!(spans(&report), vec![span("0:00", "0:03", 1)]);
}

#[test]
fn phone_exactly_at_max_distance_does_not_count() {
    let analyzer = Analyzer::new(&config(TrackingMode::PassThrough)).expect("analyzer");
    let stamps = [0.0, 1000.0, 2000.0];
    let poses = pose_stream(stamps.len(), |_| vec![person(0, LEFT)]);

    let on_boundary = detection_stream(&stamps, |_| vec![phone_at(Point::new(150.0, 100.0))]);
    let report = analyzer.analyze(on_boundary, poses.clone());
    assert_eq!(report.stats.hits, 0);
    assert!(report.violations.is_empty());

    let just_inside = detection_stream(&stamps, |_| vec![phone_at(Point::new(149.5, 100.0))]);
    let report = analyzer.analyze(just_inside, poses);
    assert_eq!(report.stats.hits, 3);
    assert_eq!(spans(&report), vec![span("0:00", "0:02", 0)]);
}

#[test]
fn frames_without_watched_objects_produce_nothing() {
    let analyzer = Analyzer::new(&config(TrackingMode::PassThrough)).expect("analyzer");
    let stamps: Vec<f64> = (0..20).map(|i| i as f64 * 500.0).collect();
    let detections = detection_stream(&stamps, |i| {
        if i % 2 == 0 {
            vec![ObjectDetection::new("cup", BoundingBox::new(95.0, 95.0, 105.0, 105.0))]
        } else {
            Vec::new()
        }
    });
    let poses = pose_stream(stamps.len(), |_| vec![person(0, LEFT)]);

    let report = analyzer.analyze(detections, poses);
    assert!(report.violations.is_empty());
    assert_eq!(report.stats.frames, 20);
    assert_eq!(report.stats.hits, 0);
    assert_eq!(report.stats.skipped_detections, 0);
}

#[test]
fn negative_timestamps_never_reach_the_output() {
    let report = run(&[-1500.0, -500.0, 0.0, 1000.0, 2000.0]);
    assert_eq!(report.stats.hits, 5);
    assert_eq!(spans(&report), vec![span("0:00", "0:02", 1)]);

    assert!(run(&[-4000.0, -3000.0, -2000.0]).violations.is_empty());
}

#[test]
fn short_gap_boundary_is_inclusive() {
    let report = run(&[0.0, 1000.0, 4000.0]);
    assert_eq!(spans(&report), vec![span("0:00", "0:04", 1)]);

    // One millisecond over closes a young episode, which is too short to keep.
    let report = run(&[0.0, 1000.0, 4001.0]);
    assert!(report.violations.is_empty());
}

#[test]
fn long_gap_boundary_is_inclusive() {
    let report = run(&[0.0, 1000.0, 2000.0, 3000.0, 4000.0, 9000.0]);
    assert_eq!(spans(&report), vec![span("0:00", "0:09", 1)]);

    let report = run(&[0.0, 1000.0, 2000.0, 3000.0, 4000.0, 9001.0]);
    assert_eq!(spans(&report), vec![span("0:00", "0:04", 1)]);
}

#[test]
fn hit_that_breaks_an_episode_is_not_reused() {
    let report = run(&[
        0.0, 1000.0, 2000.0, 3000.0, 4000.0, 10_000.0, 11_000.0, 12_000.0,
    ]);
    // The 10s hit closes the first episode; the next one opens at 11s.
    assert_eq!(
        spans(&report),
        vec![span("0:00", "0:04", 1), span("0:11", "0:12", 1)]
    );
}

#[test]
fn interleaved_people_are_segmented_independently() {
    let analyzer = Analyzer::new(&config(TrackingMode::PassThrough)).expect("analyzer");
    let stamps: Vec<f64> = (0..7).map(|i| i as f64 * 1000.0).collect();
    let detections = detection_stream(&stamps, |i| {
        let mut objects = vec![phone_at(LEFT)];
        if i >= 2 {
            objects.push(phone_at(RIGHT));
        }
        objects
    });
    let poses = pose_stream(stamps.len(), |_| vec![person(0, LEFT), person(1, RIGHT)]);

    let report = analyzer.analyze(detections, poses);
    assert_eq!(
        spans(&report),
        vec![span("0:00", "0:06", 0), span("0:02", "0:06", 1)]
    );
}

#[test]
fn two_phones_near_one_person_count_once() {
    let analyzer = Analyzer::new(&config(TrackingMode::PassThrough)).expect("analyzer");
    let stamps = [0.0, 1000.0, 2000.0, 3000.0, 6000.0];
    let detections = detection_stream(&stamps, |_| {
        vec![phone_at(LEFT), phone_at(Point::new(110.0, 95.0))]
    });
    let poses = pose_stream(stamps.len(), |_| vec![person(1, LEFT)]);

    let report = analyzer.analyze(detections, poses);
    assert_eq!(report.stats.hits, 10);
    assert_eq!(spans(&report), vec![span("0:00", "0:06", 1)]);
}

#[test]
fn batch_size_does_not_change_the_result() {
    let analyzer = Analyzer::new(&config(TrackingMode::PassThrough)).expect("analyzer");
    let stamps = [
        0.0, 1000.0, 2000.0, 3000.0, 4000.0, 10_000.0, 11_000.0, 12_000.0, 13_000.0,
    ];
    let (detections, poses) = single_holder(&stamps);
    let expected = analyzer.analyze(detections.clone(), poses.clone());
    assert_eq!(expected.violations.len(), 2);

    for batch_size in [1, 2, 3, 4, 9] {
        let mut session = analyzer.session();
        for (det_chunk, pose_chunk) in detections.chunks(batch_size).zip(poses.chunks(batch_size)) {
            session.push_batch(det_chunk.to_vec(), pose_chunk.to_vec());
        }
        let report = session.finish();
        assert_eq!(report.violations, expected.violations, "batch size {batch_size}");
    }
}

#[test]
fn runs_are_deterministic_and_independent() {
    let analyzer = Analyzer::new(&config(TrackingMode::PassThrough)).expect("analyzer");
    let (detections, poses) = single_holder(&[0.0, 1000.0, 2000.0, 3000.0, 6000.0]);
    let first = analyzer.analyze(detections.clone(), poses.clone());
    let second = analyzer.analyze(detections, poses);
    assert_eq!(first, second);
    assert_eq!(second.violations.len(), 1);
}

#[test]
fn tracking_keeps_identity_when_upstream_order_swaps() {
    let stamps: Vec<f64> = (0..7).map(|i| i as f64 * 1000.0).collect();
    let detections = detection_stream(&stamps, |_| vec![phone_at(LEFT)]);
    // The estimator numbers people by position in its output, and the order
    // flips every frame.
    let poses = pose_stream(stamps.len(), |i| {
        if i % 2 == 0 {
            vec![person(0, LEFT), person(1, RIGHT)]
        } else {
            vec![person(0, RIGHT), person(1, LEFT)]
        }
    });

    let pass_through = Analyzer::new(&config(TrackingMode::PassThrough)).expect("analyzer");
    let report = pass_through.analyze(detections.clone(), poses.clone());
    assert_eq!(report.violations.len(), 2);

    let tracked = Analyzer::new(&config(TrackingMode::NearestKeypoint {
        max_match_dist: 50.0,
        max_idle_frames: 10,
    }))
    .expect("analyzer");
    let report = tracked.analyze(detections, poses);
    assert_eq!(spans(&report), vec![span("0:00", "0:06", 0)]);
}

#[test]
fn right_wrist_is_checked_too() {
    let analyzer = Analyzer::new(&config(TrackingMode::PassThrough)).expect("analyzer");
    let stamps = [0.0, 1000.0, 2000.0];
    let detections = detection_stream(&stamps, |_| vec![phone_at(RIGHT)]);
    let poses = pose_stream(stamps.len(), |_| {
        let mut keypoints = vec![Point::new(900.0, 900.0); 17];
        keypoints[COCO_LEFT_WRIST] = LEFT;
        keypoints[COCO_RIGHT_WRIST] = RIGHT;
        vec![PersonPose::new(4, keypoints)]
    });

    let report = analyzer.analyze(detections, poses);
    assert_eq!(spans(&report), vec![span("0:00", "0:02", 4)]);
}
