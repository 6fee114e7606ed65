use std::collections::BTreeSet;

use wagon_occupancy::detect::{suppress, SizeFilter};
use wagon_occupancy::ingest::{DetectionSource, SyntheticConfig, SyntheticSource};
use wagon_occupancy::{
    DetectionStatus, Frame, InMemoryOccupancySink, OccupancyLevel, OccupancySink,
    RawDetection, RetentionPolicy, Session, SessionConfig, TrackId,
};

const LOOSE_FILTER: SizeFilter = SizeFilter {
    min_width: 1.0,
    min_height: 1.0,
    max_width_ratio: 1.0,
    max_height_ratio: 1.0,
};

fn square_config(capacity: u32) -> SessionConfig {
    SessionConfig {
        zone: vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]],
        capacity,
        frame_width: 100,
        frame_height: 100,
        size_filter: LOOSE_FILTER,
        ..SessionConfig::default()
    }
}

/// Person box whose bottom-center anchor is `(x, y)`.
fn person_at(id: TrackId, x: f32, y: f32) -> RawDetection {
    RawDetection {
        x1: x - 1.0,
        y1: y - 3.0,
        x2: x + 1.0,
        y2: y,
        track_id: Some(id),
        confidence: 0.9,
        class_id: 0,
    }
}

fn frame(index: u64, detections: Vec<RawDetection>) -> Frame {
    Frame {
        index,
        at: index as f64,
        detections,
    }
}

fn ids(set: &BTreeSet<TrackId>) -> Vec<TrackId> {
    set.iter().copied().collect()
}

#[test]
fn cumulative_count_in_square_zone() {
    let mut sink = InMemoryOccupancySink::new();
    let mut session = Session::start("scenario_a", square_config(2)).unwrap();

    let r1 = session.process_frame(&frame(1, vec![person_at(1, 5.0, 5.0)]), &mut sink);
    assert_eq!(ids(&r1.tracked), vec![1]);
    assert_eq!(r1.snapshot.fullness_percent, 50.0);

    let r2 = session.process_frame(&frame(2, vec![]), &mut sink);
    assert_eq!(ids(&r2.tracked), vec![1]);
    assert_eq!(r2.snapshot.fullness_percent, 50.0);

    let r3 = session.process_frame(
        &frame(3, vec![person_at(2, 5.0, 5.0), person_at(3, 50.0, 50.0)]),
        &mut sink,
    );
    assert_eq!(ids(&r3.tracked), vec![1, 2]);
    assert_eq!(ids(&r3.in_zone), vec![2]);
    assert_eq!(r3.snapshot.fullness_percent, 100.0);
    assert_eq!(r3.snapshot.level, OccupancyLevel::Crowded);
    assert_eq!(
        r3.detections.iter().map(|d| d.status).collect::<Vec<_>>(),
        vec![DetectionStatus::InZone, DetectionStatus::Outside]
    );

    let current = sink.current("scenario_a").unwrap().unwrap();
    assert_eq!(current.count, 2);
    assert_eq!(current.frame_index, 3);
    assert_eq!(sink.history("scenario_a", 10).unwrap().len(), 3);
}

#[test]
fn overlapping_boxes_keep_higher_confidence() {
    let boxes = [
        RawDetection {
            x1: 0.0,
            y1: 0.0,
            x2: 10.0,
            y2: 10.0,
            track_id: None,
            confidence: 0.9,
            class_id: 0,
        },
        RawDetection {
            x1: 1.0,
            y1: 1.0,
            x2: 11.0,
            y2: 11.0,
            track_id: None,
            confidence: 0.6,
            class_id: 0,
        },
    ];
    let validated: Vec<_> = boxes
        .iter()
        .map(|raw| LOOSE_FILTER.check(raw, 100.0, 100.0).unwrap())
        .collect();

    let kept = suppress(&validated, 0.4);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].confidence, 0.9);
}

#[test]
fn fullness_saturates_when_over_capacity() {
    let mut sink = InMemoryOccupancySink::new();
    let mut session = Session::start("scenario_c", square_config(1)).unwrap();
    let report = session.process_frame(
        &frame(
            0,
            vec![
                person_at(1, 2.0, 2.0),
                person_at(2, 5.0, 9.0),
                person_at(3, 8.0, 5.0),
            ],
        ),
        &mut sink,
    );
    assert_eq!(report.snapshot.count, 3);
    assert_eq!(report.snapshot.fullness_percent, 100.0);
}

#[test]
fn undersized_detection_never_reaches_tracker() {
    let mut sink = InMemoryOccupancySink::new();
    let mut session = Session::start("scenario_d", SessionConfig::default()).unwrap();
    // Width 5 with the anchor well inside the default wagon zone.
    let narrow = RawDetection {
        x1: 698.0,
        y1: 500.0,
        x2: 703.0,
        y2: 600.0,
        track_id: Some(11),
        confidence: 0.95,
        class_id: 0,
    };
    let report = session.process_frame(&frame(0, vec![narrow]), &mut sink);
    assert_eq!(report.rejected, 1);
    assert!(report.detections.is_empty());
    assert!(session.tracked().is_empty());
}

#[test]
fn sticky_tracked_set_only_grows() {
    let mut sink = InMemoryOccupancySink::new();
    let config = SessionConfig::default();
    let mut source = SyntheticSource::new(SyntheticConfig {
        frames: 600,
        people: 20,
        seed: 42,
        ..SyntheticConfig::default()
    })
    .unwrap();
    let mut session = Session::start("sticky_walk", config).unwrap();

    let mut previous = BTreeSet::new();
    let mut last_emitted = None;
    while let Some(frame) = source.next_frame().unwrap() {
        let report = session.process_frame(&frame, &mut sink);
        assert!(report.tracked.is_superset(&previous));
        assert!((0.0..=100.0).contains(&report.snapshot.fullness_percent));
        if report.emission.is_some() {
            assert!(last_emitted.map_or(true, |last| report.frame_index >= last));
            last_emitted = Some(report.frame_index);
        }
        previous = report.tracked;
    }

    let history = sink.history("sticky_walk", usize::MAX).unwrap();
    assert!(history.windows(2).all(|w| w[0].frame_index <= w[1].frame_index));
    assert!(history.windows(2).all(|w| w[0].count <= w[1].count));
}

#[test]
fn exit_on_leave_count_can_drop() {
    let mut sink = InMemoryOccupancySink::new();
    let config = SessionConfig {
        retention: RetentionPolicy::ExitOnLeave,
        ..square_config(4)
    };
    let mut session = Session::start("leaving", config).unwrap();

    session.process_frame(
        &frame(0, vec![person_at(1, 5.0, 5.0), person_at(2, 6.0, 6.0)]),
        &mut sink,
    );
    let report = session.process_frame(&frame(1, vec![person_at(1, 60.0, 60.0)]), &mut sink);
    assert_eq!(ids(&report.tracked), vec![2]);
    assert_eq!(report.snapshot.fullness_percent, 25.0);
}

#[test]
fn emission_is_rate_limited_to_stream_time() {
    let mut sink = InMemoryOccupancySink::new();
    let mut session = Session::start("rate", square_config(2)).unwrap();
    let mut emitted = Vec::new();
    for index in 0..50u64 {
        let f = Frame {
            index,
            at: index as f64 / 25.0,
            detections: vec![person_at(1, 5.0, 5.0)],
        };
        if session.process_frame(&f, &mut sink).emission.is_some() {
            emitted.push(index);
        }
    }
    assert_eq!(emitted, vec![0, 25]);

    let last = session.finish(&mut sink);
    assert_eq!(last.frame_index, 49);
    assert_eq!(sink.history("rate", 10).unwrap().len(), 3);
}
