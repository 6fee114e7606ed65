use crate::detect::result::{RawDetection, ValidatedDetection};

/// Intersection-over-union of two axis-aligned boxes.
///
/// Returns 0 when the boxes do not overlap on both axes or the union is empty.
pub fn iou(a: &RawDetection, b: &RawDetection) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let intersection = if x2 > x1 && y2 > y1 {
        (x2 - x1) * (y2 - y1)
    } else {
        0.0
    };

    let union = a.area() + b.area() - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Greedy class-scoped non-maximum suppression.
///
/// Boxes are visited by descending confidence, ties in input order. Each box
/// that survives suppresses every later box of the same class whose IoU with
/// it exceeds `iou_threshold`. Every surviving pair is compared; the scan never
/// stops early.
pub fn suppress(detections: &[ValidatedDetection], iou_threshold: f32) -> Vec<ValidatedDetection> {
    let mut order: Vec<usize> = (0..detections.len()).collect();
    // sort_by is stable, which fixes the tie-break on input order.
    order.sort_by(|&a, &b| {
        detections[b]
            .confidence
            .total_cmp(&detections[a].confidence)
    });

    let mut suppressed = vec![false; order.len()];
    let mut kept = Vec::with_capacity(order.len());

    for (rank, &idx) in order.iter().enumerate() {
        if suppressed[rank] {
            continue;
        }
        let keep = &detections[idx];
        kept.push(*keep);

        for (later, &other_idx) in order.iter().enumerate().skip(rank + 1) {
            if suppressed[later] {
                continue;
            }
            let other = &detections[other_idx];
            if other.class_id == keep.class_id && iou(keep, other) > iou_threshold {
                suppressed[later] = true;
            }
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        confidence: f32,
        class_id: i32,
    ) -> ValidatedDetection {
        ValidatedDetection::new(RawDetection {
            x1,
            y1,
            x2,
            y2,
            track_id: None,
            confidence,
            class_id,
        })
    }

    #[test]
    fn iou_of_offset_boxes() {
        let a = det(0.0, 0.0, 10.0, 10.0, 0.9, 0);
        let b = det(1.0, 1.0, 11.0, 11.0, 0.6, 0);
        let v = iou(&a, &b);
        assert!((v - 81.0 / 119.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_and_touching_boxes_is_zero() {
        let a = det(0.0, 0.0, 10.0, 10.0, 0.9, 0);
        assert_eq!(iou(&a, &det(20.0, 20.0, 30.0, 30.0, 0.9, 0)), 0.0);
        // Shares an edge only.
        assert_eq!(iou(&a, &det(10.0, 0.0, 20.0, 10.0, 0.9, 0)), 0.0);
        // Overlaps on x but not on y.
        assert_eq!(iou(&a, &det(2.0, 15.0, 8.0, 25.0, 0.9, 0)), 0.0);
    }

    #[test]
    fn keeps_higher_confidence_of_overlapping_pair() {
        let boxes = [det(1.0, 1.0, 11.0, 11.0, 0.6, 0), det(0.0, 0.0, 10.0, 10.0, 0.9, 0)];
        let kept = suppress(&boxes, 0.4);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn threshold_is_exclusive() {
        // IoU of exactly 0.5: 100 overlap / 200 union.
        let boxes = [det(0.0, 0.0, 10.0, 15.0, 0.9, 0), det(0.0, 5.0, 10.0, 20.0, 0.8, 0)];
        let v = iou(&boxes[0], &boxes[1]);
        assert!((v - 0.5).abs() < 1e-6);
        assert_eq!(suppress(&boxes, 0.5).len(), 2);
        assert_eq!(suppress(&boxes, 0.49).len(), 1);
    }

    #[test]
    fn different_classes_never_suppress_each_other() {
        let boxes = [det(0.0, 0.0, 10.0, 10.0, 0.9, 0), det(0.0, 0.0, 10.0, 10.0, 0.8, 2)];
        assert_eq!(suppress(&boxes, 0.1).len(), 2);
    }

    #[test]
    fn equal_confidence_keeps_first_in_input_order() {
        let first = det(0.0, 0.0, 10.0, 10.0, 0.7, 0);
        let second = det(0.5, 0.5, 10.5, 10.5, 0.7, 0);
        let kept = suppress(&[first, second], 0.4);
        assert_eq!(kept, vec![first]);
    }

    #[test]
    fn suppressed_box_does_not_suppress_others() {
        // b overlaps both a and c, but a and c barely overlap. a suppresses b,
        // so c must survive even though IoU(b, c) is above the threshold.
        let a = det(0.0, 0.0, 10.0, 10.0, 0.9, 0);
        let b = det(4.0, 0.0, 14.0, 10.0, 0.8, 0);
        let c = det(8.0, 0.0, 18.0, 10.0, 0.7, 0);
        let kept = suppress(&[c, b, a], 0.3);
        assert_eq!(kept, vec![a, c]);
    }

    #[test]
    fn output_is_ordered_by_confidence() {
        let boxes = [
            det(0.0, 0.0, 10.0, 10.0, 0.3, 0),
            det(100.0, 0.0, 110.0, 10.0, 0.8, 0),
            det(200.0, 0.0, 210.0, 10.0, 0.5, 0),
        ];
        let kept = suppress(&boxes, 0.4);
        let confs: Vec<f32> = kept.iter().map(|d| d.confidence).collect();
        assert_eq!(confs, vec![0.8, 0.5, 0.3]);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(suppress(&[], 0.4).is_empty());
    }
}
