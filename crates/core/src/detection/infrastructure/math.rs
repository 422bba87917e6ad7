//! Box geometry shared by NMS and the tracker.

/// IoU between two bounding boxes represented as `[x1, y1, x2, y2]`.
pub fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case::disjoint([0.0, 0.0, 10.0, 10.0], [20.0, 20.0, 30.0, 30.0], 0.0)]
    #[case::identical([0.0, 0.0, 10.0, 10.0], [0.0, 0.0, 10.0, 10.0], 1.0)]
    #[case::partial([0.0, 0.0, 10.0, 10.0], [5.0, 5.0, 15.0, 15.0], 25.0 / 175.0)]
    #[case::touching([0.0, 0.0, 10.0, 10.0], [10.0, 0.0, 20.0, 10.0], 0.0)]
    #[case::contained([0.0, 0.0, 100.0, 100.0], [25.0, 25.0, 75.0, 75.0], 0.25)]
    fn test_bbox_iou(#[case] a: [f64; 4], #[case] b: [f64; 4], #[case] expected: f64) {
        assert_relative_eq!(bbox_iou(&a, &b), expected);
    }
}
