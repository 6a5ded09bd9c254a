use crate::Scalar;

/// Returns `num` evenly spaced values over `[start, end]`, both ends included.
///
/// Bin edges for `n` bins are `linspace(min, max, n + 1)`.
pub fn linspace(start: Scalar, end: Scalar, num: usize) -> impl Iterator<Item = Scalar> + Clone {
    let step = if num > 1 {
        (end - start) / (num - 1) as Scalar
    } else {
        0.
    };

    (0..num).map(move |i| {
        // pin the last value so `end` is hit exactly
        if i + 1 == num && num > 1 {
            end
        } else {
            start + i as Scalar * step
        }
    })
}

/// Relative spread of the intervals in `edges`, zero for perfectly uniform spacing.
pub(crate) fn spacing_deviation(edges: &[Scalar]) -> Scalar {
    let step = edges[1] - edges[0];
    edges
        .windows(2)
        .map(|w| ((w[1] - w[0]) - step).abs() / step.abs())
        .fold(0., Scalar::max)
}
