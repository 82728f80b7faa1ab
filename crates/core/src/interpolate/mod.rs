use crate::{BlockRecord, BlockStore, Metrics};

/// Interpolates every metric of `lo` towards `hi` at position `t`.
///
/// Endpoints are returned exactly: `t` at or before `lo.block_index` yields
/// `lo.metrics`, at or after `hi.block_index` yields `hi.metrics`. When both
/// records share an index the result is `lo.metrics`.
///
/// Both records must carry the same metric names, which holds for any pair
/// taken from one [`BlockStore`]. The blend is a pure function of its inputs,
/// so the live display and the recorder produce bit-identical frames for the
/// same position.
pub fn interpolate(lo: &BlockRecord, hi: &BlockRecord, t: f64) -> Metrics {
    debug_assert!(
        lo.metrics.keys().eq(hi.metrics.keys()),
        "blocks {} and {} have different metric names",
        lo.block_index,
        hi.block_index
    );
    if lo.block_index == hi.block_index || !(t > lo.position()) {
        return lo.metrics.clone();
    }
    if t >= hi.position() {
        return hi.metrics.clone();
    }

    let span = hi.position() - lo.position();
    let offset = t - lo.position();

    lo.metrics
        .iter()
        .map(|(name, &start)| {
            let end = hi.metrics.get(name).copied().unwrap_or(start);
            (name.clone(), start + (end - start) * offset / span)
        })
        .collect()
}

/// Samples the store at `t`, clamping outside the stored range.
pub fn sample(store: &BlockStore, t: f64) -> Metrics {
    let (lo, hi) = store.lookup(t);
    interpolate(lo, hi, t)
}
