use super::*;

const MAX_PERCENTILE: f64 = 100.;

#[inline(always)]
fn greater(a: f64, b: f64) -> bool {
    a - b >= std::f64::EPSILON
}

#[inline(always)]
fn lesser(a: f64, b: f64) -> bool {
    b - a >= std::f64::EPSILON
}

#[inline(always)]
fn equal(a: f64, b: f64) -> bool {
    (b - a).abs() < std::f64::EPSILON
}

/// Rejects percentiles outside `[0.0, 100.0]`, within an epsilon.
pub(crate) fn check(p: f64) -> Result<()> {
    if p.is_nan() {
        error!("percentile must be between [0.0, 100.0], NaN provided");
        return Err(Error::NotANumber);
    }
    if greater(p, MAX_PERCENTILE) {
        error!("percentile must be between [0.0, 100.0], {} provided", p);
        return Err(Error::Overflow);
    }
    if lesser(p, 0.) {
        error!("percentile must be between [0.0, 100.0], {} provided", p);
        return Err(Error::Underflow);
    }
    Ok(())
}

/// The number of records that must be at or below a bucket for it to
/// satisfy percentile `p`.
pub(crate) fn threshold(total: u64, p: f64) -> u64 {
    let needed = (p * total as f64 / MAX_PERCENTILE).ceil();
    // float to int casts saturate, and -0.0 becomes 0
    (needed as u64).min(total)
}

fn reserve<T>(capacity: usize) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(capacity)
        .map_err(|_| Error::Alloc(capacity))?;
    Ok(v)
}

/// A fixed list of percentiles resolved together against a `Histo`
/// in a single scan.
///
/// Results are bucket indices, so they are only meaningful against the
/// histogram passed to the last `Histo::report_multi` call.
#[derive(Debug, Clone)]
pub struct PercentileProfile {
    capacity: usize,
    percentiles: Vec<f64>,
    results: Vec<usize>,
    min: usize,
    max: usize,
}

impl PercentileProfile {
    /// Create a profile that can hold up to `capacity` percentiles.
    pub fn new(capacity: usize) -> Result<PercentileProfile> {
        let percentiles = reserve(capacity)?;
        let results = reserve(capacity)?;

        trace!("created percentile profile with {} configurable percentiles", capacity);

        Ok(PercentileProfile {
            capacity,
            percentiles,
            results,
            min: 0,
            max: 0,
        })
    }

    /// Replace the percentile list.
    ///
    /// Every value must lie in `[0.0, 100.0]` and be strictly greater than
    /// the one before it. The whole list is validated before anything is
    /// stored, so on error the previous list is left in place.
    pub fn set(&mut self, percentiles: &[f64]) -> Result<()> {
        if percentiles.len() > self.capacity {
            error!(
                "{} percentiles provided, profile holds at most {}",
                percentiles.len(),
                self.capacity
            );
            return Err(Error::Capacity {
                count: percentiles.len(),
                capacity: self.capacity,
            });
        }

        let mut last = -1.;
        for &p in percentiles {
            check(p)?;
            if lesser(p, last) || equal(p, last) {
                error!("percentiles being queried must be increasing, {} follows {}", p, last);
                return Err(Error::Order);
            }
            last = p;
        }

        self.percentiles.clear();
        self.percentiles.extend_from_slice(percentiles);
        self.results.clear();
        self.results.resize(percentiles.len(), 0);
        self.min = 0;
        self.max = 0;

        trace!("set percentile profile with {} percentiles", percentiles.len());

        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of percentiles currently set.
    pub fn len(&self) -> usize {
        self.percentiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.percentiles.is_empty()
    }

    pub fn percentiles(&self) -> &[f64] {
        &self.percentiles
    }

    /// Bucket indices resolved by the last `Histo::report_multi`, one per
    /// percentile.
    pub fn results(&self) -> &[usize] {
        &self.results
    }

    /// Pairs of (percentile, bucket index).
    pub fn iter(&self) -> impl Iterator<Item = (f64, usize)> + '_ {
        self.percentiles
            .iter()
            .copied()
            .zip(self.results.iter().copied())
    }

    /// The lowest non-empty bucket seen by the last report.
    pub fn min(&self) -> usize {
        self.min
    }

    /// The highest non-empty bucket seen by the last report.
    pub fn max(&self) -> usize {
        self.max
    }

    pub(crate) fn resolve(&mut self) -> (&[f64], &mut [usize]) {
        (&self.percentiles[..], &mut self.results[..])
    }

    pub(crate) fn set_bounds(&mut self, min: usize, max: usize) {
        self.min = min;
        self.max = max;
    }
}

#[cfg(test)]
const PARRAY: [f64; 7] = [25., 50., 75., 90., 95., 99., 99.9];
#[cfg(test)]
const PBAD: [f64; 7] = [-5., 0., 50., 50., 25., 100., 200.];

#[test]
fn set_percentiles() {
    let mut pp = PercentileProfile::new(PARRAY.len() * 2).unwrap();
    assert_eq!(pp.capacity(), 14);
    assert_eq!(pp.len(), 0);
    assert!(pp.is_empty());

    pp.set(&PARRAY).unwrap();
    assert_eq!(pp.len(), PARRAY.len());
    for (have, want) in pp.percentiles().iter().zip(PARRAY.iter()) {
        assert!((have - want).abs() < std::f64::EPSILON);
    }
    assert_eq!(pp.results(), &[0; 7][..]);

    assert_eq!(pp.set(&PBAD[0..2]), Err(Error::Underflow));
    assert_eq!(pp.set(&PBAD[1..4]), Err(Error::Order));
    assert_eq!(pp.set(&PBAD[3..6]), Err(Error::Order));
    assert_eq!(pp.set(&PBAD[4..7]), Err(Error::Overflow));
    assert_eq!(pp.set(&[10., std::f64::NAN]), Err(Error::NotANumber));
}

#[test]
fn failed_set_keeps_previous_list() {
    let mut pp = PercentileProfile::new(4).unwrap();
    pp.set(&[1., 2., 3.]).unwrap();

    assert_eq!(pp.set(&[5., 10., 10.]), Err(Error::Order));
    assert_eq!(pp.percentiles(), &[1., 2., 3.][..]);
    assert_eq!(pp.len(), 3);

    assert_eq!(
        pp.set(&[1., 2., 3., 4., 5.]),
        Err(Error::Capacity { count: 5, capacity: 4 })
    );
    assert_eq!(pp.len(), 3);

    pp.set(&[]).unwrap();
    assert!(pp.is_empty());
}

#[test]
fn bounds_are_inclusive() {
    let mut pp = PercentileProfile::new(2).unwrap();
    pp.set(&[0., 100.]).unwrap();
    assert_eq!(pp.set(&[0., 100.0001]), Err(Error::Overflow));
    assert_eq!(pp.set(&[-0.0001]), Err(Error::Underflow));
    // differences below epsilon count as equal
    assert_eq!(pp.set(&[50., 50. + std::f64::EPSILON / 4.]), Err(Error::Order));
}

#[test]
fn thresholds() {
    assert_eq!(threshold(3, 0.), 0);
    assert_eq!(threshold(3, 10.), 1);
    assert_eq!(threshold(3, 50.), 2);
    assert_eq!(threshold(3, 75.), 3);
    assert_eq!(threshold(3, 100.), 3);
    assert_eq!(threshold(10, 70.), 7);
    assert_eq!(threshold(3, -std::f64::EPSILON / 2.), 0);
    assert_eq!(threshold(1_000, 100. + std::f64::EPSILON / 2.), 1_000);
}
