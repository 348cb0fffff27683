use std::fmt::{self, Debug};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::*;
use crate::profile::{check, threshold};

/// A non-empty bucket and the values it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub index: usize,
    pub low: u64,
    pub high: u64,
    pub count: u32,
}

/// A fixed-size log-linear histogram.
///
/// There is exactly one writer. `record` takes `&self` so the histogram
/// can be shared with reporting threads, but two threads recording at
/// once will lose counts. Reports never block the writer and read counts
/// as they find them, so a report taken while recording is in flight is
/// advisory rather than a consistent snapshot.
pub struct Histo {
    layout: Layout,
    total: AtomicU64,
    buckets: Box<[AtomicU32]>,
}

impl Debug for Histo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const PS: [f64; 10] = [0., 50., 75., 90., 95., 97.5, 99., 99.9, 99.99, 100.];
        f.write_str("Histo[")?;

        for p in &PS {
            let res = self.report(*p).map(|bucket| self.bucket_range(bucket));
            write!(f, "({} -> {:?}) ", p, res)?;
        }

        f.write_str("]")
    }
}

impl Histo {
    /// Create a histogram with buckets no narrower than `2^m`, linear
    /// below `2^r`, covering values up to `2^n - 1`.
    pub fn new(m: u32, r: u32, n: u32) -> Result<Histo> {
        let layout = Layout::new(m, r, n)?;
        let buckets = try_rep_no_copy!(AtomicU32::new(0); layout.bucket_count())
            .map_err(|e| {
                error!("failed to allocate {} buckets", layout.bucket_count());
                e
            })?
            .into_boxed_slice();

        trace!(
            "created histogram with parameters m={}, r={}, n={}; nbucket={}",
            m,
            r,
            n,
            layout.bucket_count()
        );

        Ok(Histo {
            layout,
            total: AtomicU64::new(0),
            buckets,
        })
    }

    /// Record `count` occurrences of `value`.
    ///
    /// Fails with `Error::Overflow`, recording nothing, when `value` is
    /// above `max_value`. Bucket counters saturate at `u32::MAX`.
    pub fn record(&self, value: u64, count: u32) -> Result<()> {
        if value > self.layout.max_value() {
            error!(
                "value not recorded due to overflow: {} is greater than max value allowed, which is {}",
                value,
                self.layout.max_value()
            );
            return Err(Error::Overflow);
        }

        // single writer, so load and store need not be one atomic step
        let counter = &self.buckets[self.layout.bucket_offset(value)];
        let old = counter.load(Ordering::Relaxed);
        counter.store(old.saturating_add(count), Ordering::Relaxed);

        // publishing the total after the bucket means a reader that sees a
        // non-zero total also sees a non-empty bucket
        let total = self.total.load(Ordering::Relaxed);
        self.total
            .store(total.saturating_add(u64::from(count)), Ordering::Release);

        Ok(())
    }

    /// Zero every bucket and the record count.
    pub fn reset(&mut self) {
        for counter in self.buckets.iter_mut() {
            *counter.get_mut() = 0;
        }
        *self.total.get_mut() = 0;
    }

    /// Find the bucket holding percentile `p`.
    ///
    /// The answer is always a non-empty bucket: `p = 0` gives the lowest
    /// one, and a rank that falls in a run of empty buckets resolves to the
    /// next non-empty bucket above it.
    pub fn report(&self, p: f64) -> Result<usize> {
        check(p)?;

        let total = self.total.load(Ordering::Acquire);
        let min = self.lowest(total)?;
        let needed = threshold(total, p);

        let mut bucket = min;
        let mut seen = 0;
        for (offset, counter) in self.buckets.iter().enumerate().skip(min) {
            if seen >= needed {
                break;
            }
            let count = counter.load(Ordering::Relaxed);
            if count > 0 {
                seen += u64::from(count);
                bucket = offset;
            }
        }

        Ok(bucket)
    }

    /// Resolve every percentile in `profile`, plus the lowest and highest
    /// non-empty buckets, in one pass over the buckets.
    ///
    /// On `Error::Empty` the profile is left untouched.
    pub fn report_multi(&self, profile: &mut PercentileProfile) -> Result<()> {
        let total = self.total.load(Ordering::Acquire);
        let min = self.lowest(total)?;

        let mut curr = min;
        let mut last = min;
        let mut seen = 0;

        let (percentiles, results) = profile.resolve();
        for (p, result) in percentiles.iter().zip(results.iter_mut()) {
            let needed = threshold(total, *p);

            // percentiles ascend, so each one picks up where the last
            // stopped, and one bucket may satisfy several of them
            while seen < needed && curr < self.buckets.len() {
                let count = self.buckets[curr].load(Ordering::Relaxed);
                if count > 0 {
                    seen += u64::from(count);
                    last = curr;
                }
                curr += 1;
            }

            *result = last;
        }

        let max = self.buckets[curr..]
            .iter()
            .rposition(|counter| counter.load(Ordering::Relaxed) > 0)
            .map_or(last, |offset| curr + offset);

        profile.set_bounds(min, max);

        Ok(())
    }

    fn lowest(&self, total: u64) -> Result<usize> {
        let lowest = if total == 0 {
            None
        } else {
            self.buckets
                .iter()
                .position(|counter| counter.load(Ordering::Relaxed) > 0)
        };

        lowest.ok_or_else(|| {
            info!("no value to report due to histogram being empty");
            Error::Empty
        })
    }

    /// Non-empty buckets in ascending order.
    pub fn buckets(&self) -> impl Iterator<Item = Bucket> + '_ {
        self.buckets
            .iter()
            .enumerate()
            .filter_map(move |(index, counter)| {
                let count = counter.load(Ordering::Relaxed);
                if count == 0 {
                    return None;
                }
                Some(Bucket {
                    index,
                    low: self.layout.bucket_low(index),
                    high: self.layout.bucket_high(index),
                    count,
                })
            })
    }

    /// Dump out some common percentiles.
    pub fn print_percentiles(&self) {
        println!("{:?}", self);
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Total records since creation or the last reset.
    pub fn count(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    /// The counter for one bucket.
    pub fn bucket(&self, bucket: usize) -> u32 {
        self.buckets[bucket].load(Ordering::Relaxed)
    }

    pub fn bucket_count(&self) -> usize {
        self.layout.bucket_count()
    }

    pub fn max_value(&self) -> u64 {
        self.layout.max_value()
    }

    pub fn bucket_offset(&self, value: u64) -> usize {
        self.layout.bucket_offset(value)
    }

    pub fn bucket_low(&self, bucket: usize) -> u64 {
        self.layout.bucket_low(bucket)
    }

    pub fn bucket_high(&self, bucket: usize) -> u64 {
        self.layout.bucket_high(bucket)
    }

    pub fn bucket_range(&self, bucket: usize) -> RangeInclusive<u64> {
        self.bucket_low(bucket)..=self.bucket_high(bucket)
    }
}

#[test]
fn it_works() {
    let h = Histo::new(1, 10, 20).unwrap();
    assert_eq!(h.layout().min_resolution(), 2);
    assert_eq!(h.layout().resolution_range(), 1023);
    assert_eq!(h.max_value(), (1 << 20) - 1);
    assert_eq!(h.layout().grouping(), 256);
    assert_eq!(h.bucket_count(), 12 * 256);
    assert_eq!(h.count(), 0);

    assert_eq!(Histo::new(10, 10, 20).unwrap_err(), Error::Shape { m: 10, r: 10, n: 20 });
}

#[test]
fn record() {
    let h = Histo::new(0, 10, 20).unwrap();

    h.record(0, 1).unwrap();
    assert_eq!(h.bucket(0), 1);
    assert_eq!(h.count(), 1);
    h.record(1, 1).unwrap();
    assert_eq!(h.bucket(1), 1);
    assert_eq!(h.count(), 2);
    h.record(1023, 1).unwrap();
    assert_eq!(h.bucket(1023), 1);
    h.record(1024, 1).unwrap();
    assert_eq!(h.bucket(1024), 1);
    h.record(1025, 1).unwrap();
    assert_eq!(h.bucket(1024), 2);
    h.record(1026, 1).unwrap();
    assert_eq!(h.bucket(1025), 1);
    h.record(2048, 1).unwrap();
    assert_eq!(h.bucket(1536), 1);
    h.record(2051, 1).unwrap();
    assert_eq!(h.bucket(1536), 2);
    h.record(2052, 1).unwrap();
    assert_eq!(h.bucket(1537), 1);
    h.record((1 << 20) - 1, 1).unwrap();
    assert_eq!(h.bucket(h.bucket_count() - 1), 1);
    assert_eq!(h.count(), 10);

    assert_eq!(h.record(1 << 20, 1), Err(Error::Overflow));
    assert_eq!(h.count(), 10);
    assert_eq!(h.buckets().map(|b| u64::from(b.count)).sum::<u64>(), 10);

    h.record(7, 5).unwrap();
    assert_eq!(h.bucket(7), 5);
    assert_eq!(h.count(), 15);
}

#[test]
fn counters_saturate() {
    let h = Histo::new(0, 4, 4).unwrap();
    h.record(3, u32::MAX).unwrap();
    h.record(3, 2).unwrap();
    assert_eq!(h.bucket(3), u32::MAX);
    assert_eq!(h.count(), u64::from(u32::MAX) + 2);
    assert_eq!(h.report(100.), Ok(3));
}

#[test]
fn reset() {
    let mut h = Histo::new(1, 3, 5).unwrap();
    h.record(2, 3).unwrap();
    h.record(31, 1).unwrap();
    h.reset();

    assert_eq!(h.count(), 0);
    assert_eq!(h.buckets().count(), 0);
    assert_eq!(h.report(50.), Err(Error::Empty));
    assert_eq!(h.bucket_count(), 8);

    h.record(6, 1).unwrap();
    assert_eq!(h.report(0.), Ok(3));
}

#[test]
fn report_sparse() {
    let percentiles = [0., 10., 50., 75., 100.];
    let results = [1, 1, 3, 6, 6];
    let h = Histo::new(1, 3, 5).unwrap();
    let mut pp = PercentileProfile::new(5).unwrap();

    assert_eq!(h.report(0.1), Err(Error::Empty));

    h.record(2, 1).unwrap();
    h.record(6, 1).unwrap();
    assert_eq!(h.bucket(3), 1);
    h.record(23, 1).unwrap();

    for (p, want) in percentiles.iter().zip(results.iter()) {
        assert_eq!(h.report(*p), Ok(*want), "percentile {}", p);
    }

    pp.set(&percentiles).unwrap();
    h.report_multi(&mut pp).unwrap();
    assert_eq!(pp.min(), 1);
    assert_eq!(pp.max(), 6);
    assert_eq!(pp.results(), &results[..]);

    h.record(31, 1).unwrap();
    h.report_multi(&mut pp).unwrap();
    assert_eq!(pp.min(), 1);
    assert_eq!(pp.max(), 7);
    assert_eq!(pp.results()[4], 7);
}

#[test]
fn report_exact() {
    let h = Histo::new(0, 4, 4).unwrap();

    for i in 1..=10_u32 {
        h.record(u64::from(i), 1).unwrap();
        assert_eq!(h.bucket(i as usize), 1);
    }

    for i in 1..=10_u32 {
        assert_eq!(h.report(f64::from(i) * 10.), Ok(i as usize));
    }
}

#[test]
fn report_rejects_bad_percentiles() {
    let h = Histo::new(1, 3, 5).unwrap();
    assert_eq!(h.report(100.5), Err(Error::Overflow));
    assert_eq!(h.report(-0.5), Err(Error::Underflow));
    assert_eq!(h.report(std::f64::NAN), Err(Error::NotANumber));
    assert_eq!(h.report(0.), Err(Error::Empty));
    assert_eq!(h.report(100.), Err(Error::Empty));
}

#[test]
fn report_multi_on_empty_leaves_profile() {
    let h = Histo::new(1, 3, 5).unwrap();
    let mut pp = PercentileProfile::new(2).unwrap();
    pp.set(&[50., 99.]).unwrap();

    h.record(10, 1).unwrap();
    h.report_multi(&mut pp).unwrap();
    let before = (pp.min(), pp.max(), pp.results().to_vec());

    let empty = Histo::new(1, 3, 5).unwrap();
    assert_eq!(empty.report_multi(&mut pp), Err(Error::Empty));
    assert_eq!((pp.min(), pp.max(), pp.results().to_vec()), before);
}

#[test]
fn report_multi_without_percentiles() {
    let h = Histo::new(1, 3, 5).unwrap();
    let mut pp = PercentileProfile::new(0).unwrap();
    h.record(3, 1).unwrap();
    h.record(20, 4).unwrap();

    h.report_multi(&mut pp).unwrap();
    assert_eq!(pp.min(), 1);
    assert_eq!(pp.max(), 6);
    assert!(pp.results().is_empty());
}

#[test]
fn report_multi_matches_report() {
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::collections::BTreeSet;

    let mut rng = StdRng::seed_from_u64(0x5eed);

    for &(m, r, n) in &[(0, 4, 4), (1, 3, 5), (1, 10, 20), (2, 8, 32)] {
        let h = Histo::new(m, r, n).unwrap();
        for _ in 0..rng.random_range(1..500) {
            // skew towards small values so the low buckets fill up too
            let bits = rng.random_range(0..=n);
            let value = rng.random_range(0..=(h.max_value() >> (n - bits)));
            h.record(value, rng.random_range(1..4)).unwrap();
        }

        let tenths: BTreeSet<u32> = (0..rng.random_range(1..20))
            .map(|_| rng.random_range(0..=1000))
            .collect();
        let percentiles: Vec<f64> = tenths.iter().map(|t| f64::from(*t) / 10.).collect();

        let mut pp = PercentileProfile::new(percentiles.len()).unwrap();
        pp.set(&percentiles).unwrap();
        h.report_multi(&mut pp).unwrap();

        let first = h.buckets().next().unwrap();
        let last = h.buckets().last().unwrap();
        assert_eq!(pp.min(), first.index);
        assert_eq!(pp.max(), last.index);
        assert_eq!(h.report(0.), Ok(first.index));
        assert_eq!(h.report(100.), Ok(last.index));

        for (p, bucket) in pp.iter() {
            assert_eq!(h.report(p), Ok(bucket), "shape {:?} percentile {}", (m, r, n), p);
            assert!(h.bucket(bucket) > 0);
        }
    }
}

#[test]
fn buckets_iterate_non_empty() {
    let h = Histo::new(1, 3, 5).unwrap();
    h.record(23, 2).unwrap();
    h.record(2, 1).unwrap();

    let buckets: Vec<Bucket> = h.buckets().collect();
    assert_eq!(
        buckets,
        vec![
            Bucket {
                index: 1,
                low: 2,
                high: 3,
                count: 1,
            },
            Bucket {
                index: 6,
                low: 16,
                high: 23,
                count: 2,
            },
        ]
    );
    assert_eq!(h.bucket_range(6), 16..=23);
}

#[test]
fn debug_prints_ranges() {
    let h = Histo::new(1, 3, 5).unwrap();
    assert!(format!("{:?}", h).contains("(50 -> Err(Empty))"));

    h.record(6, 1).unwrap();
    let out = format!("{:?}", h);
    assert!(out.starts_with("Histo["));
    assert!(out.contains("(50 -> Ok(6..=7))"), "{}", out);
    h.print_percentiles();
}

#[test]
fn advisory_reads_during_record() {
    use std::sync::atomic::AtomicBool;

    let h = Histo::new(1, 10, 20).unwrap();
    let mut pp = PercentileProfile::new(3).unwrap();
    pp.set(&[50., 99., 100.]).unwrap();
    let done = AtomicBool::new(false);

    std::thread::scope(|s| {
        s.spawn(|| {
            for value in 0..100_000 {
                h.record(value, 1).unwrap();
            }
            done.store(true, Ordering::Release);
        });

        while !done.load(Ordering::Acquire) {
            match h.report(99.) {
                Ok(bucket) => assert!(h.bucket(bucket) > 0),
                Err(e) => assert_eq!(e, Error::Empty),
            }
            match h.report_multi(&mut pp) {
                Ok(()) => assert!(pp.min() <= pp.results()[0] && pp.results()[2] <= pp.max()),
                Err(e) => assert_eq!(e, Error::Empty),
            }
        }
    });

    assert_eq!(h.count(), 100_000);
    h.report_multi(&mut pp).unwrap();
    assert_eq!(pp.max(), h.bucket_offset(99_999));
}
