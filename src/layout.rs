//! Log-linear bucket layout.
//!
//! Values below `2^r` land in buckets of width `2^m`. Every power-of-two
//! span above that is split into `G = 2^(r-m-1)` buckets whose width
//! doubles from one span to the next, so the relative error for large
//! values stays near `2^m / 2^r`.
use std::convert::TryFrom;

use super::*;

#[inline(always)]
fn low_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1 << bits) - 1
    }
}

/// The shape of a histogram and the constants derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    m: u32,
    r: u32,
    n: u32,
    min_resolution: u64,
    resolution_range: u64,
    max_value: u64,
    grouping: u64,
    bucket_count: usize,
}

impl Layout {
    /// Validates `m < r <= n <= 64` and derives the bucket layout.
    pub fn new(m: u32, r: u32, n: u32) -> Result<Layout> {
        if r <= m || r > n || n > 64 {
            error!("invalid input value among m={}, r={}, n={}", m, r, n);
            return Err(Error::Shape { m, r, n });
        }

        let grouping = 1_u64 << (r - m - 1);
        let groups = u64::from(n - r + 2);
        let bucket_count = grouping
            .checked_mul(groups)
            .and_then(|count| usize::try_from(count).ok())
            .ok_or(Error::Alloc(usize::MAX))?;

        Ok(Layout {
            m,
            r,
            n,
            min_resolution: 1 << m,
            resolution_range: low_mask(r),
            max_value: low_mask(n),
            grouping,
            bucket_count,
        })
    }

    pub fn m(&self) -> u32 {
        self.m
    }

    pub fn r(&self) -> u32 {
        self.r
    }

    pub fn n(&self) -> u32 {
        self.n
    }

    /// `M = 2^m`, the width of the narrowest bucket.
    pub fn min_resolution(&self) -> u64 {
        self.min_resolution
    }

    /// `R = 2^r - 1`, the top of the linear region.
    pub fn resolution_range(&self) -> u64 {
        self.resolution_range
    }

    /// `N = 2^n - 1`, the largest recordable value.
    pub fn max_value(&self) -> u64 {
        self.max_value
    }

    /// `G = 2^(r-m-1)`, buckets per group.
    pub fn grouping(&self) -> u64 {
        self.grouping
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Maps a value to its bucket. The value must not exceed `max_value`.
    #[inline(always)]
    pub fn bucket_offset(&self, value: u64) -> usize {
        // leading_zeros(0) is 64, so scan as if the value were 1
        let h = 63 - value.max(1).leading_zeros();

        if h < self.r {
            (value >> self.m) as usize
        } else {
            let d = h - self.r + 1;
            let group = u64::from(d + 1) * self.grouping;
            (group + ((value - (1 << h)) >> (self.m + d))) as usize
        }
    }

    /// Splits a bucket index into its group and the offset inside it.
    #[inline(always)]
    fn split_group(&self, bucket: usize) -> (u32, u64) {
        assert!(
            bucket < self.bucket_count,
            "bucket {} out of range for {} buckets",
            bucket,
            self.bucket_count
        );
        let bucket = bucket as u64;
        let g = bucket >> (self.r - self.m - 1);
        (g as u32, bucket - g * self.grouping)
    }

    fn width(&self, g: u32) -> u64 {
        if g == 0 {
            self.min_resolution
        } else {
            1 << (self.m + g - 1)
        }
    }

    /// The smallest value that lands in `bucket`.
    pub fn bucket_low(&self, bucket: usize) -> u64 {
        let (g, b) = self.split_group(bucket);

        if g == 0 {
            self.min_resolution * b
        } else {
            (1 << (self.r + g - 2)) + self.width(g) * b
        }
    }

    /// The largest value that lands in `bucket`.
    pub fn bucket_high(&self, bucket: usize) -> u64 {
        let (g, _) = self.split_group(bucket);

        // low + (width - 1) stays in range when n == 64
        self.bucket_low(bucket) + (self.width(g) - 1)
    }
}

#[test]
fn derived_constants() {
    let l = Layout::new(1, 10, 20).unwrap();
    assert_eq!(l.min_resolution(), 1 << 1);
    assert_eq!(l.resolution_range(), (1 << 10) - 1);
    assert_eq!(l.max_value(), (1 << 20) - 1);
    assert_eq!(l.grouping(), 1 << (10 - 1 - 1));
    assert_eq!(l.bucket_count(), (20 - 10 + 2) * 256);

    let l = Layout::new(1, 3, 5).unwrap();
    assert_eq!(l.bucket_count(), 8);

    let l = Layout::new(10, 20, 64).unwrap();
    assert_eq!(l.max_value(), u64::MAX);
    assert_eq!(l.bucket_count(), (64 - 20 + 2) * 512);
}

#[test]
fn rejects_bad_shapes() {
    assert_eq!(Layout::new(3, 3, 10), Err(Error::Shape { m: 3, r: 3, n: 10 }));
    assert_eq!(Layout::new(4, 3, 10), Err(Error::Shape { m: 4, r: 3, n: 10 }));
    assert_eq!(Layout::new(1, 11, 10), Err(Error::Shape { m: 1, r: 11, n: 10 }));
    assert_eq!(Layout::new(1, 10, 65), Err(Error::Shape { m: 1, r: 10, n: 65 }));
    assert!(Layout::new(0, 1, 1).is_ok());
    assert!(Layout::new(0, 4, 4).is_ok());
}

#[test]
fn offsets() {
    let l = Layout::new(0, 10, 20).unwrap();
    assert_eq!(l.bucket_offset(0), 0);
    assert_eq!(l.bucket_offset(1), 1);
    assert_eq!(l.bucket_offset(1023), 1023);
    assert_eq!(l.bucket_offset(1024), 1024);
    assert_eq!(l.bucket_offset(1025), 1024);
    assert_eq!(l.bucket_offset(1026), 1025);
    assert_eq!(l.bucket_offset(2048), 1536);
    assert_eq!(l.bucket_offset(2051), 1536);
    assert_eq!(l.bucket_offset(2052), 1537);
    assert_eq!(l.bucket_offset((1 << 20) - 1), l.bucket_count() - 1);

    let l = Layout::new(1, 3, 5).unwrap();
    assert_eq!(l.bucket_offset(2), 1);
    assert_eq!(l.bucket_offset(6), 3);
    assert_eq!(l.bucket_offset(23), 6);
    assert_eq!(l.bucket_offset(31), 7);
}

#[test]
fn buckets_are_contiguous() {
    for &(m, r, n) in &[(0, 1, 1), (0, 4, 4), (1, 3, 5), (1, 10, 20), (2, 5, 16), (3, 8, 40)] {
        let l = Layout::new(m, r, n).unwrap();
        assert_eq!(l.bucket_low(0), 0);
        for i in 0..l.bucket_count() {
            assert!(l.bucket_low(i) <= l.bucket_high(i));
            if i + 1 < l.bucket_count() {
                assert_eq!(l.bucket_high(i) + 1, l.bucket_low(i + 1), "shape {:?} bucket {}", (m, r, n), i);
            }
        }
        assert_eq!(l.bucket_high(l.bucket_count() - 1), l.max_value());
    }
}

#[test]
fn full_width_top_bucket() {
    let l = Layout::new(8, 12, 64).unwrap();
    let last = l.bucket_count() - 1;
    assert_eq!(l.bucket_offset(u64::MAX), last);
    assert_eq!(l.bucket_high(last), u64::MAX);
    assert_eq!(l.bucket_low(last), (1_u64 << 63) + (1_u64 << (8 + 53 - 1)) * (l.grouping() - 1));
    assert_eq!(l.bucket_offset(1 << 63), l.bucket_offset(u64::MAX) - (l.grouping() as usize - 1));
}

#[test]
fn every_value_lands_in_its_bucket() {
    for &(m, r, n) in &[(0, 4, 4), (1, 3, 5), (0, 10, 16), (2, 6, 18)] {
        let l = Layout::new(m, r, n).unwrap();
        for v in 0..=l.max_value() {
            let b = l.bucket_offset(v);
            assert!(b < l.bucket_count());
            assert!(l.bucket_low(b) <= v && v <= l.bucket_high(b), "value {} bucket {}", v, b);
        }
    }
}

#[test]
#[should_panic]
fn bucket_out_of_range() {
    let l = Layout::new(1, 3, 5).unwrap();
    l.bucket_low(8);
}
