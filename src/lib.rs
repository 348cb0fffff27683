//! A fixed-memory log-linear histogram.
//!
//! Values are counted in buckets that are linear below a resolution
//! boundary and grow geometrically above it. Recording is a constant-time
//! bit scan plus a counter bump; percentile queries scan the bucket array
//! and answer with a bucket index, which `Histo::bucket_low` and
//! `Histo::bucket_high` translate back into a value range.
//!
//! A `Histo` has one writer. Reports may run alongside it, but they are
//! advisory: counts observed mid-scan are not a point-in-time snapshot.
//!
//! ```
//! use loghisto::{Histo, PercentileProfile};
//!
//! let histo = Histo::new(1, 10, 20).unwrap();
//! histo.record(250, 1).unwrap();
//! histo.record(900, 3).unwrap();
//!
//! let bucket = histo.report(50.).unwrap();
//! assert!(histo.bucket_low(bucket) <= 900 && 900 <= histo.bucket_high(bucket));
//!
//! let mut profile = PercentileProfile::new(3).unwrap();
//! profile.set(&[25., 50., 99.9]).unwrap();
//! histo.report_multi(&mut profile).unwrap();
//! assert_eq!(profile.results()[1], bucket);
//! ```
use log::{error, info, trace};

pub use config::Config;
pub use error::{Error, Result};
pub use histo::{Bucket, Histo};
pub use layout::Layout;
pub use profile::PercentileProfile;

/// Builds a `Vec` of `$n` non-`Copy` values, reserving the whole
/// allocation up front and failing with `Error::Alloc` instead of
/// aborting when it cannot be had.
macro_rules! try_rep_no_copy {
    ($e:expr; $n:expr) => {
        {
            let n = $n;
            let mut v = Vec::new();
            match v.try_reserve_exact(n) {
                Ok(()) => {
                    for _ in 0..n {
                        v.push($e);
                    }
                    Ok(v)
                }
                Err(_) => Err(Error::Alloc(n)),
            }
        }
    };
}

mod config;
mod error;
mod histo;
mod layout;
mod profile;
