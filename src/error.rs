/// Result codes for fallible histogram and profile operations.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("value or percentile exceeds its upper bound")]
    Overflow,
    #[error("percentile is below 0.0")]
    Underflow,
    #[error("histogram is empty")]
    Empty,
    #[error("percentiles must be strictly increasing")]
    Order,
    #[error("percentile is not a number")]
    NotANumber,
    #[error("{count} percentiles exceed profile capacity of {capacity}")]
    Capacity { count: usize, capacity: usize },
    #[error("invalid histogram shape m={m}, r={r}, n={n}")]
    Shape { m: u32, r: u32, n: u32 },
    #[error("failed to allocate {0} slots")]
    Alloc(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
