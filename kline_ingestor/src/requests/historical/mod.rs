mod batch_request;

pub use batch_request::{
    BatchLoader, DEFAULT_MAX_CONCURRENCY, DEFAULT_SUB_RANGE_TIMEOUT, LoadError, LoadReport,
    SubRangeError, SubRangeOutcome, SubRangeWrite,
};
