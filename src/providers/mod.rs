pub mod bcv;
pub mod util;

pub use bcv::BcvRateSource;
