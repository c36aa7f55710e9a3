pub mod interval;
pub mod kline;
pub mod request_params;
pub mod time_range;
