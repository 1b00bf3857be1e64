mod http_cache;
mod rate_limit;
mod requests_logging;

pub use http_cache::*;
pub use rate_limit::*;
pub use requests_logging::*;
