mod restart;
mod start;
mod status;
mod stop;

pub use restart::restart;
pub use start::start;
pub use status::status;
pub use stop::stop;
