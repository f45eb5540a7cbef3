pub mod report;
pub mod request;

pub use report::*;
pub use request::*;
