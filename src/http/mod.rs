pub mod builder;
pub mod client;
pub mod response;
pub mod types;

pub use builder::{BuiltBody, BuiltRequest, RequestBuilder};
pub use client::{ClientSettings, HttpExecutor, StepOutcome};
pub use response::ResponseData;
pub use types::Method;
