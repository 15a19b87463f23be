pub mod evaluator;
pub mod types;

pub use evaluator::validate_response;
pub use types::{
    HeaderCheck, HeaderRule, JsonPathCheck, JsonPathRule, SuccessCriteria, ValidationVerdict,
};
