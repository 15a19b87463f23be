pub mod mapping;
pub mod resolver;
pub mod types;

pub use mapping::{ColumnMapping, ColumnRule, DataType, Encoding, GlobalVariable};
pub use resolver::VariableResolver;
pub use types::VariableContext;
