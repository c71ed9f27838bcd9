//! Model lifecycle: schema derivation, fitting, evaluation, storage, scoring and
//! explanation of binary classifiers over tabular data.

pub mod error;
pub mod explain;
pub mod logreg;
pub mod metrics;
pub mod pipeline;
pub mod predict;
pub mod schema;
pub mod store;
pub mod train;
pub mod validate;

pub use error::{ErrorCategory, MlError};
pub use store::{ModelStore, RestoreOutcome, TrainedModel};
pub use train::{TrainOutcome, TrainRequest, Trainer};
