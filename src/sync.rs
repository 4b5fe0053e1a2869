pub mod pipeline;
pub mod synchronizer;
