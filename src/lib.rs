pub mod tape;
pub mod error;
pub mod machine;

pub mod addition;
pub mod reflection;
pub mod left_mask;
pub mod equality;
pub mod greater_than;
pub mod less_than;
pub mod subtraction;
pub mod multiplication;
pub mod division;

pub mod registry;
pub mod aligner;
pub mod driver;
pub mod eval;
pub mod generator;
pub mod dataset;
