pub mod decision;
pub mod evaluator;
