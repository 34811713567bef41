//! Answer grading.

pub mod command;
pub mod evaluator;

pub use command::CommandEvaluator;
pub use evaluator::{Evaluation, Evaluator, MockEvaluator, parse_evaluation, render_prompt};
