pub mod report;
pub mod rules;
