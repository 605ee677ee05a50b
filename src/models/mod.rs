//! Domain model module declarations.

pub mod comment;
pub mod course;
pub mod grading_period;
pub mod session;
pub mod upload;
