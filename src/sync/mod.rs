//! Local-first sync: coordinators, group operations, and the optimistic
//! comment pipeline.

pub mod comment_upload;
pub mod coordinator;
pub mod courses;
pub mod error_sink;
pub mod grading_periods;
pub mod group;
pub mod ordering;
pub mod placeholder;
