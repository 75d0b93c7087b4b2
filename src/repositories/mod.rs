pub(crate) mod exams;
pub(crate) mod health;
mod postgres;
pub(crate) mod review_tasks;
pub(crate) mod reviewers;
pub(crate) mod store;
