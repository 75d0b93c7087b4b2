pub(crate) mod maintenance;
pub(crate) mod pipeline;
pub(crate) mod scheduler;
