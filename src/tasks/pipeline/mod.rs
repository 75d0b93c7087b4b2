pub(crate) mod budget;
pub(crate) mod orchestrator;
pub(crate) mod state_machine;
pub(crate) mod wiring;

pub(crate) use orchestrator::PipelineOrchestrator;
pub(crate) use wiring::Collaborators;
