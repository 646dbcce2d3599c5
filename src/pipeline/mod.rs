//! The discovery-to-persistence pipeline, stage by stage.
//!
//! Stages run sequentially within a run (discovery -> filter -> extract ->
//! validate -> yield -> curate -> rank -> persist); fan-out happens inside
//! individual stages. The orchestrator owns the collaborators and is the
//! only public entry point.

pub mod city_resolver;
pub mod curator;
pub mod dedup;
pub mod discovery;
pub mod domain_filter;
pub mod extractor;
pub mod gateway;
pub mod orchestrator;
pub mod ranker;
pub mod validator;
pub mod yield_control;

pub use orchestrator::Orchestrator;
