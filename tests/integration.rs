//! Entry point for the `tests/integration/` suite. Cargo only auto-discovers
//! files directly under `tests/`, so the scenario files live under a
//! subdirectory and are wired in here explicitly.

#[path = "integration/support.rs"]
pub mod support;

#[path = "integration/downloader_resume.rs"]
mod downloader_resume;

#[path = "integration/pipeline_scenarios.rs"]
mod pipeline_scenarios;

#[path = "integration/sampler_scenarios.rs"]
mod sampler_scenarios;
