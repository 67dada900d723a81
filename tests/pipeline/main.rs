mod live_backend;
mod mock_pipeline;

#[path = "../support/mod.rs"]
mod support;
