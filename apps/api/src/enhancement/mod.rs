// Resume enhancement pipeline.
// Flow: extract text → validation gate → build prompt → completion call → present result.
// All completion calls go through llm_client, never a raw HTTP client here.

pub mod handlers;
pub mod pipeline;
pub mod presenter;
pub mod prompts;
pub mod validation;
