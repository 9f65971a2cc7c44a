pub mod answer_check;
pub mod generation_actor;
pub mod generation_pipeline;
pub mod goals;
pub mod material;
pub mod quiz;
pub mod usage;
