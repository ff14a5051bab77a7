mod routes;

pub mod app;
pub mod audio;
pub mod config;
pub mod crop_sink;
pub mod emotion;
pub mod face_detector;
pub mod model_service;
pub mod ort_service;
pub mod pipeline;
pub mod preprocess;
pub mod provisioning;
pub mod region;
pub mod server;
pub mod telemetry;

pub use app::start_app;
