pub mod camera;
pub mod dashboard;
pub mod media;
pub mod memory;
pub mod model_size;
#[cfg(feature = "opencv")]
pub mod opencv_media;
pub mod ort_runtime;
pub mod prediction;
mod routes;
pub mod runtime;
pub mod server;
pub mod session;
pub mod stream;
pub mod telemetry;
pub mod tensor;
#[cfg(test)]
mod test_support;

pub mod app;
pub mod config;

pub use app::start_app;
