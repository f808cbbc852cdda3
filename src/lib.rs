pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod validate;
