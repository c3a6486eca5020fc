pub mod assets;
pub mod generate;
pub mod liveness;
pub mod proxy;
pub mod readiness;
pub mod status;
