pub mod codec;
pub mod counter;
pub mod engine;
pub mod histogram;
pub mod io;
pub mod minimizer;
pub mod params;
pub mod partition;
pub mod stats;
pub mod topk;
