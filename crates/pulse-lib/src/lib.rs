pub mod acquisition;
pub mod average;
pub mod buffer;
pub mod config;
pub mod detectors;
pub mod error;
pub mod io;
pub mod measurement;
pub mod metrics;
pub mod presenter;
pub mod record;
pub mod remote;
pub mod session;
pub mod signal;
pub mod simulate;
pub mod sink;

pub use detectors::*;
pub use metrics::*;
pub use signal::*;
