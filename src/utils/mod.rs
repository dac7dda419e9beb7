pub mod perf;

pub use perf::Stopwatch;
