pub mod backtest;
pub mod forecast;
pub mod online;
pub mod pipeline;
pub mod session;

pub use backtest::*;
pub use forecast::*;
pub use online::*;
pub use pipeline::*;
pub use session::*;
