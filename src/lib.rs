pub mod cli;
pub mod config;
pub mod error;
pub mod generation;
pub mod imaging;
pub mod inference;
pub mod server;
pub mod telemetry;

#[macro_export]
macro_rules! exit_err {
    ($code:expr, $fmt:expr $(, $arg:expr)*) => {
        {
            tracing::error!($fmt $(, $arg)*);
            std::process::exit($code);
        }
    };
}
