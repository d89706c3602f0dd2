//! luckydraw-core: competition lifecycle rules for the lucky draw bot
//!
//! Everything in here is free of I/O: parsing creation commands, resolving
//! draw times, validating new competitions and selecting winners.

pub mod command;
pub mod errors;
pub mod selection;
pub mod time_expr;
pub mod types;
pub mod validation;

pub use command::*;
pub use errors::*;
pub use selection::*;
pub use time_expr::*;
pub use types::*;
pub use validation::*;
