pub mod api;
pub mod config;
pub mod domain;
pub mod infra;
pub mod startup;

pub use api::activity::{Activity, InvokeAction, InvokeValue};
pub use api::cards::*;
pub use api::routes::*;
pub use config::*;
pub use domain::{CompetitionService, CompetitionStore, Error as LuckyDrawError, Mutated};
pub use infra::connector::*;
pub use infra::db::*;
pub use infra::file_utils::*;
pub use infra::scheduler::*;
pub use startup::*;
