pub mod activity;
pub mod cards;
pub mod localization;
pub mod routes;
