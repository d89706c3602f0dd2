mod competition_routes;

pub use competition_routes::*;
