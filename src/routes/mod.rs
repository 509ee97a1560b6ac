pub mod manager_route;

pub use manager_route::{manager_routes, ManagerContext};
