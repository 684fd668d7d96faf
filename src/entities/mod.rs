pub mod prelude;

pub mod customers;
pub mod files;
pub mod projects;
