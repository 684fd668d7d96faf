pub use super::customers::Entity as Customers;
pub use super::files::Entity as Files;
pub use super::projects::Entity as Projects;
