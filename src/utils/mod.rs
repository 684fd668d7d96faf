pub mod multipart;
pub mod validation;
