pub mod callback;
pub mod health;
pub mod landing;
pub mod logout;
pub mod schedule;
