pub mod courses;
pub mod quiz;
pub mod reset;
pub mod users;
