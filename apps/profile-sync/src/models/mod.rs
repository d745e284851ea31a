pub mod attachment;
pub mod profile;
pub mod records;
