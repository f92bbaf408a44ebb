pub mod driver;
pub mod rider;
pub mod trip;
