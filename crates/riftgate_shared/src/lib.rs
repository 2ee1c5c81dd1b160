pub mod heightfield;
pub mod portal;
pub mod projection;
