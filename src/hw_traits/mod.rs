pub mod gpio;
pub mod pmap;
pub mod usci;
