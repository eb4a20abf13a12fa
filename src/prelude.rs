//! Prelude

pub use crate::i2c::AddressType as _cc430f513x_hal_AddressType;
pub use crate::i2c::I2cUsci as _cc430f513x_hal_I2cUsci;
pub use crate::lpm::Idle as _cc430f513x_hal_Idle;
