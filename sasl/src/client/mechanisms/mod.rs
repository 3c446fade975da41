//! Provides a few SASL mechanisms.

mod external;
mod plain;

#[cfg(feature = "scram")]
mod scram;

pub use self::external::External;
pub use self::plain::Plain;

#[cfg(feature = "scram")]
pub use self::scram::Scram;
