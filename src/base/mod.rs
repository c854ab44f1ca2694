mod channel;
mod error;
mod message;
mod traits;

pub use self::channel::*;
pub use self::error::{
    AssemblyError, BuilderError, ConfigurationError, ControlError, DecodeError, Error, Result,
};
pub use self::message::Datagram;
pub use self::traits::{Clock, DatagramSink, DatagramSource, SystemClock};
