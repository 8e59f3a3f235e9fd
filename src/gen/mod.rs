pub mod oscillator;

pub use self::oscillator::*;
