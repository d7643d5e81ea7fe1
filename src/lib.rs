//! burst64: fixed-format burst frame receiver and generator.

pub mod detect;
pub mod framegen;
pub mod framesync;
pub mod golay;
pub mod msequence;
pub mod nco;
pub mod packet;
pub mod params;
pub mod pfb;
pub mod pilot;
pub mod ring;
