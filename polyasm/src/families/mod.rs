//! Instruction encoders, one module per processor family.

pub mod avr;
pub mod z80;
