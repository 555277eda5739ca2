//! Strong type definitions for the protocol.
//!
//! Bases, encoding states and correction bits are newtypes or enums so that
//! a raw integer never has to be interpreted at a protocol decision point.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// A measurement/encoding basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Basis {
    /// Computational (Z) basis, wire value 0.
    Standard,
    /// Hadamard (X) basis, wire value 1.
    Conjugate,
}

impl Basis {
    /// Decode a basis from its numeric index.
    pub fn from_index(index: u8) -> Result<Self> {
        match index {
            0 => Ok(Basis::Standard),
            1 => Ok(Basis::Conjugate),
            other => Err(CoreError::InvalidBasis(other)),
        }
    }

    /// Numeric index (0 = standard, 1 = conjugate).
    pub const fn index(self) -> u8 {
        match self {
            Basis::Standard => 0,
            Basis::Conjugate => 1,
        }
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Basis::Standard => write!(f, "Z"),
            Basis::Conjugate => write!(f, "X"),
        }
    }
}

/// Operation applied to a fresh |0> qubit to encode one of the four states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncodeOp {
    /// |0>
    Identity,
    /// X|0> = |1>
    BitFlip,
    /// H|0> = |+>
    Hadamard,
    /// H X|0> = |->
    BitFlipHadamard,
}

/// Alice's four-valued encoding choice.
///
/// `0 => |0>`, `1 => |1>`, `2 => |+>`, `3 => |->`. Values below 2 are in the
/// standard basis, the rest in the conjugate basis; the key bit is `value % 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct EncodingState(u8);

impl EncodingState {
    /// All four states in index order.
    pub const ALL: [EncodingState; 4] = [
        EncodingState(0),
        EncodingState(1),
        EncodingState(2),
        EncodingState(3),
    ];

    /// Create from a raw value in `0..=3`.
    pub fn new(value: u8) -> Result<Self> {
        if value < 4 {
            Ok(Self(value))
        } else {
            Err(CoreError::InvalidEncodingState(value))
        }
    }

    /// The raw value.
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Basis this state is prepared in.
    pub const fn basis(self) -> Basis {
        if self.0 < 2 {
            Basis::Standard
        } else {
            Basis::Conjugate
        }
    }

    /// The key bit this state carries.
    pub const fn bit(self) -> bool {
        self.0 % 2 == 1
    }

    /// Gate sequence that prepares this state from |0>.
    pub const fn operation(self) -> EncodeOp {
        match self.0 {
            0 => EncodeOp::Identity,
            1 => EncodeOp::BitFlip,
            2 => EncodeOp::Hadamard,
            _ => EncodeOp::BitFlipHadamard,
        }
    }
}

impl TryFrom<u8> for EncodingState {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<EncodingState> for u8 {
    fn from(state: EncodingState) -> Self {
        state.0
    }
}

impl fmt::Display for EncodingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.0 {
            0 => "|0>",
            1 => "|1>",
            2 => "|+>",
            _ => "|->",
        };
        f.write_str(label)
    }
}

/// Single-qubit Pauli correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pauli {
    /// Bit flip.
    X,
    /// Phase flip.
    Z,
}

/// The two classical bits produced by Alice's Bell measurement.
///
/// Bob applies a phase flip when `phase_flip` (the first bit) is set and a
/// bit flip when `bit_flip` (the second bit) is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Corrections {
    pub phase_flip: bool,
    pub bit_flip: bool,
}

impl Corrections {
    /// Build from the measurement pair `[m0, m1]`.
    pub const fn from_bits(bits: [bool; 2]) -> Self {
        Self {
            phase_flip: bits[0],
            bit_flip: bits[1],
        }
    }

    /// The pair `[m0, m1]`.
    pub const fn bits(self) -> [bool; 2] {
        [self.phase_flip, self.bit_flip]
    }

    /// Paulis Bob must apply, in application order.
    pub fn paulis(self) -> impl Iterator<Item = Pauli> {
        let z = self.phase_flip.then_some(Pauli::Z);
        let x = self.bit_flip.then_some(Pauli::X);
        z.into_iter().chain(x)
    }
}
