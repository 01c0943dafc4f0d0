//! Bell-state labels inferred from a Bell measurement outcome.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, WireError};

/// One of the four maximally entangled two-qubit states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BellState {
    /// Φ+ = (|00⟩ + |11⟩)/√2
    PhiPlus,
    /// Φ− = (|00⟩ − |11⟩)/√2
    PhiMinus,
    /// Ψ+ = (|01⟩ + |10⟩)/√2
    PsiPlus,
    /// Ψ− = (|01⟩ − |10⟩)/√2
    PsiMinus,
}

impl BellState {
    /// All labels, indexed by measurement outcome.
    pub const ALL: [Self; 4] = [Self::PhiPlus, Self::PhiMinus, Self::PsiPlus, Self::PsiMinus];

    /// Map a 2-bit Bell measurement outcome to the state shared by the
    /// endpoints after the swap.
    pub fn from_outcome(outcome: i64) -> Result<Self> {
        usize::try_from(outcome)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or(WireError::InvalidBellOutcome(outcome))
    }

    /// Measurement outcome that identifies this state.
    pub fn outcome(self) -> u8 {
        match self {
            Self::PhiPlus => 0,
            Self::PhiMinus => 1,
            Self::PsiPlus => 2,
            Self::PsiMinus => 3,
        }
    }

    /// Conventional symbol, e.g. `Ψ+`.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::PhiPlus => "Φ+",
            Self::PhiMinus => "Φ−",
            Self::PsiPlus => "Ψ+",
            Self::PsiMinus => "Ψ−",
        }
    }
}

impl fmt::Display for BellState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
