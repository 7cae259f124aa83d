//! Particle species identification
//!
//! A species is identified by its PDG encoding plus baryon and atomic numbers.
//! The three positron emitters relevant to range verification (C-11, N-13,
//! O-15) get a dedicated enum so downstream code can partition on them
//! exhaustively.

use serde::{Deserialize, Serialize};

/// PDG encoding of the positron
pub const PDG_POSITRON: i32 = -11;

/// PDG encoding of the neutron
pub const PDG_NEUTRON: i32 = 2112;

/// A particle species as seen by the transport engine.
///
/// `a` is the baryon (mass) number, `z` the atomic number; both are zero for
/// leptons and gammas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Species {
    /// PDG encoding
    pub pdg: i32,
    /// Baryon (mass) number
    pub a: i32,
    /// Atomic number
    pub z: i32,
}

impl Species {
    /// The positron (e+)
    pub const POSITRON: Self = Self { pdg: PDG_POSITRON, a: 0, z: 0 };

    /// The neutron
    pub const NEUTRON: Self = Self { pdg: PDG_NEUTRON, a: 0, z: 0 };

    /// The proton
    pub const PROTON: Self = Self { pdg: 2212, a: 1, z: 1 };

    /// The gamma
    pub const GAMMA: Self = Self { pdg: 22, a: 0, z: 0 };

    /// An ion with the given mass and atomic numbers, using the standard
    /// 10LZZZAAAI nuclear PDG encoding.
    #[must_use]
    pub const fn ion(a: i32, z: i32) -> Self {
        Self { pdg: 1_000_000_000 + z * 10_000 + a * 10, a, z }
    }

    /// Whether this species is a positron
    #[must_use]
    pub const fn is_positron(&self) -> bool {
        self.pdg == PDG_POSITRON
    }

    /// Whether this species is a neutron
    #[must_use]
    pub const fn is_neutron(&self) -> bool {
        self.pdg == PDG_NEUTRON
    }

    /// Whether this species is a heavy nuclear product (any atomic number > 0)
    #[must_use]
    pub const fn is_nucleus(&self) -> bool {
        self.z > 0
    }
}

/// The positron-emitting isotopes observable by this system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Isotope {
    /// Carbon-11 (Z=6, A=11)
    C11,
    /// Nitrogen-13 (Z=7, A=13)
    N13,
    /// Oxygen-15 (Z=8, A=15)
    O15,
}

impl Isotope {
    /// All known positron emitters, in atomic-number order.
    pub const ALL: [Self; 3] = [Self::C11, Self::N13, Self::O15];

    /// Identify a species as a known positron emitter, if it is one.
    #[must_use]
    pub const fn from_species(species: Species) -> Option<Self> {
        match (species.a, species.z) {
            (11, 6) => Some(Self::C11),
            (13, 7) => Some(Self::N13),
            (15, 8) => Some(Self::O15),
            _ => None,
        }
    }

    /// Identify an isotope by atomic number alone (the decay table records Z).
    #[must_use]
    pub const fn from_atomic_number(z: i32) -> Option<Self> {
        match z {
            6 => Some(Self::C11),
            7 => Some(Self::N13),
            8 => Some(Self::O15),
            _ => None,
        }
    }

    /// Atomic number
    #[must_use]
    pub const fn atomic_number(self) -> i32 {
        match self {
            Self::C11 => 6,
            Self::N13 => 7,
            Self::O15 => 8,
        }
    }

    /// Mass number
    #[must_use]
    pub const fn mass_number(self) -> i32 {
        match self {
            Self::C11 => 11,
            Self::N13 => 13,
            Self::O15 => 15,
        }
    }

    /// Human-readable label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::C11 => "C-11",
            Self::N13 => "N-13",
            Self::O15 => "O-15",
        }
    }
}
