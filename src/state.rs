//! Compartmental state model: the `Model` chain and the `next_state` lookup.

use crate::error::SimError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One compartment in the epidemiological state machine.
///
/// `Culled` is a sink reachable only via a cull event, never via
/// [`Model::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compartment {
    S,
    E,
    C,
    D,
    I,
    R,
    Culled,
}

impl Compartment {
    pub(crate) fn letter(self) -> char {
        match self {
            Self::S => 'S',
            Self::E => 'E',
            Self::C => 'C',
            Self::D => 'D',
            Self::I => 'I',
            Self::R => 'R',
            Self::Culled => unreachable!("Culled has no letter in a Model chain"),
        }
    }

    pub(crate) fn from_letter(c: char) -> Option<Self> {
        match c {
            'S' => Some(Self::S),
            'E' => Some(Self::E),
            'C' => Some(Self::C),
            'D' => Some(Self::D),
            'I' => Some(Self::I),
            'R' => Some(Self::R),
            _ => None,
        }
    }

    /// Compartments whose hosts are infectious and therefore contribute
    /// dispersal pressure (§4.4: "becomes infectious" on entering C or I).
    pub fn is_infectious(self) -> bool {
        matches!(self, Self::C | Self::I)
    }

    pub fn is_susceptible(self) -> bool {
        matches!(self, Self::S)
    }
}

impl fmt::Display for Compartment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Culled => write!(f, "Culled"),
            other => write!(f, "{}", other.letter()),
        }
    }
}

/// An ordered subset of `S -> E -> C -> D -> I -> R -> S`, built once from
/// the `Model` configuration string (e.g. `"SEIR"`, `"SIR"`, `"SECDIR"`).
///
/// `next(s)` is the successor of `s` in this chain, or `None` if `s` is the
/// last compartment in the chain (a terminal state for that model, distinct
/// from `Culled`).
#[derive(Debug, Clone)]
pub struct Model {
    chain: Vec<Compartment>,
    successor: [Option<Compartment>; 7],
}

const CANONICAL_ORDER: [Compartment; 6] = [
    Compartment::S,
    Compartment::E,
    Compartment::C,
    Compartment::D,
    Compartment::I,
    Compartment::R,
];

impl Model {
    /// Parse a `Model` string such as `"SEIR"` into the ordered chain,
    /// validating that letters are a subset of SECDIR in canonical order.
    pub fn parse(spec: &str) -> Result<Self, SimError> {
        let mut chain = Vec::with_capacity(spec.len());
        for c in spec.chars() {
            let compartment = Compartment::from_letter(c).ok_or_else(|| {
                SimError::configuration(format!("unrecognised compartment letter '{c}' in Model"))
            })?;
            chain.push(compartment);
        }
        if chain.is_empty() {
            return Err(SimError::configuration("Model string must not be empty"));
        }
        let mut last_rank = None;
        for &c in &chain {
            let rank = CANONICAL_ORDER
                .iter()
                .position(|&x| x == c)
                .expect("letter already validated");
            if let Some(prev) = last_rank {
                if rank <= prev {
                    return Err(SimError::configuration(format!(
                        "Model string {spec} is not in canonical SECDIR order"
                    )));
                }
            }
            last_rank = Some(rank);
        }

        let mut successor = [None; 7];
        for window in chain.windows(2) {
            successor[Self::index(window[0])] = Some(window[1]);
        }
        // R -> S is the only chain wraparound the spec allows, and only
        // when both R and S are present (an RS loop model).
        if chain.contains(&Compartment::R) && chain.first() == Some(&Compartment::S) {
            successor[Self::index(Compartment::R)] = Some(Compartment::S);
        }
        Ok(Self { chain, successor })
    }

    fn index(c: Compartment) -> usize {
        match c {
            Compartment::S => 0,
            Compartment::E => 1,
            Compartment::C => 2,
            Compartment::D => 3,
            Compartment::I => 4,
            Compartment::R => 5,
            Compartment::Culled => 6,
        }
    }

    pub fn next(&self, current: Compartment) -> Option<Compartment> {
        self.successor[Self::index(current)]
    }

    pub fn contains(&self, c: Compartment) -> bool {
        self.chain.contains(&c)
    }

    pub fn chain(&self) -> &[Compartment] {
        &self.chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sir_chain() {
        let model = Model::parse("SIR").unwrap();
        assert_eq!(model.next(Compartment::S), Some(Compartment::I));
        assert_eq!(model.next(Compartment::I), Some(Compartment::R));
        assert_eq!(model.next(Compartment::R), Some(Compartment::S));
    }

    #[test]
    fn secdir_chain() {
        let model = Model::parse("SECDIR").unwrap();
        assert_eq!(model.next(Compartment::S), Some(Compartment::E));
        assert_eq!(model.next(Compartment::E), Some(Compartment::C));
        assert_eq!(model.next(Compartment::C), Some(Compartment::D));
        assert_eq!(model.next(Compartment::D), Some(Compartment::I));
        assert_eq!(model.next(Compartment::I), Some(Compartment::R));
        assert_eq!(model.next(Compartment::R), Some(Compartment::S));
    }

    #[test]
    fn sei_chain_has_no_wraparound_without_s_start() {
        let model = Model::parse("EI").unwrap();
        assert_eq!(model.next(Compartment::I), None);
    }

    #[test]
    fn rejects_out_of_order_letters() {
        assert!(Model::parse("SIE").is_err());
    }

    #[test]
    fn rejects_unknown_letter() {
        assert!(Model::parse("SIX").is_err());
    }
}
