use thiserror::Error;

use super::{symbol::Symbol, validator::is_valid_sequence};

/// Decoded measurement. Carries grow without a bound, so accumulators are wide and checked.
pub type Measure = u128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("accumulated measure does not fit into 128 bits at index {0}")]
    Overflow(usize),
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Round {
    /// next value-producing symbol declares the round length
    AwaitingStart,
    Open {
        length: Measure,
        position: Measure,
        sum: Measure,
    },
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct DecodeState {
    round: Round,
    // carry-adjusted value of the latest value-producing symbol, re-read by every carry marker
    last_value: Measure,
    pending_carry: Measure,
    carry_active: bool,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct Transition {
    pub state: DecodeState,
    /// sum of a round closed by this step
    pub emitted: Option<Measure>,
}

impl Default for DecodeState {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeState {
    pub fn new() -> DecodeState {
        DecodeState {
            round: Round::AwaitingStart,
            last_value: 0,
            pending_carry: 0,
            carry_active: false,
        }
    }

    pub fn round(&self) -> Round {
        self.round
    }

    pub fn pending_carry(&self) -> Option<Measure> {
        self.carry_active.then_some(self.pending_carry)
    }

    pub fn is_round_open(&self) -> bool {
        matches!(self.round, Round::Open { .. })
    }

    /// Returns None if an accumulator overflows.
    pub fn step(self, symbol: Symbol) -> Option<Transition> {
        match symbol {
            Symbol::Carry => self.carry(),
            Symbol::Value(base) => self.value(base),
        }
    }

    // carry never touches the round
    fn carry(self) -> Option<Transition> {
        let pending_carry = self.pending_carry.checked_add(self.last_value)?;
        Some(Transition {
            state: DecodeState {
                pending_carry,
                carry_active: true,
                ..self
            },
            emitted: None,
        })
    }

    fn value(self, base: Measure) -> Option<Transition> {
        let value = if self.carry_active {
            base.checked_add(self.pending_carry)?
        } else {
            base
        };

        let (length, position, sum) = match self.round {
            Round::AwaitingStart => (value, 0, 0),
            Round::Open {
                length,
                position,
                sum,
            } => (length, position + 1, sum.checked_add(value)?),
        };

        // checked after the length declaration too, so a zero length round closes right away
        let (round, emitted) = if position == length {
            (Round::AwaitingStart, Some(sum))
        } else {
            (
                Round::Open {
                    length,
                    position,
                    sum,
                },
                None,
            )
        };

        Some(Transition {
            state: DecodeState {
                round,
                last_value: value,
                pending_carry: 0,
                carry_active: false,
            },
            emitted,
        })
    }
}

pub struct Decoder<'a> {
    src: &'a str,
    pos: usize,
    state: DecodeState,
}

impl<'a> Decoder<'a> {
    pub fn new(src: &'a str) -> Decoder<'a> {
        Decoder {
            src,
            pos: 0,
            state: DecodeState::new(),
        }
    }

    /// Invalid input decodes to an empty sequence.
    pub fn decode(mut self) -> Result<Vec<Measure>, DecodeError> {
        let mut collected = Vec::new();

        // validated input is ASCII, one byte per symbol
        if !is_valid_sequence(self.src) {
            return Ok(collected);
        }

        while let Some((index, symbol)) = self.next_symbol() {
            let transition = self
                .state
                .step(symbol)
                .ok_or(DecodeError::Overflow(index))?;
            self.state = transition.state;

            if let Some(sum) = transition.emitted {
                collected.push(sum);
            }

            // stream ended mid-round: the partial sum is dropped for a 0 placeholder
            if self.is_at_end() && symbol.is_value() && self.state.is_round_open() {
                collected.push(0);
            }
        }

        Ok(collected)
    }

    fn next_symbol(&mut self) -> Option<(usize, Symbol)> {
        let index = self.pos;
        let symbol = Symbol::from_byte(*self.src.as_bytes().get(index)?)?;
        self.pos += 1;
        Some((index, symbol))
    }

    fn is_at_end(&self) -> bool {
        self.pos == self.src.len()
    }
}

pub fn decode(src: &str) -> Result<Vec<Measure>, DecodeError> {
    Decoder::new(src).decode()
}
