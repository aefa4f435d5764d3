use super::decoder::Measure;

pub const CARRY_MARKER: u8 = b'z';
pub const ZERO_SYMBOL: u8 = b'_';

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Symbol {
    /// `_` and `a`..=`y`, holding the base value
    Value(Measure),
    Carry,
}

impl Symbol {
    /// returns None for bytes outside of the accepted alphabet
    pub fn from_byte(b: u8) -> Option<Symbol> {
        match b {
            CARRY_MARKER => Some(Symbol::Carry),
            ZERO_SYMBOL => Some(Symbol::Value(0)),
            b'a'..=b'y' => Some(Symbol::Value((b - b'a' + 1) as Measure)),
            _ => None,
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Symbol::Value(_))
    }
}
