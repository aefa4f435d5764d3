use super::symbol::Symbol;

/// Non-empty and made only of `a`..=`z` and `_`.
pub fn is_valid_sequence(src: &str) -> bool {
    !src.is_empty() && src.bytes().all(|b| Symbol::from_byte(b).is_some())
}
