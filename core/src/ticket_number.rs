//! Human-readable ticket numbers.
//!
//! A ticket number is [`TICKET_NUMBER_LENGTH`] characters drawn uniformly from
//! `A-Z0-9` with the operating system RNG. Uniqueness is enforced by the store,
//! which rejects a duplicate with `StoreError::Conflict`.

use rand::Rng;
use rand::rngs::OsRng;

/// Number of characters in a ticket number.
pub const TICKET_NUMBER_LENGTH: usize = 20;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a fresh ticket number.
///
/// # Examples
///
/// ```
/// use ticket_stock_core::ticket_number::{generate_ticket_number, is_valid_ticket_number};
///
/// let number = generate_ticket_number();
/// assert!(is_valid_ticket_number(&number));
/// ```
#[must_use]
pub fn generate_ticket_number() -> String {
    let mut rng = OsRng;
    (0..TICKET_NUMBER_LENGTH)
        .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
        .collect()
}

/// Whether `number` has the shape of a generated ticket number.
#[must_use]
pub fn is_valid_ticket_number(number: &str) -> bool {
    number.len() == TICKET_NUMBER_LENGTH && number.bytes().all(|b| ALPHABET.contains(&b))
}
