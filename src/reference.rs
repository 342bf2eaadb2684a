use chrono::NaiveDate;
use rand::Rng;

/// Alphabet for the random tail. Skips 0/O, 1/I and L so the code survives
/// being read back over a phone call.
const ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

const RANDOM_LEN: usize = 6;

/// Customer-facing booking code: `BK` + check-in date as `yymmdd` + six
/// random characters, 14 characters total. Uniqueness is enforced by the
/// database index on `booking_reference`; a collision on insert is handled
/// by regenerating, not by failing the booking.
pub fn generate_reference(check_in: NaiveDate) -> String {
    let mut rng = rand::thread_rng();
    let mut code = format!("BK{}", check_in.format("%y%m%d"));
    for _ in 0..RANDOM_LEN {
        let idx = rng.gen_range(0..ALPHABET.len());
        code.push(ALPHABET[idx] as char);
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    #[test]
    fn reference_has_fixed_shape() {
        let r = generate_reference(date());
        assert_eq!(r.len(), 14);
        assert!(r.starts_with("BK240701"));
    }

    #[test]
    fn random_tail_avoids_ambiguous_characters() {
        for _ in 0..200 {
            let r = generate_reference(date());
            let tail = &r[8..];
            assert!(tail.chars().all(|c| ALPHABET.contains(&(c as u8))), "bad tail in {}", r);
            assert!(!tail.contains('0') && !tail.contains('O'));
            assert!(!tail.contains('1') && !tail.contains('I') && !tail.contains('L'));
        }
    }

    #[test]
    fn references_vary() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            seen.insert(generate_reference(date()));
        }
        assert!(seen.len() > 1);
    }
}
