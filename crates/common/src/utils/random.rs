//! Random test data

use rand::distributions::{Alphanumeric, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const FIRST_NAMES: &[&str] = &[
    "Ada", "Alan", "Barbara", "Dennis", "Edsger", "Grace", "Ken", "Linus", "Margaret", "Niklaus",
];

const LAST_NAMES: &[&str] = &[
    "Hopper", "Knuth", "Liskov", "Lovelace", "Ritchie", "Thompson", "Torvalds", "Turing", "Wirth",
];

const EMAIL_DOMAINS: &[&str] = &["example.com", "example.org", "test.local"];

/// Generator for form input data. Seed it to make a test reproducible.
pub struct RandomData {
    rng: StdRng,
}

impl Default for RandomData {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomData {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Alphanumeric string of length `len`
    pub fn string(&mut self, len: usize) -> String {
        (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    /// Lowercase letters only
    pub fn letters(&mut self, len: usize) -> String {
        let letters = Uniform::new_inclusive(b'a', b'z');
        (0..len).map(|_| self.rng.sample(letters) as char).collect()
    }

    /// Integer in `[min, max]`
    pub fn number(&mut self, min: i64, max: i64) -> i64 {
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..=max)
    }

    pub fn digits(&mut self, len: usize) -> String {
        (0..len)
            .map(|_| char::from(b'0' + self.rng.gen_range(0..10u8)))
            .collect()
    }

    pub fn boolean(&mut self) -> bool {
        self.rng.gen_bool(0.5)
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = self.rng.gen_range(0..items.len());
        items.get(idx)
    }

    pub fn first_name(&mut self) -> String {
        self.pick(FIRST_NAMES).copied().unwrap_or("Ada").to_string()
    }

    pub fn last_name(&mut self) -> String {
        self.pick(LAST_NAMES).copied().unwrap_or("Lovelace").to_string()
    }

    pub fn full_name(&mut self) -> String {
        format!("{} {}", self.first_name(), self.last_name())
    }

    pub fn email(&mut self) -> String {
        let user = format!("{}.{}", self.first_name(), self.letters(6)).to_lowercase();
        let domain = self.pick(EMAIL_DOMAINS).copied().unwrap_or("example.com");
        format!("{}@{}", user, domain)
    }

    /// Phone number in `+1-555-XXX-XXXX` form
    pub fn phone(&mut self) -> String {
        format!("+1-555-{}-{}", self.digits(3), self.digits(4))
    }

    pub fn uuid(&mut self) -> uuid::Uuid {
        uuid::Builder::from_random_bytes(self.rng.gen()).into_uuid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_generators_repeat() {
        let mut a = RandomData::seeded(42);
        let mut b = RandomData::seeded(42);
        assert_eq!(a.email(), b.email());
        assert_eq!(a.string(12), b.string(12));
        assert_eq!(a.uuid(), b.uuid());
    }

    #[test]
    fn test_shapes() {
        let mut data = RandomData::seeded(7);

        let s = data.string(16);
        assert_eq!(s.len(), 16);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));

        let email = data.email();
        let (user, domain) = email.split_once('@').unwrap();
        assert!(!user.is_empty());
        assert!(EMAIL_DOMAINS.contains(&domain));

        let phone = data.phone();
        assert_eq!(phone.len(), "+1-555-123-4567".len());

        for _ in 0..50 {
            let n = data.number(3, 5);
            assert!((3..=5).contains(&n));
        }
        assert_eq!(data.number(9, 9), 9);
        assert!(data.pick::<u8>(&[]).is_none());
        assert_eq!(data.uuid().get_version_num(), 4);
    }
}
