use anyhow::{bail, Result};
use kphttp_core::store::PasswordGenerator;
use rand::rngs::OsRng;
use rand::Rng;

use crate::config::GeneratorSettings;

/// Uniform random passwords over a fixed alphabet, drawn from the OS RNG.
pub struct CharsetGenerator {
    length: usize,
    alphabet: Vec<char>,
}

impl CharsetGenerator {
    pub fn new(settings: &GeneratorSettings) -> Result<Self> {
        let mut alphabet: Vec<char> = settings.charset.chars().collect();
        alphabet.sort_unstable();
        alphabet.dedup();
        if alphabet.len() < 2 {
            bail!("generator alphabet needs at least two distinct characters");
        }
        if settings.length == 0 {
            bail!("generator length must be positive");
        }
        Ok(Self {
            length: settings.length,
            alphabet,
        })
    }

    pub fn generate_now(&self) -> String {
        let mut rng = OsRng;
        (0..self.length)
            .map(|_| self.alphabet[rng.gen_range(0..self.alphabet.len())])
            .collect()
    }
}

/// Entropy estimate from the character classes present: `len * log2(pool)`.
pub fn estimate_bits(password: &str) -> u32 {
    let mut lower = false;
    let mut upper = false;
    let mut digit = false;
    let mut symbol = false;
    let mut other = false;
    for c in password.chars() {
        match c {
            'a'..='z' => lower = true,
            'A'..='Z' => upper = true,
            '0'..='9' => digit = true,
            c if c.is_ascii_punctuation() || c == ' ' => symbol = true,
            _ => other = true,
        }
    }
    let classes: [(bool, u32); 5] = [
        (lower, 26),
        (upper, 26),
        (digit, 10),
        (symbol, 33),
        (other, 100),
    ];
    let pool: u32 = classes
        .iter()
        .filter(|(present, _)| *present)
        .map(|(_, size)| size)
        .sum();
    if pool < 2 {
        return 0;
    }
    let bits = password.chars().count() as f64 * f64::from(pool).log2();
    bits.floor() as u32
}

#[async_trait::async_trait]
impl PasswordGenerator for CharsetGenerator {
    async fn generate(&self) -> Result<String> {
        Ok(self.generate_now())
    }

    async fn estimate_quality_bits(&self, password: &str) -> Result<u32> {
        Ok(estimate_bits(password))
    }
}
