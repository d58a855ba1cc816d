use rand::Rng;

use crate::shortcode::ShortCode;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Length of codes handed out when a client does not pick its own.
pub const DEFAULT_CODE_LENGTH: usize = 6;

/// Produces candidate short codes for links created without one.
///
/// Candidates are not checked for uniqueness; callers retry on conflict.
pub trait CodeGenerator: Send + Sync + 'static {
    fn generate(&self) -> ShortCode;
}

/// Draws codes uniformly from ASCII letters and digits.
#[derive(Debug, Clone, Copy)]
pub struct RandomCodeGenerator {
    length: usize,
}

impl RandomCodeGenerator {
    /// `length` is clamped into the range a [`ShortCode`] accepts.
    pub fn new(length: usize) -> Self {
        Self {
            length: length.clamp(ShortCode::MIN_LENGTH, ShortCode::MAX_LENGTH),
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_LENGTH)
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> ShortCode {
        let mut rng = rand::rng();
        let code: String = (0..self.length)
            .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
            .collect();
        ShortCode::new_unchecked(code)
    }
}
