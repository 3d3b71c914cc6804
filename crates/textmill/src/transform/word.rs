//! Inner-letter shuffling for a single word.
//!
//! The first and last character of a word stay in place while everything in
//! between is permuted. Randomness comes from a [`Shuffler`], so callers can
//! swap in a deterministic one.

use std::borrow::Cow;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Source of permutations for the interior of a word.
pub trait Shuffler: Send + Sync {
    fn shuffle(&self, chars: &mut [char]);
}

/// Uniformly random permutation using the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomShuffler;

impl Shuffler for RandomShuffler {
    fn shuffle(&self, chars: &mut [char]) {
        chars.shuffle(&mut rand::thread_rng());
    }
}

/// Reproducible permutations from a fixed seed.
pub struct SeededShuffler {
    rng: Mutex<StdRng>,
}

impl SeededShuffler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Shuffler for SeededShuffler {
    fn shuffle(&self, chars: &mut [char]) {
        // A poisoned lock still holds a usable RNG.
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        chars.shuffle(&mut *rng);
    }
}

/// Reverses instead of shuffling. Useful in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReverseShuffler;

impl Shuffler for ReverseShuffler {
    fn shuffle(&self, chars: &mut [char]) {
        chars.reverse();
    }
}

/// Shuffles the interior characters of `word`, keeping the first and last
/// character fixed.
///
/// Returns the word unchanged when it has at most three characters, is all
/// whitespace, or its interior consists of a single repeated character.
/// Otherwise the result is guaranteed to differ from the input: if the
/// shuffle reproduces the original interior, the reversed interior is used,
/// and for palindromic interiors a rotation by one.
pub fn shuffle_inner_letters<'a>(word: &'a str, shuffler: &dyn Shuffler) -> Cow<'a, str> {
    let chars: Vec<char> = word.chars().collect();
    if chars.len() <= 3 || chars.iter().all(|c| c.is_whitespace()) {
        return Cow::Borrowed(word);
    }

    let last = chars.len() - 1;
    let interior = &chars[1..last];
    if interior.iter().all(|c| *c == interior[0]) {
        return Cow::Borrowed(word);
    }

    let mut shuffled = interior.to_vec();
    shuffler.shuffle(&mut shuffled);

    if shuffled == interior {
        shuffled.reverse();
        if shuffled == interior {
            shuffled.rotate_left(1);
        }
    }

    let mut out = String::with_capacity(word.len());
    out.push(chars[0]);
    out.extend(shuffled);
    out.push(chars[last]);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Leaves the slice untouched, forcing the fallback paths.
    struct IdentityShuffler;

    impl Shuffler for IdentityShuffler {
        fn shuffle(&self, _chars: &mut [char]) {}
    }

    #[test]
    fn test_short_words_unchanged() {
        for word in ["", "a", "ab", "abc", "été"] {
            assert_eq!(shuffle_inner_letters(word, &RandomShuffler), word);
        }
    }

    #[test]
    fn test_whitespace_unchanged() {
        for word in ["       ", "\t", " \n ", "\t\t\t\t"] {
            assert_eq!(shuffle_inner_letters(word, &RandomShuffler), word);
        }
    }

    #[test]
    fn test_identical_interior_unchanged() {
        assert_eq!(shuffle_inner_letters("baaad", &RandomShuffler), "baaad");
        assert_eq!(shuffle_inner_letters("xoox", &RandomShuffler), "xoox");
    }

    #[test]
    fn test_preserves_edges_with_reverse() {
        let shuffled = shuffle_inner_letters("python", &ReverseShuffler);
        assert_eq!(shuffled, "pohtyn");
        assert!(shuffled.starts_with('p'));
        assert!(shuffled.ends_with('n'));
        assert_eq!(shuffled.chars().count(), 6);
    }

    #[test]
    fn test_unchanged_shuffle_falls_back_to_reverse() {
        assert_eq!(shuffle_inner_letters("python", &IdentityShuffler), "pohtyn");
    }

    #[test]
    fn test_palindromic_interior_still_changes() {
        let shuffled = shuffle_inner_letters("xabax", &IdentityShuffler);
        assert_ne!(shuffled, "xabax");
        assert_eq!(shuffled, "xbaax");
    }

    #[test]
    fn test_random_output_always_differs() {
        let words = ["python", "Django", "letters", "abcd", "mississippi", "naïveté"];
        for word in words {
            for _ in 0..50 {
                let shuffled = shuffle_inner_letters(word, &RandomShuffler);
                assert_ne!(shuffled, word);
                assert_eq!(shuffled.chars().count(), word.chars().count());
                assert_eq!(shuffled.chars().next(), word.chars().next());
                assert_eq!(shuffled.chars().last(), word.chars().last());
            }
        }
    }

    #[test]
    fn test_output_is_permutation_of_input() {
        let shuffler = SeededShuffler::new(7);
        let word = "permutation";
        let shuffled = shuffle_inner_letters(word, &shuffler);

        let mut expected: Vec<char> = word.chars().collect();
        let mut actual: Vec<char> = shuffled.chars().collect();
        expected.sort_unstable();
        actual.sort_unstable();
        assert_eq!(expected, actual);
    }

    #[test]
    fn test_seeded_shuffler_is_reproducible() {
        let a = SeededShuffler::new(42);
        let b = SeededShuffler::new(42);
        for word in ["reproducible", "shuffling", "determinism"] {
            assert_eq!(
                shuffle_inner_letters(word, &a),
                shuffle_inner_letters(word, &b)
            );
        }
    }

    #[test]
    fn test_unchanged_words_are_borrowed() {
        assert!(matches!(
            shuffle_inner_letters("abc", &RandomShuffler),
            Cow::Borrowed(_)
        ));
    }
}
