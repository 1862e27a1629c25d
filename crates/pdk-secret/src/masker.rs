use std::sync::RwLock;

use pdk_core::secret::Masker;

/// Process-wide secret masker. Registered literals are rewritten to `***`
/// wherever they appear in step output, case-insensitively, before it
/// reaches logs or the terminal (SPEC_FULL.md §3).
///
/// A linear scan over the registered set is used instead of an
/// Aho-Corasick automaton: the number of secrets in a single pipeline run
/// is small (tens, not thousands), so the simpler implementation is both
/// correct and fast enough.
pub struct ProcessMasker {
    literals: RwLock<Vec<String>>,
}

impl ProcessMasker {
    pub fn new() -> Self {
        Self {
            literals: RwLock::new(Vec::new()),
        }
    }
}

impl Default for ProcessMasker {
    fn default() -> Self {
        Self::new()
    }
}

impl Masker for ProcessMasker {
    fn register(&self, literal: &str) {
        if literal.is_empty() {
            return;
        }
        let mut literals = self.literals.write().expect("masker lock poisoned");
        if !literals.iter().any(|l| l == literal) {
            literals.push(literal.to_string());
        }
    }

    fn mask(&self, input: &str) -> String {
        let literals = self.literals.read().expect("masker lock poisoned");
        if literals.is_empty() {
            return input.to_string();
        }

        // Longest-first so a secret that is a prefix of another registered
        // secret doesn't get partially masked first.
        let mut ordered: Vec<&String> = literals.iter().collect();
        ordered.sort_by_key(|l| std::cmp::Reverse(l.len()));

        let lower_input = input.to_lowercase();
        let mut result = String::with_capacity(input.len());
        let mut cursor = 0;

        while cursor < input.len() {
            let matched = ordered.iter().find_map(|literal| {
                let lower_literal = literal.to_lowercase();
                lower_input[cursor..]
                    .starts_with(&lower_literal)
                    .then_some(literal.len())
            });

            match matched {
                Some(len) if len > 0 => {
                    result.push_str("***");
                    cursor += len;
                }
                _ => {
                    let next = next_char_boundary(input, cursor);
                    result.push_str(&input[cursor..next]);
                    cursor = next;
                }
            }
        }

        result
    }
}

fn next_char_boundary(s: &str, from: usize) -> usize {
    let mut idx = from + 1;
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx.min(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_registered_literal_case_insensitively() {
        let masker = ProcessMasker::new();
        masker.register("s3cr3t-Token");
        assert_eq!(
            masker.mask("the value is S3CR3T-TOKEN here"),
            "the value is *** here"
        );
    }

    #[test]
    fn leaves_unregistered_text_untouched() {
        let masker = ProcessMasker::new();
        masker.register("hunter2");
        assert_eq!(masker.mask("nothing secret here"), "nothing secret here");
    }

    #[test]
    fn masks_multiple_registered_secrets_in_one_string() {
        let masker = ProcessMasker::new();
        masker.register("alpha-secret");
        masker.register("beta-secret");
        assert_eq!(
            masker.mask("alpha-secret and beta-secret both leaked"),
            "*** and *** both leaked"
        );
    }

    #[test]
    fn prefers_longest_match_when_one_secret_prefixes_another() {
        let masker = ProcessMasker::new();
        masker.register("tok");
        masker.register("token-value");
        assert_eq!(masker.mask("token-value"), "***");
    }

    #[test]
    fn empty_literal_is_never_registered() {
        let masker = ProcessMasker::new();
        masker.register("");
        assert_eq!(masker.mask("anything goes through"), "anything goes through");
    }
}
