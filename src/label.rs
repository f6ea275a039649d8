//! Subject label inference from naming conventions.
//!
//! A subject's class is encoded as a token inside its name, e.g.
//! `sub-M2001_no-lesion_T1w`. Tokens must be mutually exclusive substrings.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Ordered mapping from integer class code to name token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(i64, String)>", into = "Vec<(i64, String)>")]
pub struct LabelVocabulary {
    entries: Vec<(i64, String)>,
}

impl LabelVocabulary {
    /// Build and validate a vocabulary.
    ///
    /// Rejects an empty vocabulary, empty tokens, duplicate codes and tokens
    /// that contain one another.
    pub fn new<S: Into<String>>(entries: impl IntoIterator<Item = (i64, S)>) -> Result<Self> {
        let entries: Vec<(i64, String)> = entries
            .into_iter()
            .map(|(code, token)| (code, token.into()))
            .collect();

        if entries.is_empty() {
            return Err(Error::InvalidConfig(
                "label vocabulary must not be empty".to_string(),
            ));
        }

        for (i, (code, token)) in entries.iter().enumerate() {
            if token.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "label token for code {code} is empty"
                )));
            }
            for (other_code, other) in &entries[i + 1..] {
                if code == other_code {
                    return Err(Error::InvalidConfig(format!(
                        "label code {code} appears more than once"
                    )));
                }
                if token.contains(other.as_str()) || other.contains(token.as_str()) {
                    return Err(Error::InvalidConfig(format!(
                        "label tokens '{token}' and '{other}' overlap"
                    )));
                }
            }
        }

        Ok(Self { entries })
    }

    /// Binary lesion vocabulary: `0 -> "no-lesion"`, `1 -> "yes-lesion"`.
    pub fn lesion() -> Self {
        Self {
            entries: vec![(0, "no-lesion".to_string()), (1, "yes-lesion".to_string())],
        }
    }

    /// Entries in iteration order.
    pub fn entries(&self) -> &[(i64, String)] {
        &self.entries
    }

    /// Tokens in iteration order.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, t)| t.as_str())
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false for a validated vocabulary.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for LabelVocabulary {
    fn default() -> Self {
        Self::lesion()
    }
}

impl TryFrom<Vec<(i64, String)>> for LabelVocabulary {
    type Error = Error;

    fn try_from(entries: Vec<(i64, String)>) -> Result<Self> {
        Self::new(entries)
    }
}

impl From<LabelVocabulary> for Vec<(i64, String)> {
    fn from(vocab: LabelVocabulary) -> Self {
        vocab.entries
    }
}

/// Resolve the class code of `subject_name`.
///
/// The name must contain exactly one token. Returns
/// [`Error::UnlabeledSubject`] when it contains none and
/// [`Error::AmbiguousLabel`] when it contains several.
pub fn resolve_label(subject_name: &str, vocabulary: &LabelVocabulary) -> Result<i64> {
    let mut matched = vocabulary
        .entries
        .iter()
        .filter(|(_, token)| subject_name.contains(token.as_str()));

    match (matched.next(), matched.next()) {
        (Some(&(code, _)), None) => Ok(code),
        (None, _) => Err(Error::UnlabeledSubject {
            name: subject_name.to_string(),
            tokens: vocabulary.tokens().map(str::to_string).collect(),
        }),
        (Some(first), Some(second)) => {
            let mut tokens = vec![first.1.clone(), second.1.clone()];
            tokens.extend(matched.map(|(_, t)| t.clone()));
            Err(Error::AmbiguousLabel {
                name: subject_name.to_string(),
                matched: tokens,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_lesion_labels() {
        let vocab = LabelVocabulary::lesion();
        assert_eq!(resolve_label("sub01_no-lesion", &vocab).unwrap(), 0);
        assert_eq!(resolve_label("yes-lesion_sub03.nii.gz", &vocab).unwrap(), 1);
    }

    #[test]
    fn test_unlabeled_subject() {
        let vocab = LabelVocabulary::lesion();
        let err = resolve_label("sub02_unlabeled", &vocab).unwrap_err();
        assert!(matches!(err, Error::UnlabeledSubject { .. }));
    }

    #[test]
    fn test_ambiguous_subject() {
        let vocab = LabelVocabulary::lesion();
        let err = resolve_label("sub04_no-lesion_yes-lesion", &vocab).unwrap_err();
        match err {
            Error::AmbiguousLabel { matched, .. } => {
                assert_eq!(matched, vec!["no-lesion", "yes-lesion"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_overlapping_tokens_rejected() {
        let err = LabelVocabulary::new([(0, "no-lesion"), (1, "lesion")]).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_duplicate_codes_rejected() {
        assert!(LabelVocabulary::new([(0, "cat"), (0, "dog")]).is_err());
        assert!(LabelVocabulary::new(Vec::<(i64, String)>::new()).is_err());
        assert!(LabelVocabulary::new([(0, "")]).is_err());
    }

    #[test]
    fn test_codes_need_not_be_contiguous() {
        let vocab = LabelVocabulary::new([(7, "glioma"), (3, "meningioma")]).unwrap();
        assert_eq!(resolve_label("case_meningioma_01", &vocab).unwrap(), 3);
        assert_eq!(vocab.len(), 2);
    }
}
