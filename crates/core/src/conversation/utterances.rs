pub const AFFIRMATIVE: &[&str] = &["yes", "yea", "yup", "yep", "ya", "sure", "ok", "y", "yeah", "yah"];
pub const NEGATIVE: &[&str] = &["no", "nah", "nope", "n"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
}

/// The affirmative and negative phrase sets shared by every yes/no question.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Utterances {
    affirmative: Vec<String>,
    negative: Vec<String>,
}

impl Default for Utterances {
    fn default() -> Self {
        Self::new(AFFIRMATIVE, NEGATIVE)
    }
}

impl Utterances {
    /// Builds the sets. A phrase present in both is kept only as affirmative so
    /// the sets stay disjoint.
    pub fn new(affirmative: &[&str], negative: &[&str]) -> Self {
        let affirmative: Vec<String> =
            affirmative.iter().map(|phrase| phrase.trim().to_ascii_lowercase()).collect();
        let negative = negative
            .iter()
            .map(|phrase| phrase.trim().to_ascii_lowercase())
            .filter(|phrase| !affirmative.contains(phrase))
            .collect();
        Self { affirmative, negative }
    }

    /// Classifies by the reply's first word, ignoring case and surrounding punctuation.
    pub fn classify(&self, text: &str) -> Option<Answer> {
        let first = text.split_whitespace().next()?;
        let word = first.trim_matches(|ch: char| !ch.is_alphanumeric()).to_lowercase();
        if word.is_empty() {
            return None;
        }
        if self.affirmative.iter().any(|phrase| *phrase == word) {
            Some(Answer::Yes)
        } else if self.negative.iter().any(|phrase| *phrase == word) {
            Some(Answer::No)
        } else {
            None
        }
    }
}
