//! Parse demon: shallow, deterministic reading of the raw utterance.
//!
//! Regex and keyword heuristics only — ordered first-match semantics
//! throughout, so the tables can grow without touching the demon body.

use regex::Regex;

use super::{Demon, DemonId, DemonOutput, Trigger};
use crate::error::KernelResult;
use crate::memory::{Intent, SlotContent, SlotDraft, Subject, Tag, WorkingMemory};

const DESCRIPTION: &str = "Derives intent, subject, noun phrases, and question focus from raw input";

/// Words that never count as noun phrases. Includes the tutoring verbs and
/// relation verbs that would otherwise glue unrelated tokens into one phrase.
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "am", "i", "im", "you",
    "he", "she", "it", "its", "we", "they", "them", "me", "us", "my", "your", "his", "her", "our",
    "their", "this", "that", "these", "those", "there", "here", "do", "does", "did", "dont",
    "doesnt", "didnt", "not", "no", "yes", "what", "how", "why", "when", "where", "who", "which",
    "can", "could", "should", "would", "will", "wont", "cant", "thats", "whats", "isnt",
    "arent", "youre", "theyre", "heres", "theres", "of", "in", "on", "at", "to",
    "for", "from", "with", "without", "about", "into", "over", "under", "and", "or", "but", "if",
    "then", "than", "because", "so", "as", "by", "up", "down", "out", "off", "very", "really",
    "just", "too", "also", "again", "still", "have", "has", "had", "get", "got", "give", "let",
    "lets", "please", "thanks", "thank", "hi", "hello", "hey", "okay", "ok", "some", "any", "all",
    "more", "most", "other", "one", "two", "understand", "know", "think", "mean", "means",
    "explain", "describe", "define", "tell", "show", "help", "teach", "work", "works", "like",
    "causes", "cause", "caused", "produces", "produce", "makes", "make", "creates", "create",
    "leads", "results", "contains", "contain", "requires", "require", "needs", "need", "equals",
    "equal", "part",
];

/// Keyword buckets for subject classification; first matching bucket wins.
const SUBJECT_KEYWORDS: &[(Subject, &[&str])] = &[
    (
        Subject::Mathematics,
        &[
            "math", "mathematics", "algebra", "geometry", "calculus", "equation", "fraction",
            "integer", "theorem", "angle", "triangle", "multiply", "divide", "polynomial",
        ],
    ),
    (
        Subject::Physics,
        &[
            "physics", "force", "energy", "gravity", "motion", "velocity", "acceleration",
            "electricity", "magnet", "momentum", "friction", "quantum", "wave", "voltage",
        ],
    ),
    (
        Subject::Chemistry,
        &[
            "chemistry", "atom", "molecule", "element", "reaction", "compound", "acid", "base",
            "ion", "electron",
        ],
    ),
    (
        Subject::Biology,
        &[
            "biology", "cell", "dna", "evolution", "organism", "photosynthesis", "gene",
            "protein", "species", "bacteria", "plant", "animal",
        ],
    ),
    (
        Subject::History,
        &[
            "history", "war", "ancient", "century", "empire", "revolution", "king", "queen",
            "civilization", "medieval",
        ],
    ),
    (
        Subject::Language,
        &[
            "grammar", "verb", "noun", "sentence", "adjective", "vocabulary", "spelling",
            "pronoun", "syllable", "language",
        ],
    ),
    (
        Subject::ComputerScience,
        &[
            "computer", "program", "programming", "code", "algorithm", "software", "variable",
            "function", "loop", "array", "compiler",
        ],
    ),
    (
        Subject::Geography,
        &[
            "geography", "country", "continent", "ocean", "river", "mountain", "map", "climate",
            "capital", "desert",
        ],
    ),
    (
        Subject::Economics,
        &[
            "economics", "economy", "money", "market", "trade", "supply", "demand", "price",
            "inflation", "tax",
        ],
    ),
];

const QUESTION_LEADS: &[&str] = &[
    "what", "how", "why", "when", "where", "who", "which", "is", "are", "do", "does", "did",
    "can", "could", "would", "should", "will",
];

pub struct ParseDemon {
    greeting: Regex,
    confusion: Regex,
    correction: Regex,
    request: Regex,
    /// Ordered (pattern, capture-group) family for question focus.
    focus_patterns: Vec<Regex>,
}

impl ParseDemon {
    pub fn new() -> Self {
        Self {
            greeting: Regex::new(
                r"^(hi|hiya|hello|hey|howdy|greetings|good (morning|afternoon|evening))\b",
            )
            .expect("greeting pattern"),
            confusion: Regex::new(
                r"(don'?t|do not|dont) understand|confus(ed|ing|ion)|makes? no sense|doesn'?t make sense|\bi'?m lost\b",
            )
            .expect("confusion pattern"),
            correction: Regex::new(
                r"^(no\b|nope\b|wrong\b|actually\b|incorrect\b|not (quite|right|true)\b|that'?s (wrong|not right))",
            )
            .expect("correction pattern"),
            request: Regex::new(r"^(please|explain|describe|define|tell|show|help|teach)\b")
                .expect("request pattern"),
            focus_patterns: vec![
                Regex::new(r"^what (?:is|are) (?:a |an |the )?(.+)$").expect("focus: what-is"),
                Regex::new(r"^how (?:do|does|did|can|could|would) (.+?)(?: work)?$")
                    .expect("focus: how-does"),
                Regex::new(r"^why (?:is|are|do|does|did) (.+)$").expect("focus: why-is"),
                Regex::new(r"^(?:explain|describe|define|tell me about|tell me) (.+?)(?: to me| for me| please)?$")
                    .expect("focus: imperative"),
            ],
        }
    }

    fn classify_intent(&self, lower: &str) -> Intent {
        let leading = lower.split_whitespace().next().unwrap_or("");
        if self.greeting.is_match(lower) {
            Intent::Greeting
        } else if lower.ends_with('?') || QUESTION_LEADS.contains(&leading) {
            Intent::Question
        } else if self.confusion.is_match(lower) {
            Intent::Confusion
        } else if self.correction.is_match(lower) {
            Intent::Correction
        } else if self.request.is_match(lower) {
            Intent::Request
        } else if lower.split_whitespace().count() > 2 {
            Intent::Claim
        } else {
            Intent::Unknown
        }
    }

    fn classify_subject(lower: &str) -> Subject {
        for (subject, keywords) in SUBJECT_KEYWORDS {
            if keywords.iter().any(|k| lower.contains(k)) {
                return *subject;
            }
        }
        Subject::General
    }

    fn extract_focus(&self, lower: &str) -> String {
        let trimmed = lower.trim_end_matches(['?', '.', '!']).trim();
        for pattern in &self.focus_patterns {
            if let Some(caps) = pattern.captures(trimmed) {
                if let Some(m) = caps.get(1) {
                    let focus = m.as_str().trim();
                    if !focus.is_empty() {
                        return focus.to_string();
                    }
                }
            }
        }
        trimmed.to_string()
    }

    fn chain_for(intent: Intent) -> Vec<DemonId> {
        match intent {
            Intent::Question | Intent::Request => {
                vec![DemonId::Relate, DemonId::Infer, DemonId::Question]
            }
            Intent::Claim => vec![DemonId::Relate, DemonId::Infer, DemonId::Decompose],
            Intent::Confusion => vec![DemonId::Decompose, DemonId::Analogize, DemonId::Question],
            Intent::Correction => vec![DemonId::Relate, DemonId::Infer],
            Intent::Greeting => vec![DemonId::Question],
            Intent::Unknown => vec![DemonId::Relate, DemonId::Question],
        }
    }
}

impl Default for ParseDemon {
    fn default() -> Self {
        Self::new()
    }
}

/// True when the label is a known curricular keyword in any subject bucket.
pub(crate) fn is_subject_keyword(label: &str) -> bool {
    SUBJECT_KEYWORDS
        .iter()
        .any(|(_, keywords)| keywords.contains(&label))
}

/// Lower-cases, strips punctuation, drops stop-words and single characters,
/// and yields contiguous non-stop-word groups plus the remaining atoms,
/// deduplicated in insertion order.
pub(crate) fn extract_noun_phrases(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                Some(c)
            } else if c == '\'' {
                None
            } else {
                Some(' ')
            }
        })
        .collect();

    let mut phrases: Vec<String> = Vec::new();
    let mut atoms: Vec<String> = Vec::new();
    let mut group: Vec<&str> = Vec::new();
    let flush = |group: &mut Vec<&str>, phrases: &mut Vec<String>| {
        if group.len() >= 2 {
            phrases.push(group.join(" "));
        }
        group.clear();
    };

    for token in cleaned.split_whitespace() {
        if token.len() <= 1 || STOP_WORDS.contains(&token) {
            flush(&mut group, &mut phrases);
            continue;
        }
        group.push(token);
        atoms.push(token.to_string());
    }
    flush(&mut group, &mut phrases);

    phrases.extend(atoms);
    let mut seen = std::collections::HashSet::new();
    phrases.retain(|p| seen.insert(p.clone()));
    phrases
}

impl Demon for ParseDemon {
    fn id(&self) -> DemonId {
        DemonId::Parse
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn triggers(&self) -> Vec<Trigger> {
        vec![Trigger::NewInput]
    }

    fn run(
        &self,
        memory: &WorkingMemory,
        _chained_from: Option<DemonId>,
    ) -> KernelResult<DemonOutput> {
        let Some(raw) = memory.latest_by_tag(&Tag::RawInput).and_then(|s| match &s.content {
            SlotContent::RawInput(text) => Some(text.clone()),
            _ => None,
        }) else {
            return Ok(DemonOutput::new());
        };
        let lower = raw.trim().to_lowercase();

        let intent = self.classify_intent(&lower);
        let subject = Self::classify_subject(&lower);
        let phrases = extract_noun_phrases(&lower);

        let mut out = DemonOutput::new();
        let intent_confidence = match intent {
            Intent::Unknown => 0.4,
            Intent::Claim => 0.6,
            _ => 0.9,
        };
        out.writes
            .push(SlotDraft::new(SlotContent::Intent(intent)).confidence(intent_confidence));
        out.writes.push(
            SlotDraft::new(SlotContent::Subject(subject))
                .confidence(if subject == Subject::General { 0.5 } else { 0.8 }),
        );
        for phrase in &phrases {
            out.writes.push(
                SlotDraft::new(SlotContent::NounPhrase(phrase.clone()))
                    .confidence(0.7)
                    .ttl(10),
            );
        }
        if matches!(intent, Intent::Question | Intent::Request) {
            out.writes.push(
                SlotDraft::new(SlotContent::QuestionFocus(self.extract_focus(&lower)))
                    .confidence(0.8),
            );
        }

        out.chain = Self::chain_for(intent);
        tracing::debug!(
            target: "maieutic::demon",
            demon = "parse",
            ?intent,
            subject = subject.as_str(),
            phrases = phrases.len(),
            "input parsed"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn run_on(text: &str) -> (DemonOutput, WorkingMemory) {
        let mut memory = WorkingMemory::new();
        memory.write(
            SlotDraft::new(SlotContent::RawInput(text.to_string())).confidence(1.0),
            None,
        );
        let out = ParseDemon::new().run(&memory, None).unwrap();
        (out, memory)
    }

    fn written_intent(out: &DemonOutput) -> Intent {
        out.writes
            .iter()
            .find_map(|w| match w.content {
                SlotContent::Intent(i) => Some(i),
                _ => None,
            })
            .unwrap()
    }

    fn written_focus(out: &DemonOutput) -> Option<String> {
        out.writes.iter().find_map(|w| match &w.content {
            SlotContent::QuestionFocus(f) => Some(f.clone()),
            _ => None,
        })
    }

    #[test]
    fn classifies_intents_in_order() {
        assert_eq!(written_intent(&run_on("hi").0), Intent::Greeting);
        assert_eq!(written_intent(&run_on("what is gravity?").0), Intent::Question);
        assert_eq!(
            written_intent(&run_on("I don't understand electricity").0),
            Intent::Confusion
        );
        assert_eq!(
            written_intent(&run_on("no, that's wrong").0),
            Intent::Correction
        );
        assert_eq!(
            written_intent(&run_on("explain photosynthesis to me").0),
            Intent::Request
        );
        assert_eq!(
            written_intent(&run_on("photosynthesis produces oxygen").0),
            Intent::Claim
        );
        assert_eq!(written_intent(&run_on("ok").0), Intent::Unknown);
    }

    #[test]
    fn question_mark_outranks_confusion_wording() {
        assert_eq!(
            written_intent(&run_on("why doesn't this make sense?").0),
            Intent::Question
        );
    }

    #[test]
    fn extracts_focus_from_pattern_family() {
        assert_eq!(written_focus(&run_on("what is gravity?").0).unwrap(), "gravity");
        assert_eq!(
            written_focus(&run_on("how does photosynthesis work?").0).unwrap(),
            "photosynthesis"
        );
        assert_eq!(
            written_focus(&run_on("explain the water cycle").0).unwrap(),
            "the water cycle"
        );
        // no pattern matches: the whole input is the focus
        assert_eq!(
            written_focus(&run_on("is a dog an animal?").0).unwrap(),
            "is a dog an animal"
        );
    }

    #[test]
    fn subject_buckets_first_match_wins() {
        let (out, _) = run_on("what is gravity?");
        let subject = out
            .writes
            .iter()
            .find_map(|w| match w.content {
                SlotContent::Subject(s) => Some(s),
                _ => None,
            })
            .unwrap();
        assert_eq!(subject, Subject::Physics);
    }

    #[test]
    fn noun_phrases_group_and_atomize() {
        let phrases = extract_noun_phrases("The water cycle moves ocean water.");
        assert!(phrases.contains(&"water cycle".to_string()));
        assert!(phrases.contains(&"water".to_string()));
        assert!(phrases.contains(&"cycle".to_string()));
        // deduplicated: "water" appears once
        assert_eq!(phrases.iter().filter(|p| p.as_str() == "water").count(), 1);
    }

    #[test]
    fn greeting_words_yield_no_phrases() {
        assert!(extract_noun_phrases("hi").is_empty());
        assert!(extract_noun_phrases("hello there!").is_empty());
    }

    #[test]
    fn chains_follow_intent_table() {
        assert_eq!(
            run_on("what is gravity?").0.chain,
            vec![DemonId::Relate, DemonId::Infer, DemonId::Question]
        );
        assert_eq!(
            run_on("I don't understand electricity").0.chain,
            vec![DemonId::Decompose, DemonId::Analogize, DemonId::Question]
        );
        assert_eq!(run_on("hi").0.chain, vec![DemonId::Question]);
        assert_eq!(
            run_on("photosynthesis produces oxygen").0.chain,
            vec![DemonId::Relate, DemonId::Infer, DemonId::Decompose]
        );
    }

    proptest! {
        #[test]
        fn phrases_never_contain_stop_words_or_single_chars(text in ".{0,80}") {
            for phrase in extract_noun_phrases(&text) {
                prop_assert!(phrase.len() > 1);
                for word in phrase.split_whitespace() {
                    prop_assert!(!STOP_WORDS.contains(&word), "stop word leaked: {}", word);
                    prop_assert!(word.len() > 1);
                }
            }
        }
    }
}
