//! Tokenizer for data path identifiers.
//!
//! `/oc-if:interfaces/interface/state/counters/inUnicastPkts` is split on
//! `. - / :`, each piece is further split on case changes and letter/digit
//! transitions (keeping the original piece at the position of its first
//! part), lowercased, and expanded with networking synonyms at the same
//! position.
//!
//! - `inUnicastPkts` -> `inunicastpkts`, `in`, `inbound`, `unicast`,
//!   `ucast`, `pkts`
//! - `GigabitEthernet0` -> `gigabitethernet0`, `gigabit`, `ethernet`, `0`

use std::{collections::HashMap, sync::Arc};

use tantivy::tokenizer::{
    Language,
    LowerCaser,
    SimpleTokenizer,
    Stemmer,
    StopWordFilter,
    TextAnalyzer,
    Token,
    TokenStream,
    Tokenizer,
};

use crate::{
    error::{Error, Result},
    index_config::{
        AnalyzerDef,
        FilterDef,
        IndexConfig,
        LOWERCASE,
        TokenizerDef,
        pattern_chars,
        synonym_groups,
    },
};

#[derive(Debug, Clone, Default)]
pub struct PathTokenizer {
    split_chars: Arc<[char]>,
    word_delimiter: bool,
    preserve_original: bool,
    lowercase: bool,
    synonyms: Arc<HashMap<String, Vec<String>>>,
}

impl PathTokenizer {
    pub fn new(split_chars: &[char]) -> Self {
        Self {
            split_chars: split_chars.into(),
            ..Self::default()
        }
    }

    pub fn with_word_delimiter(mut self, preserve_original: bool) -> Self {
        self.word_delimiter = true;
        self.preserve_original = preserve_original;
        self
    }

    pub fn with_lowercase(mut self) -> Self {
        self.lowercase = true;
        self
    }

    /// Expand every member of a group to all other members.
    pub fn with_synonyms(mut self, groups: &[Vec<String>]) -> Self {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for group in groups {
            for word in group {
                let others = group.iter().filter(|w| *w != word).cloned();
                map.entry(word.clone()).or_default().extend(others);
            }
        }
        self.synonyms = Arc::new(map);
        self
    }

    /// Build the analyzer named `name` from the analysis section of
    /// `config`.
    pub fn from_config(config: &IndexConfig, name: &str) -> Result<Self> {
        let analysis = &config.settings.analysis;
        let unknown = |what: &str, id: &str| {
            Error::Config(format!("analyzer {name}: unknown {what} {id}"))
        };

        let Some(AnalyzerDef::Custom { tokenizer, filter }) =
            analysis.analyzer.get(name)
        else {
            return Err(unknown("analyzer", name));
        };
        let TokenizerDef::SimplePatternSplit { pattern } = analysis
            .tokenizer
            .get(tokenizer)
            .ok_or_else(|| unknown("tokenizer", tokenizer))?;

        let mut built = Self::new(&pattern_chars(pattern));
        for id in filter {
            if id == LOWERCASE {
                built = built.with_lowercase();
                continue;
            }
            built = match analysis.filter.get(id) {
                Some(FilterDef::WordDelimiter { preserve_original }) => {
                    built.with_word_delimiter(*preserve_original)
                }
                Some(FilterDef::Synonym { synonyms, .. }) => {
                    built.with_synonyms(&synonym_groups(synonyms))
                }
                None => return Err(unknown("filter", id)),
            };
        }
        Ok(built)
    }

    pub fn analyzer(&self) -> TextAnalyzer {
        TextAnalyzer::builder(self.clone()).build()
    }

    /// Run the full chain over `text`.
    pub fn analyze(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut position = 0;

        for (from, to) in split_ranges(text, &self.split_chars) {
            let piece = &text[from..to];
            let parts = if self.word_delimiter {
                word_parts(piece)
            } else {
                vec![(0, piece.len())]
            };
            if parts.is_empty() {
                continue;
            }

            let whole = parts.len() == 1 && parts[0] == (0, piece.len());
            if self.preserve_original && !whole {
                self.emit(&mut tokens, piece, from, to, position);
            }
            for (i, (start, end)) in parts.iter().enumerate() {
                self.emit(
                    &mut tokens,
                    &piece[*start..*end],
                    from + start,
                    from + end,
                    position + i,
                );
            }
            position += parts.len();
        }
        tokens
    }

    fn emit(
        &self,
        tokens: &mut Vec<Token>,
        text: &str,
        offset_from: usize,
        offset_to: usize,
        position: usize,
    ) {
        let text = if self.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        let expansions = self.synonyms.get(&text).cloned().unwrap_or_default();

        for word in std::iter::once(text).chain(expansions) {
            let seen = tokens
                .iter()
                .rev()
                .take_while(|t| t.position == position)
                .any(|t| t.text == word);
            if seen {
                continue;
            }
            tokens.push(Token {
                offset_from,
                offset_to,
                position,
                text: word,
                position_length: 1,
            });
        }
    }
}

/// Byte ranges of the non-empty pieces between split characters.
fn split_ranges(text: &str, split: &[char]) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = 0;
    for (i, ch) in text.char_indices() {
        if split.contains(&ch) {
            if i > start {
                ranges.push((start, i));
            }
            start = i + ch.len_utf8();
        }
    }
    if start < text.len() {
        ranges.push((start, text.len()));
    }
    ranges
}

/// Word-delimiter parts of `word`: split on non-alphanumerics, on
/// lower-to-upper case changes, before the last capital of an acronym
/// (`HCIn` -> `HC`, `In`) and between letters and digits.
fn word_parts(word: &str) -> Vec<(usize, usize)> {
    let chars: Vec<(usize, char)> = word.char_indices().collect();
    let mut parts = Vec::new();
    let mut start: Option<usize> = None;

    for (i, &(offset, ch)) in chars.iter().enumerate() {
        if !ch.is_alphanumeric() {
            if let Some(s) = start.take() {
                parts.push((s, offset));
            }
            continue;
        }
        let Some(s) = start else {
            start = Some(offset);
            continue;
        };

        let prev = chars[i - 1].1;
        let next_is_lower =
            chars.get(i + 1).is_some_and(|(_, n)| n.is_lowercase());
        let boundary = (prev.is_lowercase() && ch.is_uppercase())
            || (prev.is_uppercase() && ch.is_uppercase() && next_is_lower)
            || (prev.is_alphabetic() && ch.is_numeric())
            || (prev.is_numeric() && ch.is_alphabetic());
        if boundary {
            parts.push((s, offset));
            start = Some(offset);
        }
    }
    if let Some(s) = start {
        parts.push((s, word.len()));
    }
    parts
}

impl Tokenizer for PathTokenizer {
    type TokenStream<'a> = PathTokenStream;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        PathTokenStream {
            tokens: self.analyze(text),
            current_index: 0,
        }
    }
}

pub struct PathTokenStream {
    tokens: Vec<Token>,
    current_index: usize,
}

impl TokenStream for PathTokenStream {
    fn advance(&mut self) -> bool {
        if self.current_index < self.tokens.len() {
            self.current_index += 1;
            true
        } else {
            false
        }
    }

    fn token(&self) -> &Token {
        &self.tokens[self.current_index - 1]
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.tokens[self.current_index - 1]
    }
}

/// The stop set of the Elasticsearch `snowball` analyzer for English.
const ENGLISH_STOP_WORDS: [&str; 33] = [
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in",
    "into", "is", "it", "no", "not", "of", "on", "or", "such", "that", "the",
    "their", "then", "there", "these", "they", "this", "to", "was", "will",
    "with",
];

/// English stemming analyzer for free-text descriptions. Stop words are
/// dropped before stemming, so they never have to match.
pub fn snowball_analyzer() -> TextAnalyzer {
    let stop_words = ENGLISH_STOP_WORDS.iter().map(|w| w.to_string());
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(stop_words))
        .filter(Stemmer::new(Language::English))
        .build()
}
