//! Feature extraction: word shape, word-class flags, and the static and
//! latent feature templates.
//!
//! The flag predicates and the word-shape collapsing rule are ported
//! character-for-character from the reference tagger's regex set — they
//! are frozen, not tunable, because a model trained against one version
//! is meaningless scored against another. Two of the reference patterns
//! (`number`, `emoticon`) rely on lookaround and a backreference the
//! `regex` crate deliberately does not support (it guarantees linear-time
//! matching); those two are reimplemented as small hand-written predicates
//! below with the same intent — full-string recognition of a number or
//! emoticon shape — rather than dropped or faked with a crate this pack
//! never reaches for.

use std::sync::{Mutex, OnceLock};

use lru::LruCache;
use regex::Regex;

use crate::resources::{BrownClusters, Lexicon, WordToVec};

const SHAPE_CACHE_SIZE: usize = 10_240;
const FLAGS_CACHE_SIZE: usize = 10_240;

/// The frozen face literal list, sorted longest-first so a literal match
/// always wins over a shorter pattern-based one.
const EMOTICON_LITERALS: &[&str] = &[
    ":wink:", "*<:-)", ":;-))", ":;))", "(-.-)", "(T_T)", "(\u{2665}_\u{2665})", ")':", ")-:",
    "(-:", ")=", ")o:", ")x", ":'C", ":/", ":<", ":C", ":[", "=(", "=)", "=D", "=P", ">:", "D':",
    "D:", "\\:", "]:", "x(", "^^", "o.O", "oO", "\\O/", "\\m/", "_))", "*_*", "._.", ">_<", ":!:",
];

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^[[:alnum:].%+-]+(?:@| \[?at\]? )[[:alnum:].-]+(?:\.| \[?dot\]? )[[:alpha:]]{2,}$")
            .expect("email regex")
    })
}

fn xmltag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^</?[^>]+>$").expect("xmltag regex"))
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?:(?:(?:https?|ftp|svn)://|(?:https?://)?www\.).+)|(?:[\w./-]+\.(?:de|com|org|net|edu|info|jpg|png|gif|log|txt)(?:-\w+)?)$",
        )
        .expect("url regex")
    })
}

fn mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^@\w+$").expect("mention regex"))
}

fn hashtag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#\w+$").expect("hashtag regex"))
}

fn action_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[*+][^*]+[*]$").expect("action word regex"))
}

fn punctuation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^[\]\[(){}.!?…<>%‰€$£₤¥°@~*„"“”‚'‘`´»«›‹,;:/+=&§#^−–-]+$"#)
            .expect("punctuation regex")
    })
}

fn ordinal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:\d+\.)+$").expect("ordinal regex"))
}

/// Full-string numeric recognizer. The reference used `.search` with a
/// lookbehind/lookahead pair to find a number-shaped run not bordered by
/// other word characters; applied to an already-tokenized word, requiring
/// the whole token to match is the faithful equivalent.
fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[−+-]?\d*[.,]?\d+(?:[eE][−+-]?\d+)?|\d+[\d.,]*\d+)$").expect("number regex")
    })
}

/// Emoticon eyes-nose-mouth pattern, with the `(?<!\d)8`-as-eye lookbehind
/// dropped (vacuously true at the start of an anchored match) and the
/// `([DPp])\1*` backreference unrolled into same-letter repetition.
fn emoticon_pattern_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[:;8][-'oO]?(?:\)+|\(+|\*|D+|P+|p+)|xD+|XD+|[:;][ ]+[()]|\^3)$")
            .expect("emoticon pattern regex")
    })
}

fn emoji_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new("^[\u{2600}-\u{27BF}\u{1F300}-\u{1F64F}\u{1F680}-\u{1F6FF}\u{1F900}-\u{1F9FF}]$")
            .expect("emoji regex")
    })
}

fn is_number(word: &str) -> bool {
    number_re().is_match(word)
}

fn is_emoticon(word: &str) -> bool {
    EMOTICON_LITERALS.contains(&word) || emoticon_pattern_re().is_match(word)
}

/// Python's `str.istitle()`: at least one cased character, every uppercase
/// letter immediately follows an uncased character, every lowercase letter
/// follows a cased one.
fn is_title(word: &str) -> bool {
    let mut any_cased = false;
    let mut prev_cased = false;
    for c in word.chars() {
        if c.is_uppercase() {
            if prev_cased {
                return false;
            }
            any_cased = true;
            prev_cased = true;
        } else if c.is_lowercase() {
            if !prev_cased {
                return false;
            }
            any_cased = true;
            prev_cased = true;
        } else {
            prev_cased = false;
        }
    }
    any_cased
}

fn is_upper(word: &str) -> bool {
    let mut any_cased = false;
    for c in word.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_uppercase() {
            any_cased = true;
        }
    }
    any_cased
}

fn is_lower(word: &str) -> bool {
    let mut any_cased = false;
    for c in word.chars() {
        if c.is_uppercase() {
            return false;
        }
        if c.is_lowercase() {
            any_cased = true;
        }
    }
    any_cased
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordFlags {
    pub isalpha: bool,
    pub isnumeric: bool,
    pub islower: bool,
    pub isupper: bool,
    pub istitle: bool,
    pub isemail: bool,
    pub istag: bool,
    pub isurl: bool,
    pub ismention: bool,
    pub ishashtag: bool,
    pub isactword: bool,
    pub isemoticon: bool,
    pub isemoji: bool,
    pub ispunct: bool,
    pub isordinal: bool,
    pub isnumber: bool,
}

impl WordFlags {
    fn compute(word: &str) -> Self {
        Self {
            isalpha: !word.is_empty() && word.chars().all(char::is_alphabetic),
            isnumeric: !word.is_empty() && word.chars().all(char::is_numeric),
            islower: is_lower(word),
            isupper: is_upper(word),
            istitle: is_title(word),
            isemail: email_re().is_match(word),
            istag: xmltag_re().is_match(word),
            isurl: url_re().is_match(word),
            ismention: mention_re().is_match(word),
            ishashtag: hashtag_re().is_match(word),
            isactword: action_word_re().is_match(word),
            isemoticon: is_emoticon(word),
            isemoji: emoji_re().is_match(word),
            ispunct: punctuation_re().is_match(word),
            isordinal: ordinal_re().is_match(word),
            isnumber: is_number(word),
        }
    }

    /// Renders `{prefix}_isX` feature names for every flag that is set, in
    /// the same order the reference tagger appends them.
    pub fn names(&self, prefix: &str) -> Vec<String> {
        let mut out = Vec::new();
        macro_rules! push_if {
            ($field:ident, $name:literal) => {
                if self.$field {
                    out.push(format!("{prefix}_{}", $name));
                }
            };
        }
        push_if!(isalpha, "isalpha");
        push_if!(isnumeric, "isnumeric");
        push_if!(islower, "islower");
        push_if!(isupper, "isupper");
        push_if!(istitle, "istitle");
        push_if!(isemail, "isemail");
        push_if!(istag, "istag");
        push_if!(isurl, "isurl");
        push_if!(ismention, "ismention");
        push_if!(ishashtag, "ishashtag");
        push_if!(isactword, "isactword");
        push_if!(isemoticon, "isemoticon");
        push_if!(isemoji, "isemoji");
        push_if!(ispunct, "ispunct");
        push_if!(isordinal, "isordinal");
        push_if!(isnumber, "isnumber");
        out
    }
}

fn shape_cache() -> &'static Mutex<LruCache<String, String>> {
    static CACHE: OnceLock<Mutex<LruCache<String, String>>> = OnceLock::new();
    CACHE.get_or_init(|| {
        Mutex::new(LruCache::new(
            std::num::NonZeroUsize::new(SHAPE_CACHE_SIZE).unwrap(),
        ))
    })
}

fn flags_cache() -> &'static Mutex<LruCache<String, WordFlags>> {
    static CACHE: OnceLock<Mutex<LruCache<String, WordFlags>>> = OnceLock::new();
    CACHE.get_or_init(|| {
        Mutex::new(LruCache::new(
            std::num::NonZeroUsize::new(FLAGS_CACHE_SIZE).unwrap(),
        ))
    })
}

/// Collapses a word into its character-class shape: letters become `X`/`x`
/// (by case), digits become `d`, everything else is kept literally; any
/// run longer than 4 of the same shape character is capped at 4. Words of
/// 100 characters or more collapse to the literal string `"LONG"`.
pub fn word_shape(word: &str) -> String {
    if let Some(hit) = shape_cache().lock().unwrap().get(word) {
        return hit.clone();
    }
    let shape = compute_word_shape(word);
    shape_cache().lock().unwrap().put(word.to_string(), shape.clone());
    shape
}

fn compute_word_shape(word: &str) -> String {
    if word.chars().count() >= 100 {
        return "LONG".to_string();
    }
    let mut shape = String::new();
    let mut last: Option<char> = None;
    let mut run = 0usize;
    for c in word.chars() {
        let shape_char = if c.is_alphabetic() {
            if c.is_uppercase() {
                'X'
            } else {
                'x'
            }
        } else if c.is_ascii_digit() {
            'd'
        } else {
            c
        };
        if last == Some(shape_char) {
            run += 1;
        } else {
            run = 0;
            last = Some(shape_char);
        }
        if run < 4 {
            shape.push(shape_char);
        }
    }
    shape
}

/// Boolean flags for `word`, memoized (the predicates are pure functions
/// of the string, independent of the position prefix used to name them).
pub fn word_flags(word: &str) -> WordFlags {
    if let Some(hit) = flags_cache().lock().unwrap().get(word) {
        return hit.clone();
    }
    let flags = WordFlags::compute(word);
    flags_cache()
        .lock()
        .unwrap()
        .put(word.to_string(), flags.clone());
    flags
}

const START2: &str = "<START-2>";
const START1: &str = "<START-1>";
const END1: &str = "<END+1>";
const END2: &str = "<END+2>";

/// Extracts the position-local static feature set for every token of one
/// sentence. `sentence` is the raw (not lowercased) tokens.
pub fn extract_static_features(
    sentence: &[String],
    lexicon: Option<&Lexicon>,
    brown_clusters: Option<&BrownClusters>,
    word_to_vec: Option<&WordToVec>,
) -> Vec<Vec<String>> {
    let length = sentence.len();
    let mut tokens: Vec<String> = Vec::with_capacity(length + 4);
    tokens.push(START2.to_string());
    tokens.push(START1.to_string());
    tokens.extend(sentence.iter().map(|w| w.to_lowercase()));
    tokens.push(END1.to_string());
    tokens.push(END2.to_string());

    let mut out = Vec::with_capacity(length);
    for (i, word) in sentence.iter().enumerate() {
        let j = i + 2;
        let mut features = Vec::new();
        let w = &tokens[j];
        let p1 = &tokens[j - 1];
        let p2 = &tokens[j - 2];
        let n1 = &tokens[j + 1];
        let n2 = &tokens[j + 2];

        features.push("bias".to_string());
        features.push(format!("W_loglength: {}", round_log(word.chars().count())));
        features.push(format!("W_word: {w}"));
        features.push(format!("N1_word: {n1}"));
        features.push(format!("N2_word: {n2}"));
        features.push(format!("W_prefix: {}", take_prefix(w, 3)));
        features.push(format!("W_suffix: {}", take_suffix(w, 3)));
        if i >= 1 {
            features.push(format!("P1_suffix: {}", take_suffix(p1, 3)));
        }
        if length - i > 1 {
            features.push(format!("N1_suffix: {}", take_suffix(n1, 3)));
        }
        features.push(format!("W_shape: {}", word_shape(word)));

        if i >= 2 {
            features.extend(word_flags(p2).names("P2"));
        }
        if i >= 1 {
            features.extend(word_flags(p1).names("P1"));
        }
        features.extend(word_flags(w).names("W"));
        if length - i > 1 {
            features.extend(word_flags(n1).names("N1"));
        }
        if length - i > 2 {
            features.extend(word_flags(n2).names("N2"));
        }

        if let Some(brown) = brown_clusters {
            if i >= 2 {
                let (bc, _) = brown.get(p2.as_str()).cloned().unwrap_or(("N/A".to_string(), 0));
                features.push(format!("P2_brown: {bc}"));
            }
            if i >= 1 {
                let (bc, _) = brown.get(p1.as_str()).cloned().unwrap_or(("N/A".to_string(), 0));
                features.push(format!("P1_brown: {bc}"));
            }
            let (bc, freq) = brown.get(w.as_str()).cloned().unwrap_or(("N/A".to_string(), 0));
            features.push(format!("W_brown: {bc}"));
            features.push(format!("W_logfreq: {freq}"));
            if length - i > 1 {
                let (bc, _) = brown.get(n1.as_str()).cloned().unwrap_or(("N/A".to_string(), 0));
                features.push(format!("N1_brown: {bc}"));
            }
            if length - i > 2 {
                let (bc, _) = brown.get(n2.as_str()).cloned().unwrap_or(("N/A".to_string(), 0));
                features.push(format!("N2_brown: {bc}"));
            }
        }

        if let Some(w2v) = word_to_vec {
            if let Some(cluster) = w2v.get(w.as_str()) {
                features.push(format!("W_w2v: {cluster}"));
            }
        }

        if let Some(lex) = lexicon {
            if let Some(tags) = lex.get(w.as_str()) {
                for tag in tags {
                    features.push(format!("W_lex: {tag}"));
                }
            } else {
                features.push("W_lex: N/A".to_string());
            }
        }

        out.push(features);
    }
    out
}

fn round_log(len: usize) -> i64 {
    if len == 0 {
        return 0;
    }
    (len as f64).ln().round() as i64
}

fn take_prefix(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn take_suffix(s: &str, n: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    let start = chars.len().saturating_sub(n);
    chars[start..].iter().collect()
}

/// Extracts the label-history-dependent latent feature set for the token
/// at sentence-local position `i` (global position `global_i` into
/// `words_lower`, already lowercased). `p1_tag`/`p2_tag` are the decoder's
/// current guesses for the immediately preceding one/two positions, or the
/// `<START-1>`/`<START-2>` sentinel at the start of a sentence.
pub fn extract_latent_features(
    words_lower: &[String],
    global_i: usize,
    i: usize,
    p1_tag: &str,
    p2_tag: &str,
) -> Vec<String> {
    let mut features = Vec::new();
    if i >= 1 {
        features.push(format!(
            "P1_word, P1_pos: {}, {}",
            words_lower[global_i - 1],
            p1_tag
        ));
    }
    if i >= 2 {
        features.push(format!(
            "P2_word, P2_pos: {}, {}",
            words_lower[global_i - 2],
            p2_tag
        ));
    }
    features.push(format!("P1_pos: {p1_tag}"));
    features.push(format!("P2_pos: {p2_tag}"));
    features.push(format!("P2_pos, P1_pos: {p2_tag}, {p1_tag}"));
    features.push(format!("P1_pos, W_word: {p1_tag}, {}", words_lower[global_i]));
    features
}
