//! Corpus I/O: tagged/untagged reading, sentence-length bookkeeping, and
//! XML passthrough mode.
//!
//! The on-disk format is blank-line-delimited sentences of tab-separated
//! fields, one token per line — unchanged from the reference's
//! `get_sentences`/`read_corpus`. Everything downstream (extractor,
//! decoder, trainer) works over the flattened `(words, tags, lengths)`
//! triple this module produces, per the flat-plus-offsets token stream
//! described for the data model.

use std::io::BufRead;

use crate::error::{Result, TaggerErrorKind};

/// A flattened corpus: all tokens and (if tagged) labels concatenated
/// across sentences, plus a parallel per-sentence length vector.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub words: Vec<String>,
    pub tags: Vec<String>,
    pub lengths: Vec<usize>,
}

impl Corpus {
    /// Token index range `[start, end)` occupied by sentence `s`.
    pub fn sentence_range(&self, s: usize) -> std::ops::Range<usize> {
        let start: usize = self.lengths[..s].iter().sum();
        start..start + self.lengths[s]
    }

    pub fn num_sentences(&self) -> usize {
        self.lengths.len()
    }

    pub fn num_tokens(&self) -> usize {
        self.words.len()
    }

    pub fn sentence_words(&self, s: usize) -> &[String] {
        &self.words[self.sentence_range(s)]
    }

    pub fn sentence_tags(&self, s: usize) -> &[String] {
        &self.tags[self.sentence_range(s)]
    }
}

/// Reads a tagged corpus (`token<TAB>label` per line, blank line between
/// sentences) into a flattened [`Corpus`].
pub fn read_tagged<R: BufRead>(reader: R) -> Result<Corpus> {
    let mut corpus = Corpus::default();
    let mut sentence_len = 0usize;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| TaggerErrorKind::ResourceIo.with_source(e))?;
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            if sentence_len > 0 {
                corpus.lengths.push(sentence_len);
                sentence_len = 0;
            }
            continue;
        }
        let mut parts = trimmed.splitn(2, '\t');
        let (word, tag) = match (parts.next(), parts.next()) {
            (Some(w), Some(t)) => (w, t),
            _ => {
                return Err(TaggerErrorKind::InputFormat.with_message(format!(
                    "corpus line {}: expected \"token\\tlabel\"",
                    lineno + 1
                )))
            }
        };
        corpus.words.push(word.to_string());
        corpus.tags.push(tag.to_string());
        sentence_len += 1;
    }
    if sentence_len > 0 {
        corpus.lengths.push(sentence_len);
    }
    Ok(corpus)
}

/// Reads an untagged corpus (one token per line, blank line between
/// sentences) into a flattened [`Corpus`] with an empty `tags` vector.
pub fn read_untagged<R: BufRead>(reader: R) -> Result<Corpus> {
    let mut corpus = Corpus::default();
    let mut sentence_len = 0usize;
    for line in reader.lines() {
        let line = line.map_err(|e| TaggerErrorKind::ResourceIo.with_source(e))?;
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            if sentence_len > 0 {
                corpus.lengths.push(sentence_len);
                sentence_len = 0;
            }
            continue;
        }
        corpus.words.push(trimmed.to_string());
        sentence_len += 1;
    }
    if sentence_len > 0 {
        corpus.lengths.push(sentence_len);
    }
    Ok(corpus)
}

/// One line of XML-mode input: either a tag that passes through untouched,
/// or a token to be tagged (after HTML-entity unescaping).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlLine {
    Tag(String),
    Token(String),
}

fn is_xml_tag_line(line: &str) -> bool {
    line.starts_with('<') && line.ends_with('>') && line.len() >= 2 && !line[1..line.len() - 1].contains(['<', '>'])
}

/// Splits XML-mode input into passthrough tag lines and token lines, with
/// entities unescaped on the token lines.
pub fn read_xml_lines<R: BufRead>(reader: R) -> Result<Vec<XmlLine>> {
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| TaggerErrorKind::ResourceIo.with_source(e))?;
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if is_xml_tag_line(trimmed) {
            out.push(XmlLine::Tag(trimmed.to_string()));
        } else {
            out.push(XmlLine::Token(
                html_escape::decode_html_entities(trimmed).into_owned(),
            ));
        }
    }
    Ok(out)
}

/// Groups the `Token` lines of an XML-mode document into sentences,
/// treating each contiguous run between tag lines as one sentence. Mirrors
/// the reference's best-effort XML passthrough: structurally the document
/// is not required to carry sentence-boundary markers.
pub fn xml_sentences(lines: &[XmlLine]) -> Vec<Vec<String>> {
    let mut sentences = Vec::new();
    let mut current = Vec::new();
    for line in lines {
        match line {
            XmlLine::Token(tok) => current.push(tok.clone()),
            XmlLine::Tag(_) => {
                if !current.is_empty() {
                    sentences.push(std::mem::take(&mut current));
                }
            }
        }
    }
    if !current.is_empty() {
        sentences.push(current);
    }
    sentences
}

/// One line of a reconstructed tagged-XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaggedXmlLine {
    /// An XML tag line, passed through untouched.
    Tag(String),
    /// A tagged token, still undecorated with its optional coarse label —
    /// the caller appends that column, since only it knows the mapping.
    Token { word: String, tag: String },
}

/// Reinterleaves XML tag lines with tagged tokens, restoring document order.
///
/// `tags_per_sentence[i]` must be the tag sequence [`xml_sentences`] assigned
/// to word run `i`. A contiguous run of `Token` lines closes (advancing to
/// the next sentence) the moment a `Tag` line is seen, exactly as
/// `xml_sentences` groups runs — the two functions must walk `lines`
/// identically or word/tag pairs end up misaligned.
pub fn merge_xml_tags(lines: &[XmlLine], tags_per_sentence: &[Vec<String>]) -> Vec<TaggedXmlLine> {
    let mut out = Vec::with_capacity(lines.len());
    let mut sentence_idx = 0usize;
    let mut token_idx = 0usize;
    let mut in_run = false;
    for line in lines {
        match line {
            XmlLine::Tag(t) => {
                if in_run {
                    sentence_idx += 1;
                    token_idx = 0;
                    in_run = false;
                }
                out.push(TaggedXmlLine::Tag(t.clone()));
            }
            XmlLine::Token(tok) => {
                in_run = true;
                let tag = match tags_per_sentence.get(sentence_idx).and_then(|s| s.get(token_idx)) {
                    Some(tag) => tag.clone(),
                    None => {
                        TaggerErrorKind::InconsistentXml
                            .log_warn(format!("XML token {tok:?} has no matching decoded tag; emitting <UNK>"));
                        "<UNK>".to_string()
                    }
                };
                out.push(TaggedXmlLine::Token {
                    word: tok.clone(),
                    tag,
                });
                token_idx += 1;
            }
        }
    }
    out
}

/// Labels in ascending corpus-frequency order (rarest first), as required
/// by [`crate::registry::LabelRegistry::register`].
pub fn frequency_order(tags: &[String]) -> Vec<String> {
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    let mut first_seen: Vec<&str> = Vec::new();
    for tag in tags {
        let entry = counts.entry(tag.as_str()).or_insert(0);
        if *entry == 0 {
            first_seen.push(tag.as_str());
        }
        *entry += 1;
    }
    first_seen.sort_by(|a, b| counts[a].cmp(&counts[b]).then_with(|| a.cmp(b)));
    first_seen.into_iter().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_tagged_sentences_split_on_blank_lines() {
        let input = "the\tD\ncat\tN\nsat\tV\n\nit\tN\nran\tV\n";
        let corpus = read_tagged(Cursor::new(input)).unwrap();
        assert_eq!(corpus.lengths, vec![3, 2]);
        assert_eq!(corpus.sentence_words(0), &["the", "cat", "sat"]);
        assert_eq!(corpus.sentence_tags(1), &["N", "V"]);
    }

    #[test]
    fn reads_untagged_sentences() {
        let input = "a\ndog\nran\n\n";
        let corpus = read_untagged(Cursor::new(input)).unwrap();
        assert_eq!(corpus.lengths, vec![3]);
        assert_eq!(corpus.words, vec!["a", "dog", "ran"]);
    }

    #[test]
    fn malformed_tagged_line_is_rejected() {
        let input = "lonelyline\n";
        let err = read_tagged(Cursor::new(input)).unwrap_err();
        assert_eq!(err.kind(), TaggerErrorKind::InputFormat);
    }

    #[test]
    fn xml_lines_pass_tags_through_and_unescape_tokens() {
        let input = "<s>\nJack&amp;Jill\n</s>\n";
        let lines = read_xml_lines(Cursor::new(input)).unwrap();
        assert_eq!(
            lines,
            vec![
                XmlLine::Tag("<s>".to_string()),
                XmlLine::Token("Jack&Jill".to_string()),
                XmlLine::Tag("</s>".to_string()),
            ]
        );
    }

    #[test]
    fn merge_xml_tags_reinterleaves_tags_and_tagged_tokens() {
        let lines = vec![
            XmlLine::Tag("<s>".to_string()),
            XmlLine::Token("a".to_string()),
            XmlLine::Token("b".to_string()),
            XmlLine::Tag("</s>".to_string()),
            XmlLine::Tag("<s>".to_string()),
            XmlLine::Token("c".to_string()),
            XmlLine::Tag("</s>".to_string()),
        ];
        let tags_per_sentence = vec![
            vec!["D".to_string(), "N".to_string()],
            vec!["V".to_string()],
        ];
        let merged = merge_xml_tags(&lines, &tags_per_sentence);
        assert_eq!(
            merged,
            vec![
                TaggedXmlLine::Tag("<s>".to_string()),
                TaggedXmlLine::Token { word: "a".to_string(), tag: "D".to_string() },
                TaggedXmlLine::Token { word: "b".to_string(), tag: "N".to_string() },
                TaggedXmlLine::Tag("</s>".to_string()),
                TaggedXmlLine::Tag("<s>".to_string()),
                TaggedXmlLine::Token { word: "c".to_string(), tag: "V".to_string() },
                TaggedXmlLine::Tag("</s>".to_string()),
            ]
        );
    }

    #[test]
    fn xml_sentences_groups_tokens_between_tags() {
        let lines = vec![
            XmlLine::Tag("<s>".to_string()),
            XmlLine::Token("a".to_string()),
            XmlLine::Token("b".to_string()),
            XmlLine::Tag("</s>".to_string()),
            XmlLine::Tag("<s>".to_string()),
            XmlLine::Token("c".to_string()),
            XmlLine::Tag("</s>".to_string()),
        ];
        let sentences = xml_sentences(&lines);
        assert_eq!(sentences, vec![vec!["a".to_string(), "b".to_string()], vec!["c".to_string()]]);
    }

    #[test]
    fn frequency_order_is_ascending_and_stable_on_ties() {
        let tags = vec!["V", "N", "V", "N", "V", "D"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        assert_eq!(frequency_order(&tags), vec!["D", "N", "V"]);
    }
}
