//! Bounded-length thread segmentation
//!
//! Packs a summary into posts of at most `max_len` characters: sentences are
//! kept whole where possible, the title leads the thread and the link plus
//! tags close it. Lengths count Unicode scalar values.

/// Default per-post character limit
pub const DEFAULT_MAX_LEN: usize = 280;

/// Tag kept when the closing post has no room for the full tag list
pub const DEFAULT_FALLBACK_TAG: &str = "#AI";

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadSegmenter {
    max_len: usize,
    fallback_tag: String,
}

impl Default for ThreadSegmenter {
    fn default() -> Self {
        Self {
            max_len: DEFAULT_MAX_LEN,
            fallback_tag: DEFAULT_FALLBACK_TAG.to_string(),
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

impl ThreadSegmenter {
    /// Segmenter with limit `max_len` (clamped to at least 1)
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len: max_len.max(1),
            ..Self::default()
        }
    }

    pub fn with_fallback_tag(mut self, tag: impl Into<String>) -> Self {
        self.fallback_tag = tag.into();
        self
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Split `body` into a thread.
    ///
    /// The result is `[title-bearing segment(s)..., body segments..., closing]`
    /// with every element at most `max_len` characters.
    pub fn segment(&self, body: &str, title: &str, url: &str, tags: &[String]) -> Vec<String> {
        let mut segments = self.pack(&split_sentences(body));

        let title = title.trim();
        if !title.is_empty() {
            match segments.first_mut() {
                Some(first) if char_len(title) + 1 + char_len(first) <= self.max_len => {
                    *first = format!("{}\n{}", title, first);
                }
                _ => {
                    let mut lead = self.hard_wrap(title);
                    lead.append(&mut segments);
                    segments = lead;
                }
            }
        }

        segments.extend(self.closing(url, tags));
        segments
    }

    /// Greedy packing of sentences joined by single spaces
    fn pack(&self, sentences: &[String]) -> Vec<String> {
        let mut segments = Vec::new();
        let mut current = String::new();

        for sentence in sentences {
            let len = char_len(sentence);
            if len > self.max_len {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
                let mut pieces = self.hard_wrap(sentence);
                current = pieces.pop().unwrap_or_default();
                segments.extend(pieces);
                continue;
            }

            let separator = usize::from(!current.is_empty());
            if char_len(&current) + separator + len <= self.max_len {
                if separator == 1 {
                    current.push(' ');
                }
                current.push_str(sentence);
            } else {
                segments.push(std::mem::replace(&mut current, sentence.clone()));
            }
        }

        if !current.is_empty() {
            segments.push(current);
        }
        segments
    }

    /// Link and tags, shrinking the tags and finally wrapping to fit
    fn closing(&self, url: &str, tags: &[String]) -> Vec<String> {
        let closing = format!("{}\n{}", url.trim(), tags.join(" ")).trim().to_string();
        if closing.is_empty() {
            return Vec::new();
        }
        if char_len(&closing) <= self.max_len {
            return vec![closing];
        }

        let reduced = if tags.iter().any(|t| t == &self.fallback_tag) {
            format!("{}\n{}", url.trim(), self.fallback_tag).trim().to_string()
        } else {
            url.trim().to_string()
        };
        if char_len(&reduced) <= self.max_len {
            return vec![reduced];
        }
        self.hard_wrap(&reduced)
    }

    /// Wrap at word boundaries, splitting single words longer than the limit
    fn hard_wrap(&self, text: &str) -> Vec<String> {
        let mut lines = Vec::new();
        let mut line = String::new();

        for word in text.split_whitespace() {
            let len = char_len(word);
            if len > self.max_len {
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
                let chars: Vec<char> = word.chars().collect();
                let mut pieces: Vec<String> = chars
                    .chunks(self.max_len)
                    .map(|c| c.iter().collect())
                    .collect();
                line = pieces.pop().unwrap_or_default();
                lines.extend(pieces);
                continue;
            }

            let separator = usize::from(!line.is_empty());
            if char_len(&line) + separator + len <= self.max_len {
                if separator == 1 {
                    line.push(' ');
                }
                line.push_str(word);
            } else {
                lines.push(std::mem::replace(&mut line, word.to_string()));
            }
        }

        if !line.is_empty() {
            lines.push(line);
        }
        lines
    }
}

/// Split text into sentences at `.`, `!` or `?` followed by whitespace.
///
/// The whitespace after a sentence is consumed; empty sentences are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let at_boundary = matches!(c, '.' | '!' | '?')
            && chars.peek().is_some_and(|next| next.is_whitespace());
        if at_boundary {
            while chars.peek().is_some_and(|next| next.is_whitespace()) {
                chars.next();
            }
            push_trimmed(&mut sentences, &current);
            current.clear();
        }
    }
    push_trimmed(&mut sentences, &current);
    sentences
}

fn push_trimmed(sentences: &mut Vec<String>, sentence: &str) {
    let sentence = sentence.trim();
    if !sentence.is_empty() {
        sentences.push(sentence.to_string());
    }
}

/// Tags for the closing post: `default_tags`, then up to `extra` of the
/// article's own hashtags, skipping anything without a leading `#` and
/// anything already present.
pub fn tag_block(default_tags: &[String], hashtags: &[String], extra: usize) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in default_tags {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }

    let mut added = 0;
    for tag in hashtags {
        if added == extra {
            break;
        }
        if tag.starts_with('#') && !tags.contains(tag) {
            tags.push(tag.clone());
            added += 1;
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn empty_body_gives_title_and_closing() {
        let segmenter = ThreadSegmenter::default();
        assert_eq!(
            segmenter.segment("", "T", "http://x", &tags(&["#AI"])),
            vec!["T", "http://x\n#AI"]
        );
    }

    #[test]
    fn splits_on_terminal_punctuation_followed_by_space() {
        assert_eq!(
            split_sentences("One. Two!  Three?\nFour v1.5 is out"),
            vec!["One.", "Two!", "Three?", "Four v1.5 is out"]
        );
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn title_joins_first_segment_when_it_fits() {
        let segmenter = ThreadSegmenter::new(40);
        let thread = segmenter.segment("Short body. Second line.", "Title", "u", &[]);
        assert_eq!(thread, vec!["Title\nShort body. Second line.", "u"]);
    }

    #[test]
    fn title_gets_own_segment_when_first_is_full() {
        let segmenter = ThreadSegmenter::new(20);
        let thread = segmenter.segment("Exactly twenty chars", "Title", "u", &[]);
        assert_eq!(thread, vec!["Title", "Exactly twenty chars", "u"]);
    }

    #[test]
    fn segments_respect_limit_and_rejoin_to_sentences() {
        let body = "Large language models keep growing. \
                    This paper studies sparse routing at scale! \
                    Does it help? Results show a 2x speedup on common benchmarks. \
                    Code is released.";
        for limit in [40, 60, 80, 280] {
            let segmenter = ThreadSegmenter::new(limit);
            let thread = segmenter.segment(body, "", "", &[]);
            assert!(thread.iter().all(|s| s.chars().count() <= limit), "limit {}", limit);
            assert_eq!(thread.join(" "), split_sentences(body).join(" "));
        }
    }

    #[test]
    fn oversized_sentence_is_wrapped_at_words() {
        let segmenter = ThreadSegmenter::new(10);
        let thread = segmenter.segment("alpha beta gamma delta.", "", "", &[]);
        assert_eq!(thread, vec!["alpha beta", "gamma", "delta."]);
    }

    #[test]
    fn oversized_word_is_split_by_characters() {
        let segmenter = ThreadSegmenter::new(4);
        let thread = segmenter.segment("abcdefghij", "", "", &[]);
        assert_eq!(thread, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let segmenter = ThreadSegmenter::new(5);
        let thread = segmenter.segment("ééééé", "", "", &[]);
        assert_eq!(thread, vec!["ééééé"]);
    }

    #[test]
    fn closing_drops_to_fallback_tag() {
        let segmenter = ThreadSegmenter::new(20);
        let thread = segmenter.segment(
            "",
            "",
            "http://x.io",
            &tags(&["#AI", "#MachineLearning", "#NLP"]),
        );
        assert_eq!(thread, vec!["http://x.io\n#AI"]);
    }

    #[test]
    fn closing_drops_all_tags_without_fallback() {
        let segmenter = ThreadSegmenter::new(20);
        let thread = segmenter.segment("", "", "http://x.io", &tags(&["#MachineLearning"]));
        assert_eq!(thread, vec!["http://x.io"]);
    }

    #[test]
    fn oversized_url_is_wrapped() {
        let segmenter = ThreadSegmenter::new(8);
        let thread = segmenter.segment("", "", "http://abcdefgh", &[]);
        assert_eq!(thread, vec!["http://a", "bcdefgh"]);
    }

    #[test]
    fn segmentation_is_deterministic() {
        let segmenter = ThreadSegmenter::new(30);
        let body = "First sentence here. Second one follows. And a third.";
        let a = segmenter.segment(body, "Title", "http://x", &tags(&["#AI"]));
        let b = segmenter.segment(body, "Title", "http://x", &tags(&["#AI"]));
        assert_eq!(a, b);
    }

    #[test]
    fn tag_block_appends_unique_hashtags() {
        let block = tag_block(
            &tags(&["#AI"]),
            &tags(&["#AI", "LLM", "#NLP", "#Vision", "#Robotics"]),
            2,
        );
        assert_eq!(block, vec!["#AI", "#NLP", "#Vision"]);
        assert_eq!(tag_block(&tags(&["#AI"]), &tags(&["#NLP"]), 0), vec!["#AI"]);
    }
}
