//! Single-pass cleanup of a failed driving response
//!
//! Strips emoji, drops clauses carrying disallowed terms and truncates to
//! the last whole sentence that fits. Questions are left alone; a response
//! that still asks something falls through to the fallback phrase.

use super::check::{emoticon_ends_here, is_closing, is_emoji, is_terminator};
use super::ResponseValidator;

/// Produce the candidate to re-check; may be empty
pub(crate) fn sanitize(text: &str, validator: &ResponseValidator) -> String {
    let stripped = strip_emoji(text, validator);

    let sentences: Vec<String> = split_sentences(&stripped)
        .into_iter()
        .filter_map(|sentence| clean_sentence(sentence, validator))
        .collect();

    truncate_to_sentences(&sentences, validator.policy().max_len)
}

fn strip_emoji(text: &str, validator: &ResponseValidator) -> String {
    let policy = validator.policy();
    let mut out: String = text
        .chars()
        .filter(|&c| !is_emoji(c, &policy.emoji_ranges))
        .collect();
    for emoticon in policy.emoticons.iter().filter(|e| !e.is_empty()) {
        out = remove_emoticon(&out, emoticon);
    }
    out
}

fn remove_emoticon(text: &str, emoticon: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find(emoticon) {
        out.push_str(&rest[..idx]);
        let after = &rest[idx + emoticon.len()..];
        if !emoticon_ends_here(after) {
            out.push_str(emoticon);
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

/// Split after `.`, `!` or `?` runs that are followed by whitespace or the end
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !is_terminator(c) {
            continue;
        }
        while let Some(&(_, next)) = chars.peek() {
            if is_terminator(next) || is_closing(next) {
                chars.next();
            } else {
                break;
            }
        }
        let end = chars.peek().map(|&(idx, _)| idx).unwrap_or(text.len());
        let at_boundary = chars.peek().map_or(true, |&(_, next)| next.is_whitespace());
        if at_boundary {
            sentences.push(text[start..end].trim());
            start = end;
        }
    }

    sentences.push(text[start..].trim());
    sentences.retain(|s| !s.is_empty());
    sentences
}

/// Drop offending clauses; `None` when nothing of the sentence survives
fn clean_sentence(sentence: &str, validator: &ResponseValidator) -> Option<String> {
    let body = sentence.trim_end_matches(|c: char| is_terminator(c) || is_closing(c));
    let ending = &sentence[body.len()..];

    let kept: Vec<&str> = body
        .split_inclusive([',', ';'])
        .filter(|clause| !validator.has_disallowed_term(&clause.to_lowercase()))
        .collect();

    let joined = kept.concat();
    let mut cleaned = normalize_whitespace(&joined);
    let trimmed_len = cleaned
        .trim_end_matches(|c: char| matches!(c, ',' | ';' | ':') || c.is_whitespace())
        .len();
    cleaned.truncate(trimmed_len);

    if cleaned.is_empty() {
        return None;
    }

    let mut sentence = capitalize(&cleaned);
    sentence.push_str(ending);
    Some(sentence)
}

fn normalize_whitespace(text: &str) -> String {
    let mut out = text.split_whitespace().collect::<Vec<_>>().join(" ");
    for punct in [" ,", " ;", " ."] {
        while out.contains(punct) {
            out = out.replace(punct, &punct[1..]);
        }
    }
    out
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Keep whole sentences from the front while they fit in `max_len` chars
fn truncate_to_sentences(sentences: &[String], max_len: usize) -> String {
    let full = sentences.join(" ");
    if full.chars().count() <= max_len {
        return full;
    }

    let mut out = String::new();
    let mut len = 0;
    for sentence in sentences {
        let complete = sentence
            .trim_end_matches(is_closing)
            .ends_with(is_terminator);
        let sentence_len = sentence.chars().count();
        let separator = usize::from(!out.is_empty());
        if !complete || len + separator + sentence_len > max_len {
            break;
        }
        if separator == 1 {
            out.push(' ');
        }
        out.push_str(sentence);
        len += separator + sentence_len;
    }
    out
}
