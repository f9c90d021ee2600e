//! Split knowledge documents into overlapping passages.
//!
//! Token counts are approximated at four characters per token. Paragraphs
//! (separated by a blank line) are packed greedily into passages of at most
//! `max_tokens`; a paragraph that is too long on its own is broken at word
//! boundaries. Each new passage starts with the last `overlap_tokens` worth
//! of the previous one, so a sentence near a boundary is retrievable from
//! either side.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::Passage;

const CHARS_PER_TOKEN: usize = 4;

/// Returns passages with contiguous indices from 0. Blank text yields none.
pub fn split_passages(source_path: &str, text: &str, settings: &ChunkingConfig) -> Vec<Passage> {
    let max_chars = settings.max_tokens.max(1) * CHARS_PER_TOKEN;
    let overlap_chars = settings.overlap_tokens * CHARS_PER_TOKEN;

    let mut units: Vec<String> = Vec::new();
    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if para.len() <= max_chars {
            units.push(para.to_string());
        } else {
            units.extend(split_long_paragraph(para, max_chars));
        }
    }

    let mut bodies: Vec<String> = Vec::new();
    let mut buf = String::new();

    for unit in units {
        if !buf.is_empty() && buf.len() + 2 + unit.len() > max_chars {
            let carried = overlap_tail(&buf, overlap_chars).to_string();
            bodies.push(std::mem::take(&mut buf));
            if !carried.is_empty() && carried.len() + 2 + unit.len() <= max_chars {
                buf = carried;
            }
        }
        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(&unit);
    }
    if !buf.is_empty() {
        bodies.push(buf);
    }

    bodies
        .into_iter()
        .enumerate()
        .map(|(i, body)| Passage {
            id: Uuid::new_v4().to_string(),
            source_path: source_path.to_string(),
            passage_index: i as i64,
            hash: content_hash(&body),
            text: body,
        })
        .collect()
}

/// Hex SHA-256 of `text`.
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

fn split_long_paragraph(para: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for word in para.split_whitespace() {
        if word.len() > max_chars {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = word.chars().collect();
            pieces.extend(chars.chunks(max_chars).map(|c| c.iter().collect::<String>()));
            continue;
        }
        if !current.is_empty() && current.len() + 1 + word.len() > max_chars {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// The last `max_chars` of `text`, advanced to the next word start.
fn overlap_tail(text: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return "";
    }
    if text.len() <= max_chars {
        return text;
    }
    let mut start = text.len() - max_chars;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    let tail = &text[start..];
    match tail.find(char::is_whitespace) {
        Some(ws) => tail[ws..].trim_start(),
        None => tail,
    }
}
