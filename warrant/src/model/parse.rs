//! Line-based reader for the INI-like model configuration text.
//!
//! Recognizes `[section]` headers, `key = value` pairs, `#` comments and
//! trailing-backslash line continuations. Section semantics (which sections
//! are required, how values become assertions) live in the model itself.

use crate::error::ModelError;

/// One parsed section: its header name and the key/value pairs in file order.
#[derive(Debug, Clone)]
pub(crate) struct RawSection {
    pub name: String,
    pub entries: Vec<(String, String)>,
}

/// Parse the raw configuration text into sections.
///
/// Duplicate section headers are an error; keys outside any section are an
/// error; everything else is tolerated and validated later.
pub(crate) fn parse_sections(text: &str) -> Result<Vec<RawSection>, ModelError> {
    let mut sections: Vec<RawSection> = Vec::new();
    let mut pending: Option<(usize, String, String)> = None; // continuation state

    for (lineno, raw) in text.lines().enumerate() {
        let lineno = lineno + 1;
        let line = strip_comment(raw).trim().to_string();
        if line.is_empty() {
            continue;
        }

        // Continuation: the previous key/value line ended with '\'.
        if let Some((start, key, mut value)) = pending.take() {
            if let Some(prefix) = line.strip_suffix('\\') {
                value.push_str(prefix.trim());
                pending = Some((start, key, value));
            } else {
                value.push_str(&line);
                push_entry(&mut sections, start, key, value)?;
            }
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let name = name.trim().to_string();
            if sections.iter().any(|s| s.name == name) {
                return Err(ModelError::DuplicateSection(name));
            }
            sections.push(RawSection {
                name,
                entries: Vec::new(),
            });
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(ModelError::MalformedLine {
                line: lineno,
                text: raw.trim().to_string(),
            });
        };
        let key = key.trim().to_string();
        let value = value.trim().to_string();
        if let Some(prefix) = value.strip_suffix('\\') {
            pending = Some((lineno, key, prefix.trim().to_string()));
        } else {
            push_entry(&mut sections, lineno, key, value)?;
        }
    }

    if let Some((lineno, _, value)) = pending {
        return Err(ModelError::MalformedLine {
            line: lineno,
            text: value,
        });
    }

    Ok(sections)
}

fn push_entry(
    sections: &mut [RawSection],
    lineno: usize,
    key: String,
    value: String,
) -> Result<(), ModelError> {
    match sections.last_mut() {
        Some(section) => {
            section.entries.push((key, value));
            Ok(())
        }
        None => Err(ModelError::MalformedLine {
            line: lineno,
            text: format!("{} = {}", key, value),
        }),
    }
}

/// Strip a `#` comment, leaving `#` inside string literals alone.
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    for (i, c) in line.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                '#' => return &line[..i],
                _ => {}
            },
        }
    }
    line
}
