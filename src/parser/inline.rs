//! Inline Markdown parsing: emphasis, code spans, links and numeric
//! character references.
//!
//! Emphasis uses a delimiter-run pass modelled on CommonMark: `*` runs are
//! classified as left/right flanking, then closers are matched against the
//! nearest compatible opener. Unmatched markers stay literal text, so
//! parsing never fails.

use crate::model::{coalesce_runs, sanitize_text, TextRun, TextStyle};

/// Parse inline Markdown into styled runs.
pub fn parse_inline(text: &str) -> Vec<TextRun> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = tokenize(&chars, None);
    process_emphasis(&mut tokens);
    let runs = tokens
        .into_iter()
        .map(|t| match t {
            Token::Text { text, style, link } => TextRun {
                text: sanitize_text(&text),
                style,
                link,
            },
            Token::Delim { count, style, .. } => TextRun::styled("*".repeat(count), style),
        })
        .collect();
    coalesce_runs(runs)
}

#[derive(Debug)]
enum Token {
    Text {
        text: String,
        style: TextStyle,
        link: Option<String>,
    },
    Delim {
        count: usize,
        orig: usize,
        can_open: bool,
        can_close: bool,
        style: TextStyle,
    },
}

impl Token {
    fn style_mut(&mut self) -> &mut TextStyle {
        match self {
            Token::Text { style, .. } | Token::Delim { style, .. } => style,
        }
    }
}

fn tokenize(chars: &[char], link: Option<&str>) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut pending = String::new();
    let mut i = 0;

    let flush = |pending: &mut String, tokens: &mut Vec<Token>| {
        if !pending.is_empty() {
            tokens.push(Token::Text {
                text: std::mem::take(pending),
                style: TextStyle::PLAIN,
                link: link.map(str::to_string),
            });
        }
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' if chars.get(i + 1).is_some_and(|n| n.is_ascii_punctuation()) => {
                pending.push(chars[i + 1]);
                i += 2;
            }
            '`' => {
                let open = run_length(chars, i, '`');
                match find_code_close(chars, i + open, open) {
                    Some(close) => {
                        flush(&mut pending, &mut tokens);
                        let content: String = chars[i + open..close].iter().collect();
                        tokens.push(Token::Text {
                            text: strip_code_padding(&content),
                            style: TextStyle::CODE,
                            link: link.map(str::to_string),
                        });
                        i = close + open;
                    }
                    None => {
                        pending.extend(std::iter::repeat('`').take(open));
                        i += open;
                    }
                }
            }
            '*' => {
                flush(&mut pending, &mut tokens);
                let count = run_length(chars, i, '*');
                let before = if i == 0 { ' ' } else { chars[i - 1] };
                let after = chars.get(i + count).copied().unwrap_or(' ');
                let (left, right) = flanking(before, after);
                tokens.push(Token::Delim {
                    count,
                    orig: count,
                    can_open: left,
                    can_close: right,
                    style: TextStyle::PLAIN,
                });
                i += count;
            }
            '&' => match char_reference(chars, i) {
                Some((decoded, len)) => {
                    pending.push(decoded);
                    i += len;
                }
                None => {
                    pending.push(c);
                    i += 1;
                }
            },
            // Runs cannot hold images; keep the alt text.
            '!' if link.is_none() && chars.get(i + 1) == Some(&'[') => match find_link(chars, i + 1) {
                Some(found) => {
                    pending.extend(&chars[i + 2..found.label_end]);
                    i = found.next;
                }
                None => {
                    pending.push(c);
                    i += 1;
                }
            },
            '[' if link.is_none() => match find_link(chars, i) {
                Some(found) => {
                    flush(&mut pending, &mut tokens);
                    let mut inner = tokenize(&chars[i + 1..found.label_end], Some(&found.target));
                    process_emphasis(&mut inner);
                    tokens.extend(inner);
                    i = found.next;
                }
                None => {
                    pending.push(c);
                    i += 1;
                }
            },
            _ => {
                pending.push(c);
                i += 1;
            }
        }
    }
    flush(&mut pending, &mut tokens);
    tokens
}

/// Decode `&#NNN;` or `&#xHHH;` at `start`; returns the character and the
/// length of the reference.
fn char_reference(chars: &[char], start: usize) -> Option<(char, usize)> {
    if chars.get(start + 1) != Some(&'#') {
        return None;
    }
    let hex = matches!(chars.get(start + 2), Some('x' | 'X'));
    let digits_start = start + if hex { 3 } else { 2 };
    let radix = if hex { 16 } else { 10 };
    let max_digits = if hex { 6 } else { 7 };

    let digits = chars[digits_start.min(chars.len())..]
        .iter()
        .take_while(|c| c.is_digit(radix))
        .count();
    if digits == 0 || digits > max_digits || chars.get(digits_start + digits) != Some(&';') {
        return None;
    }
    let text: String = chars[digits_start..digits_start + digits].iter().collect();
    let decoded = u32::from_str_radix(&text, radix)
        .ok()
        .filter(|&code| code != 0)
        .and_then(char::from_u32)
        .unwrap_or(char::REPLACEMENT_CHARACTER);
    Some((decoded, digits_start + digits + 1 - start))
}

fn run_length(chars: &[char], start: usize, ch: char) -> usize {
    chars[start..].iter().take_while(|&&c| c == ch).count()
}

fn is_space(c: char) -> bool {
    c.is_whitespace()
}

fn is_punct(c: char) -> bool {
    c.is_ascii_punctuation()
}

/// Left/right flanking classification of a delimiter run.
fn flanking(before: char, after: char) -> (bool, bool) {
    let left = !is_space(after) && (!is_punct(after) || is_space(before) || is_punct(before));
    let right = !is_space(before) && (!is_punct(before) || is_space(after) || is_punct(after));
    (left, right)
}

fn find_code_close(chars: &[char], from: usize, len: usize) -> Option<usize> {
    let mut j = from;
    while j < chars.len() {
        if chars[j] == '`' {
            let n = run_length(chars, j, '`');
            if n == len {
                return Some(j);
            }
            j += n;
        } else {
            j += 1;
        }
    }
    None
}

fn strip_code_padding(content: &str) -> String {
    let content = content.replace('\n', " ");
    if content.len() >= 2
        && content.starts_with(' ')
        && content.ends_with(' ')
        && !content.chars().all(|c| c == ' ')
    {
        content[1..content.len() - 1].to_string()
    } else {
        content
    }
}

struct LinkMatch {
    label_end: usize,
    target: String,
    next: usize,
}

/// Match `[label](target)` starting at an opening bracket.
fn find_link(chars: &[char], open: usize) -> Option<LinkMatch> {
    let mut depth = 0usize;
    let mut j = open;
    let label_end = loop {
        match chars.get(j)? {
            '\\' => j += 2,
            '`' => {
                let n = run_length(chars, j, '`');
                j = find_code_close(chars, j + n, n).map_or(j + n, |c| c + n);
            }
            '[' => {
                depth += 1;
                j += 1;
            }
            ']' => {
                depth -= 1;
                if depth == 0 {
                    break j;
                }
                j += 1;
            }
            _ => j += 1,
        }
    };

    if chars.get(label_end + 1) != Some(&'(') {
        return None;
    }
    let mut k = label_end + 2;
    let target: String;
    if chars.get(k) == Some(&'<') {
        let close = chars[k + 1..].iter().position(|&c| c == '>')? + k + 1;
        target = chars[k + 1..close].iter().collect();
        k = close + 1;
    } else {
        let mut parens = 0usize;
        let start = k;
        while let Some(&c) = chars.get(k) {
            match c {
                '(' => parens += 1,
                ')' if parens == 0 => break,
                ')' => parens -= 1,
                c if c.is_whitespace() => break,
                _ => {}
            }
            k += 1;
        }
        target = chars[start..k].iter().collect();
    }

    // Optional title, ignored
    while chars.get(k).is_some_and(|c| c.is_whitespace()) {
        k += 1;
    }
    if chars.get(k) == Some(&'"') {
        k += chars[k + 1..].iter().position(|&c| c == '"')? + 2;
        while chars.get(k).is_some_and(|c| c.is_whitespace()) {
            k += 1;
        }
    }
    if chars.get(k) != Some(&')') {
        return None;
    }

    Some(LinkMatch {
        label_end,
        target,
        next: k + 1,
    })
}

/// Match delimiter runs and apply bold/italic to the tokens they enclose.
fn process_emphasis(tokens: &mut [Token]) {
    for closer in 0..tokens.len() {
        loop {
            let (close_count, close_orig, close_both) = match tokens[closer] {
                Token::Delim {
                    count,
                    orig,
                    can_open,
                    can_close: true,
                    ..
                } if count > 0 => (count, orig, can_open),
                _ => break,
            };

            let opener = (0..closer).rev().find(|&o| match tokens[o] {
                Token::Delim {
                    count,
                    orig,
                    can_open: true,
                    can_close,
                    ..
                } if count > 0 => {
                    let both = close_both || can_close;
                    !(both && (orig + close_orig) % 3 == 0 && !(orig % 3 == 0 && close_orig % 3 == 0))
                }
                _ => false,
            });
            let Some(opener) = opener else { break };

            let open_count = match tokens[opener] {
                Token::Delim { count, .. } => count,
                _ => break,
            };
            let strong = open_count >= 2 && close_count >= 2;
            let used = if strong { 2 } else { 1 };

            for token in &mut tokens[opener + 1..closer] {
                let style = token.style_mut();
                if strong {
                    style.bold = true;
                } else {
                    style.italic = true;
                }
                // Delimiters enclosed by a match can no longer pair up.
                if let Token::Delim {
                    can_open,
                    can_close,
                    ..
                } = token
                {
                    *can_open = false;
                    *can_close = false;
                }
            }
            for index in [opener, closer] {
                if let Token::Delim { count, .. } = &mut tokens[index] {
                    *count -= used;
                }
            }
        }
    }
}
