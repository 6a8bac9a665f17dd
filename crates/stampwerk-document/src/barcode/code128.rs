// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Code 128 symbology: text to module pattern and back.
//
// Only code sets B (printable ASCII) and C (digit pairs) are produced. The
// encoder starts in C when the text opens with four or more digits and
// switches to C for digit runs of six or more (four or more at the end of
// the text), which keeps date and sequence segments short.

use stampwerk_core::error::{Result, StampwerkError};

/// Bar/space widths (in modules) for symbol values 0..=105.
const PATTERNS: [[u8; 6]; 106] = [
    [2, 1, 2, 2, 2, 2], [2, 2, 2, 1, 2, 2], [2, 2, 2, 2, 2, 1], [1, 2, 1, 2, 2, 3],
    [1, 2, 1, 3, 2, 2], [1, 3, 1, 2, 2, 2], [1, 2, 2, 2, 1, 3], [1, 2, 2, 3, 1, 2],
    [1, 3, 2, 2, 1, 2], [2, 2, 1, 2, 1, 3], [2, 2, 1, 3, 1, 2], [2, 3, 1, 2, 1, 2],
    [1, 1, 2, 2, 3, 2], [1, 2, 2, 1, 3, 2], [1, 2, 2, 2, 3, 1], [1, 1, 3, 2, 2, 2],
    [1, 2, 3, 1, 2, 2], [1, 2, 3, 2, 2, 1], [2, 2, 3, 2, 1, 1], [2, 2, 1, 1, 3, 2],
    [2, 2, 1, 2, 3, 1], [2, 1, 3, 2, 1, 2], [2, 2, 3, 1, 1, 2], [3, 1, 2, 1, 3, 1],
    [3, 1, 1, 2, 2, 2], [3, 2, 1, 1, 2, 2], [3, 2, 1, 2, 2, 1], [3, 1, 2, 2, 1, 2],
    [3, 2, 2, 1, 1, 2], [3, 2, 2, 2, 1, 1], [2, 1, 2, 1, 2, 3], [2, 1, 2, 3, 2, 1],
    [2, 3, 2, 1, 2, 1], [1, 1, 1, 3, 2, 3], [1, 3, 1, 1, 2, 3], [1, 3, 1, 3, 2, 1],
    [1, 1, 2, 3, 1, 3], [1, 3, 2, 1, 1, 3], [1, 3, 2, 3, 1, 1], [2, 1, 1, 3, 1, 3],
    [2, 3, 1, 1, 1, 3], [2, 3, 1, 3, 1, 1], [1, 1, 2, 1, 3, 3], [1, 1, 2, 3, 3, 1],
    [1, 3, 2, 1, 3, 1], [1, 1, 3, 1, 2, 3], [1, 1, 3, 3, 2, 1], [1, 3, 3, 1, 2, 1],
    [3, 1, 3, 1, 2, 1], [2, 1, 1, 3, 3, 1], [2, 3, 1, 1, 3, 1], [2, 1, 3, 1, 1, 3],
    [2, 1, 3, 3, 1, 1], [2, 1, 3, 1, 3, 1], [3, 1, 1, 1, 2, 3], [3, 1, 1, 3, 2, 1],
    [3, 3, 1, 1, 2, 1], [3, 1, 2, 1, 1, 3], [3, 1, 2, 3, 1, 1], [3, 3, 2, 1, 1, 1],
    [3, 1, 4, 1, 1, 1], [2, 2, 1, 4, 1, 1], [4, 3, 1, 1, 1, 1], [1, 1, 1, 2, 2, 4],
    [1, 1, 1, 4, 2, 2], [1, 2, 1, 1, 2, 4], [1, 2, 1, 4, 2, 1], [1, 4, 1, 1, 2, 2],
    [1, 4, 1, 2, 2, 1], [1, 1, 2, 2, 1, 4], [1, 1, 2, 4, 1, 2], [1, 2, 2, 1, 1, 4],
    [1, 2, 2, 4, 1, 1], [1, 4, 2, 1, 1, 2], [1, 4, 2, 2, 1, 1], [2, 4, 1, 2, 1, 1],
    [2, 2, 1, 1, 1, 4], [4, 1, 3, 1, 1, 1], [2, 4, 1, 1, 1, 2], [1, 3, 4, 1, 1, 1],
    [1, 1, 1, 2, 4, 2], [1, 2, 1, 1, 4, 2], [1, 2, 1, 2, 4, 1], [1, 1, 4, 2, 1, 2],
    [1, 2, 4, 1, 1, 2], [1, 2, 4, 2, 1, 1], [4, 1, 1, 2, 1, 2], [4, 2, 1, 1, 1, 2],
    [4, 2, 1, 2, 1, 1], [2, 1, 2, 1, 4, 1], [2, 1, 4, 1, 2, 1], [4, 1, 2, 1, 2, 1],
    [1, 1, 1, 1, 4, 3], [1, 1, 1, 3, 4, 1], [1, 3, 1, 1, 4, 1], [1, 1, 4, 1, 1, 3],
    [1, 1, 4, 3, 1, 1], [4, 1, 1, 1, 1, 3], [4, 1, 1, 3, 1, 1], [1, 1, 3, 1, 4, 1],
    [1, 1, 4, 1, 3, 1], [3, 1, 1, 1, 4, 1], [4, 1, 1, 1, 3, 1], [2, 1, 1, 4, 1, 2],
    [2, 1, 1, 2, 1, 4], [2, 1, 1, 2, 3, 2],
];

const STOP: [u8; 7] = [2, 3, 3, 1, 1, 1, 2];

const CODE_C: u8 = 99;
const CODE_B: u8 = 100;
const START_A: u8 = 103;
const START_B: u8 = 104;
const START_C: u8 = 105;

/// Width of one symbol character in modules.
pub const SYMBOL_MODULES: usize = 11;
/// Width of the stop pattern (including the termination bar) in modules.
pub const STOP_MODULES: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodeSet {
    B,
    C,
}

/// Number of consecutive ASCII digits starting at `from`.
fn digit_run(bytes: &[u8], from: usize) -> usize {
    bytes[from..].iter().take_while(|b| b.is_ascii_digit()).count()
}

/// Reject anything code set B cannot carry.
fn check_charset(text: &str) -> Result<()> {
    if text.is_empty() {
        return Err(StampwerkError::Encoding("cannot encode empty text".into()));
    }
    for (position, ch) in text.chars().enumerate() {
        if !(' '..='~').contains(&ch) {
            return Err(StampwerkError::Encoding(format!(
                "character {ch:?} at position {position} is not supported by Code 128"
            )));
        }
    }
    Ok(())
}

/// Symbol values for `text`: start code, data, and checksum (no stop).
pub fn symbol_values(text: &str) -> Result<Vec<u8>> {
    check_charset(text)?;
    let bytes = text.as_bytes();

    let mut values = Vec::with_capacity(bytes.len() + 4);
    let mut set = if digit_run(bytes, 0) >= 4 {
        values.push(START_C);
        CodeSet::C
    } else {
        values.push(START_B);
        CodeSet::B
    };

    let mut i = 0;
    while i < bytes.len() {
        match set {
            CodeSet::C => {
                if digit_run(bytes, i) >= 2 {
                    values.push((bytes[i] - b'0') * 10 + (bytes[i + 1] - b'0'));
                    i += 2;
                } else {
                    values.push(CODE_B);
                    set = CodeSet::B;
                }
            }
            CodeSet::B => {
                let run = digit_run(bytes, i);
                if run >= 4 && (run >= 6 || i + run == bytes.len()) {
                    if run % 2 == 1 {
                        values.push(bytes[i] - b' ');
                        i += 1;
                    }
                    values.push(CODE_C);
                    set = CodeSet::C;
                } else {
                    values.push(bytes[i] - b' ');
                    i += 1;
                }
            }
        }
    }

    values.push(checksum(&values));
    Ok(values)
}

/// Modulo-103 weighted checksum over start code and data values.
fn checksum(values: &[u8]) -> u8 {
    let sum: u32 = values
        .iter()
        .enumerate()
        .map(|(i, &v)| u32::from(v) * (i.max(1) as u32))
        .sum();
    (sum % 103) as u8
}

/// Bar/space run widths for the full symbol, starting with a bar.
pub fn encode_widths(text: &str) -> Result<Vec<u8>> {
    let values = symbol_values(text)?;
    let mut widths = Vec::with_capacity(values.len() * 6 + STOP.len());
    for v in values {
        widths.extend_from_slice(&PATTERNS[usize::from(v)]);
    }
    widths.extend_from_slice(&STOP);
    Ok(widths)
}

/// Module sequence for the full symbol; `true` is a bar.
pub fn encode_modules(text: &str) -> Result<Vec<bool>> {
    let widths = encode_widths(text)?;
    let mut modules = Vec::with_capacity(widths.iter().map(|&w| usize::from(w)).sum());
    for (i, &w) in widths.iter().enumerate() {
        let bar = i % 2 == 0;
        modules.extend(std::iter::repeat_n(bar, usize::from(w)));
    }
    Ok(modules)
}

/// Decode bar/space widths (in modules, starting with a bar) back to text.
pub fn decode_widths(widths: &[u8]) -> Result<String> {
    let fail = |reason: &str| StampwerkError::Encoding(format!("cannot decode Code 128: {reason}"));

    if widths.len() < 6 * 3 + STOP.len() || (widths.len() - STOP.len()) % 6 != 0 {
        return Err(fail("unexpected number of bars"));
    }
    let (body, stop) = widths.split_at(widths.len() - STOP.len());
    if stop != STOP {
        return Err(fail("missing stop pattern"));
    }

    let mut values = Vec::with_capacity(body.len() / 6);
    for chunk in body.chunks_exact(6) {
        let value = PATTERNS
            .iter()
            .position(|p| p[..] == chunk[..])
            .ok_or_else(|| fail("unknown symbol pattern"))?;
        values.push(value as u8);
    }

    let (check, data) = values.split_last().ok_or_else(|| fail("empty symbol"))?;
    if checksum(data) != *check {
        return Err(fail("checksum mismatch"));
    }

    let mut set = match data[0] {
        START_B => CodeSet::B,
        START_C => CodeSet::C,
        START_A => return Err(fail("code set A is not supported")),
        _ => return Err(fail("missing start code")),
    };

    let mut text = String::with_capacity(data.len() * 2);
    for &v in &data[1..] {
        match (set, v) {
            (CodeSet::B, 0..=94) => text.push(char::from(v + b' ')),
            (CodeSet::B, CODE_C) => set = CodeSet::C,
            (CodeSet::C, 0..=99) => {
                text.push(char::from(b'0' + v / 10));
                text.push(char::from(b'0' + v % 10));
            }
            (CodeSet::C, CODE_B) => set = CodeSet::B,
            _ => return Err(fail("unsupported function or shift code")),
        }
    }
    Ok(text)
}

/// Decode one scanned row of pixels (`true` = dark) back to text.
///
/// The module width is measured from the start character, which is always
/// eleven modules wide, so the row may be at any magnification.
pub fn decode_row(row: &[bool]) -> Result<String> {
    let first = row.iter().position(|&dark| dark);
    let last = row.iter().rposition(|&dark| dark);
    let (first, last) = match (first, last) {
        (Some(f), Some(l)) => (f, l),
        _ => return Err(StampwerkError::Encoding("no bars found in scan row".into())),
    };

    let mut runs: Vec<usize> = Vec::new();
    let mut current = row[first];
    let mut len = 0usize;
    for &dark in &row[first..=last] {
        if dark == current {
            len += 1;
        } else {
            runs.push(len);
            current = dark;
            len = 1;
        }
    }
    runs.push(len);

    if runs.len() < 6 {
        return Err(StampwerkError::Encoding("too few bars in scan row".into()));
    }
    let module = runs[..6].iter().sum::<usize>() as f32 / SYMBOL_MODULES as f32;
    let widths: Vec<u8> = runs
        .iter()
        .map(|&r| (r as f32 / module).round().clamp(1.0, 4.0) as u8)
        .collect();
    decode_widths(&widths)
}
