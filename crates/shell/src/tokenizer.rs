// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Splits a configured test command into an argv, honouring quoting
//! without ever invoking an actual shell to do it.

use crate::ShellError;

/// Characters that are never permitted outside quotes: they all imply
/// a shell is being asked to do something (pipe, redirect, chain,
/// substitute) that this tokenizer deliberately can't express, since
/// the resulting argv is executed directly with no shell in between.
const DISALLOWED_BARE_CHARS: [char; 7] = [';', '|', '&', '<', '>', '`', '$'];

pub fn tokenize(command: &str) -> Result<Vec<String>, ShellError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = command.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            '\'' => {
                chars.next();
                in_token = true;
                loop {
                    match chars.next() {
                        Some((_, '\'')) => break,
                        Some((_, c)) => current.push(c),
                        None => return Err(ShellError::UnterminatedQuote { pos }),
                    }
                }
            }
            '"' => {
                chars.next();
                in_token = true;
                loop {
                    match chars.next() {
                        Some((_, '"')) => break,
                        Some((bspos, '\\')) => match chars.next() {
                            Some((_, c)) if matches!(c, '\\' | '"' | '$' | '`') => current.push(c),
                            Some((_, c)) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => return Err(ShellError::TrailingBackslash { pos: bspos }),
                        },
                        Some((_, c)) => current.push(c),
                        None => return Err(ShellError::UnterminatedQuote { pos }),
                    }
                }
            }
            '\\' => {
                chars.next();
                match chars.next() {
                    Some((_, c)) => {
                        current.push(c);
                        in_token = true;
                    }
                    None => return Err(ShellError::TrailingBackslash { pos }),
                }
            }
            c if DISALLOWED_BARE_CHARS.contains(&c) => {
                return Err(ShellError::DisallowedToken { token: c.to_string(), pos });
            }
            _ => {
                chars.next();
                current.push(ch);
                in_token = true;
            }
        }
    }

    if in_token {
        tokens.push(current);
    }

    Ok(tokens)
}
