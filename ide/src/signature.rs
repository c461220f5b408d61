//! Signature help for the call surrounding the cursor.
//!
//! The checker has no signature command, so this finds the callee name on the
//! cursor line, asks for completions right after it (with the argument text
//! cut out of the buffer) and reads the parameters off the matching function.

use flowide_checker::CancellationToken;
use flowide_types::{
    AutocompleteEntry, ParameterInformation, Position, Range, SignatureHelp, SignatureInformation,
};

use crate::text::Document;
use crate::{FlowIde, settle};

/// The unmatched `(` left of the cursor and the top-level commas between it
/// and the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenCall {
    open_paren: Position,
    commas: u32,
}

fn enclosing_call(doc: &Document<'_>, position: Position) -> Option<OpenCall> {
    let line: Vec<char> = doc.line(position.line)?.chars().collect();
    let end = (position.character as usize).min(line.len());

    let mut depth = 0u32;
    let mut commas = 0;
    for (index, c) in line[..end].iter().enumerate().rev() {
        match c {
            '(' if depth == 0 => {
                return Some(OpenCall {
                    open_paren: Position::new(position.line, index as u32),
                    commas,
                });
            }
            '(' => depth -= 1,
            ')' => depth += 1,
            ',' if depth == 0 => commas += 1,
            _ => {}
        }
    }
    None
}

/// Nearest word ending at or before `position` on the same line.
fn previous_word(doc: &Document<'_>, position: Position) -> Option<Range> {
    let mut column = position.character;
    while column > 0 {
        if let Some(range) = doc.word_range_at(Position::new(position.line, column)) {
            return Some(range);
        }
        column -= 1;
    }
    None
}

pub(crate) fn to_signature_help(name: &str, entry: &AutocompleteEntry, commas: u32) -> SignatureHelp {
    let params = entry
        .func_details
        .as_ref()
        .map_or(&[][..], |details| details.params.as_slice());
    let parameters = params
        .iter()
        .map(|param| ParameterInformation {
            label: format!("{}:{}", param.name, param.type_),
        })
        .collect::<Vec<_>>();
    let active_parameter = (parameters.len() as u32)
        .checked_sub(1)
        .map(|last| commas.min(last));

    SignatureHelp {
        signatures: vec![SignatureInformation {
            label: format!("{name}{}", entry.type_),
            parameters,
        }],
        active_signature: 0,
        active_parameter,
    }
}

impl FlowIde {
    /// Parameters of the function being called at `position`.
    pub async fn signature_help(
        &self,
        doc: Document<'_>,
        position: Position,
        cancel: Option<CancellationToken>,
    ) -> Option<SignatureHelp> {
        if !doc.path.is_absolute() {
            return None;
        }
        let call = enclosing_call(&doc, position)?;
        let callee = previous_word(&doc, call.open_paren)?;
        let name = doc.slice(callee);

        let cut_start = doc.offset_at(callee.end);
        let cut_end = doc.offset_at(position).max(cut_start);
        let mut contents = String::with_capacity(doc.text.len());
        contents.push_str(&doc.text[..cut_start]);
        contents.push_str(&doc.text[cut_end..]);

        let response = settle(
            "autocomplete",
            self.client()
                .autocomplete(doc.path, &contents, callee.end, cancel)
                .await,
        )?;
        let entry = response
            .result
            .iter()
            .find(|entry| entry.func_details.is_some() && entry.name == name)?;
        Some(to_signature_help(name, entry, call.commas))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowide_types::{FuncDetails, FuncParam};
    use std::path::Path;

    fn doc(text: &str) -> Document<'_> {
        Document::new(Path::new("/p/a.js"), text)
    }

    fn func(name: &str, params: &[&str]) -> AutocompleteEntry {
        AutocompleteEntry {
            name: name.to_string(),
            type_: "(a: string, b: number) => void".to_string(),
            func_details: Some(FuncDetails {
                return_type: "void".to_string(),
                params: params
                    .iter()
                    .map(|p| FuncParam {
                        name: (*p).to_string(),
                        type_: "string".to_string(),
                    })
                    .collect(),
            }),
            path: String::new(),
        }
    }

    #[test]
    fn finds_unmatched_paren_and_commas() {
        let d = doc("  foo(a, bar(1, 2), c");
        let call = enclosing_call(&d, Position::new(0, 21)).unwrap();
        assert_eq!(call.open_paren, Position::new(0, 5));
        assert_eq!(call.commas, 2);
    }

    #[test]
    fn inner_call_wins_when_cursor_inside() {
        let d = doc("foo(a, bar(1, ");
        let call = enclosing_call(&d, Position::new(0, 14)).unwrap();
        assert_eq!(call.open_paren, Position::new(0, 10));
        assert_eq!(call.commas, 1);
    }

    #[test]
    fn no_call_no_help() {
        let d = doc("foo(a) + b");
        assert!(enclosing_call(&d, Position::new(0, 10)).is_none());
    }

    #[test]
    fn previous_word_skips_whitespace() {
        let d = doc("obj.method (x");
        let call = enclosing_call(&d, Position::new(0, 13)).unwrap();
        let range = previous_word(&d, call.open_paren).unwrap();
        assert_eq!(d.slice(range), "method");
    }

    #[test]
    fn active_parameter_follows_commas() {
        let entry = func("greet", &["a", "b"]);
        let help = to_signature_help("greet", &entry, 0);
        assert_eq!(help.active_parameter, Some(0));
        assert_eq!(help.signatures[0].label, "greet(a: string, b: number) => void");
        assert_eq!(help.signatures[0].parameters[1].label, "b:string");

        assert_eq!(to_signature_help("greet", &entry, 1).active_parameter, Some(1));
        assert_eq!(to_signature_help("greet", &entry, 5).active_parameter, Some(1));
    }

    #[test]
    fn no_params_no_active_parameter() {
        let help = to_signature_help("now", &func("now", &[]), 0);
        assert!(help.signatures[0].parameters.is_empty());
        assert_eq!(help.active_parameter, None);
    }
}
