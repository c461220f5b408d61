use flowide_checker::CancellationToken;
use flowide_types::{AutocompleteEntry, CompletionItem, CompletionKind, Position};

use crate::text::{Document, basename};
use crate::{FlowIde, settle};

fn completion_kind(entry: &AutocompleteEntry) -> CompletionKind {
    if entry.func_details.is_some() {
        CompletionKind::Function
    } else if entry.type_.contains("[class: ") {
        CompletionKind::Class
    } else {
        CompletionKind::Variable
    }
}

/// `name({{a}}, {{b}}){{}}` for functions when snippets are on, else `name`.
fn insert_text(entry: &AutocompleteEntry, snippets: bool) -> String {
    let Some(details) = entry.func_details.as_ref().filter(|_| snippets) else {
        return entry.name.clone();
    };
    if details.params.is_empty() {
        return format!("{}()", entry.name);
    }
    let args: Vec<String> = details
        .params
        .iter()
        .map(|param| format!("{{{{{}}}}}", param.name.replace('?', "")))
        .collect();
    format!("{}({}){{{{}}}}", entry.name, args.join(", "))
}

pub(crate) fn to_completion_item(entry: &AutocompleteEntry, snippets: bool) -> CompletionItem {
    let detail = if entry.type_.is_empty() {
        basename(&entry.path).to_string()
    } else {
        entry.type_.clone()
    };
    CompletionItem {
        label: entry.name.clone(),
        kind: completion_kind(entry),
        insert_text: insert_text(entry, snippets),
        detail,
    }
}

impl FlowIde {
    /// Completion items at `position`.
    pub async fn completions(
        &self,
        doc: Document<'_>,
        position: Position,
        cancel: Option<CancellationToken>,
    ) -> Option<Vec<CompletionItem>> {
        let response = settle(
            "autocomplete",
            self.client()
                .autocomplete(doc.path, doc.text, position, cancel)
                .await,
        )?;
        let snippets = self.settings().function_snippets;
        Some(
            response
                .result
                .iter()
                .map(|entry| to_completion_item(entry, snippets))
                .collect(),
        )
    }
}
