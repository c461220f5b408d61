use flowide_checker::CancellationToken;
use flowide_types::{Hover, Position};

use crate::text::Document;
use crate::{FlowIde, settle};

pub const HOVER_TITLE: &str = "Flow-IDE";
pub const HOVER_LANGUAGE: &str = "javascriptreact";

pub(crate) fn hover_for(word: &str, type_: &str) -> Option<Hover> {
    if type_.is_empty() {
        return None;
    }
    Some(Hover {
        title: HOVER_TITLE.to_string(),
        language: HOVER_LANGUAGE.to_string(),
        value: format!("{word}: {type_}"),
    })
}

impl FlowIde {
    /// Type of the identifier under the cursor. Nothing is asked of the
    /// checker when the cursor is not on a word.
    pub async fn hover(
        &self,
        doc: Document<'_>,
        position: Position,
        cancel: Option<CancellationToken>,
    ) -> Option<Hover> {
        let word = doc.slice(doc.word_range_at(position)?);
        let response = settle(
            "type-at-pos",
            self.client()
                .type_at_position(doc.path, doc.text, position, cancel)
                .await,
        )?;
        hover_for(word, &response.type_)
    }
}
