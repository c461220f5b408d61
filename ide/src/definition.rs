use std::path::PathBuf;

use flowide_checker::CancellationToken;
use flowide_types::{DefinitionResponse, Location, Position, Range};

use crate::text::Document;
use crate::{FlowIde, settle};

pub(crate) fn to_location(def: &DefinitionResponse) -> Option<Location> {
    if def.path.is_empty() {
        return None;
    }
    Some(Location {
        path: PathBuf::from(&def.path),
        range: Range::new(
            Position::saturating_from_checker(def.line, def.start),
            Position::saturating_from_checker(def.endline, def.end),
        ),
    })
}

impl FlowIde {
    /// Where the symbol at `position` is defined.
    pub async fn definition(
        &self,
        doc: Document<'_>,
        position: Position,
        cancel: Option<CancellationToken>,
    ) -> Option<Location> {
        let response = settle(
            "get-def",
            self.client()
                .definition(doc.path, doc.text, position, cancel)
                .await,
        )?;
        to_location(&response)
    }
}
