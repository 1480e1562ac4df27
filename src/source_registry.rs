//=============================================
// sciblock/source_registry.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Synthetic file table for submitted snippets
// Objective: Keep the exact text of every snippet under its virtual
//            identifier so failure reports can quote the offending line
//=============================================

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::debug;

/// Placeholder returned when a line cannot be resolved.
pub const STILL_UNAVAILABLE: &str = "(still unavailable)";

static GLOBAL: OnceCell<SourceRegistry> = OnceCell::new();

/// One registered snippet. Immutable once created; a later registration
/// under the same identifier replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBlock {
    virtual_id: String,
    text: String,
    lines: Vec<String>,
}

impl SourceBlock {
    pub fn new(virtual_id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let lines = split_lines(&text);
        Self {
            virtual_id: virtual_id.into(),
            text,
            lines,
        }
    }

    pub fn virtual_id(&self) -> &str {
        &self.virtual_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Lines with their terminators preserved.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// 1-based lookup.
    pub fn line(&self, number: usize) -> Option<&str> {
        number
            .checked_sub(1)
            .and_then(|index| self.lines.get(index))
            .map(String::as_str)
    }
}

/// Splits text after every `\n`, keeping the terminator, so that
/// concatenating the pieces reproduces the text exactly. This matches how
/// the tokenizer numbers lines.
pub fn split_lines(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(str::to_string).collect()
}

/// Process-wide table of snippet sources keyed by virtual identifier.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    blocks: Mutex<HashMap<String, Arc<SourceBlock>>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static SourceRegistry {
        GLOBAL.get_or_init(SourceRegistry::new)
    }

    /// Stores `text` under `virtual_id`, replacing any earlier block.
    pub fn register(&self, virtual_id: &str, text: &str) -> Arc<SourceBlock> {
        let block = Arc::new(SourceBlock::new(virtual_id, text));
        debug!(
            virtual_id,
            lines = block.lines().len(),
            "registered snippet source"
        );
        self.blocks
            .lock()
            .insert(virtual_id.to_string(), block.clone());
        block
    }

    pub fn get(&self, virtual_id: &str) -> Option<Arc<SourceBlock>> {
        self.blocks.lock().get(virtual_id).cloned()
    }

    pub fn remove(&self, virtual_id: &str) -> Option<Arc<SourceBlock>> {
        self.blocks.lock().remove(virtual_id)
    }

    /// Stripped text of a 1-based line, or [`STILL_UNAVAILABLE`] when the
    /// identifier or line is unknown.
    pub fn resolve_line(&self, virtual_id: &str, line_number: usize) -> String {
        self.get(virtual_id)
            .and_then(|block| block.line(line_number).map(|line| line.trim().to_string()))
            .unwrap_or_else(|| STILL_UNAVAILABLE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_round_trip_text() {
        let text = "a = 1\r\n\nb = 2";
        let block = SourceBlock::new("<blk>", text);
        assert_eq!(block.lines(), ["a = 1\r\n", "\n", "b = 2"]);
        assert_eq!(block.lines().concat(), text);
    }

    #[test]
    fn test_resolve_line_strips_and_falls_back() {
        let registry = SourceRegistry::new();
        registry.register("<blk>", "x = 1\n    y = x + 1   \n");
        assert_eq!(registry.resolve_line("<blk>", 2), "y = x + 1");
        assert_eq!(registry.resolve_line("<blk>", 0), STILL_UNAVAILABLE);
        assert_eq!(registry.resolve_line("<blk>", 3), STILL_UNAVAILABLE);
        assert_eq!(registry.resolve_line("<other>", 1), STILL_UNAVAILABLE);
    }

    #[test]
    fn test_register_supersedes() {
        let registry = SourceRegistry::new();
        registry.register("<blk>", "first = 1\n");
        registry.register("<blk>", "second = 2\n");
        assert_eq!(registry.resolve_line("<blk>", 1), "second = 2");
        assert_eq!(registry.get("<blk>").unwrap().text(), "second = 2\n");
    }
}
